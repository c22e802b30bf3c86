//! 玩家管理

use std::collections::HashMap;

use rand::distributions::Alphanumeric;
use rand::Rng;

use protocol::{PlayerId, RoomId, Side, ID_LEN, MAX_NAME_LEN};

/// 玩家信息
///
/// 握手完成时创建（只有 id 和昵称）；进入房间后由房间持有一份
/// 带座位分配的拷贝。
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// 分配的座位（进入房间前为 None）
    pub side: Option<Side>,
    /// 是否已准备
    pub ready: bool,
}

impl Player {
    pub fn new(id: PlayerId, name: String) -> Self {
        Self {
            id,
            name,
            side: None,
            ready: false,
        }
    }

    /// 分配座位并标记为已准备
    pub fn assign_side(&mut self, side: Side) {
        self.side = Some(side);
        self.ready = true;
    }
}

/// 注册表条目：昵称 + 所在房间的反向引用
#[derive(Debug, Clone)]
struct PlayerEntry {
    name: String,
    room: Option<RoomId>,
}

/// 玩家管理器
///
/// 服务端的在线玩家注册表。房间持有玩家数据本体，这里只保留
/// 昵称和房间反向引用。
pub struct PlayerManager {
    players: HashMap<PlayerId, PlayerEntry>,
}

impl PlayerManager {
    pub fn new() -> Self {
        Self {
            players: HashMap::new(),
        }
    }

    /// 生成新的玩家 ID
    fn generate_id(&self) -> PlayerId {
        loop {
            let id: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(ID_LEN)
                .map(char::from)
                .collect();
            if !self.players.contains_key(&id) {
                return id;
            }
        }
    }

    /// 验证昵称
    pub fn validate_name(name: &str) -> Result<(), &'static str> {
        if name.trim().is_empty() {
            return Err("昵称不能为空");
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err("昵称不能超过20个字符");
        }
        Ok(())
    }

    /// 注册玩家（握手时调用）
    ///
    /// 昵称不要求唯一，身份只靠生成的 ID 区分。
    pub fn register(&mut self, name: String) -> Result<PlayerId, &'static str> {
        Self::validate_name(&name)?;

        let id = self.generate_id();
        self.players.insert(
            id.clone(),
            PlayerEntry { name, room: None },
        );
        Ok(id)
    }

    /// 移除玩家（连接关闭后）
    pub fn remove(&mut self, player_id: &PlayerId) -> bool {
        self.players.remove(player_id).is_some()
    }

    /// 获取玩家昵称
    pub fn get_name(&self, player_id: &PlayerId) -> Option<&str> {
        self.players.get(player_id).map(|p| p.name.as_str())
    }

    /// 设置玩家所在房间
    pub fn set_room(&mut self, player_id: &PlayerId, room: Option<RoomId>) {
        if let Some(entry) = self.players.get_mut(player_id) {
            entry.room = room;
        }
    }

    /// 查询玩家所在房间
    pub fn room_of(&self, player_id: &PlayerId) -> Option<&RoomId> {
        self.players.get(player_id).and_then(|p| p.room.as_ref())
    }

    /// 检查玩家是否存在
    pub fn exists(&self, player_id: &PlayerId) -> bool {
        self.players.contains_key(player_id)
    }

    /// 获取在线玩家数量
    pub fn count(&self) -> usize {
        self.players.len()
    }
}

impl Default for PlayerManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register() {
        let mut manager = PlayerManager::new();

        let id1 = manager.register("玩家1".to_string()).unwrap();
        assert_eq!(id1.len(), ID_LEN);

        let id2 = manager.register("玩家2".to_string()).unwrap();
        assert_ne!(id1, id2);
        assert_eq!(manager.count(), 2);
    }

    #[test]
    fn test_duplicate_name_allowed() {
        // 昵称不作唯一性约束，两个同名玩家拿到不同 ID
        let mut manager = PlayerManager::new();

        let id1 = manager.register("玩家".to_string()).unwrap();
        let id2 = manager.register("玩家".to_string()).unwrap();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_invalid_name() {
        let mut manager = PlayerManager::new();

        // 空昵称
        assert!(manager.register("".to_string()).is_err());
        assert!(manager.register("   ".to_string()).is_err());

        // 超长昵称
        let long_name = "a".repeat(MAX_NAME_LEN + 1);
        assert!(manager.register(long_name).is_err());
    }

    #[test]
    fn test_room_backref() {
        let mut manager = PlayerManager::new();

        let id = manager.register("玩家1".to_string()).unwrap();
        assert!(manager.room_of(&id).is_none());

        manager.set_room(&id, Some("r1r2r3r4".to_string()));
        assert_eq!(manager.room_of(&id).map(|r| r.as_str()), Some("r1r2r3r4"));

        manager.set_room(&id, None);
        assert!(manager.room_of(&id).is_none());

        assert!(manager.remove(&id));
        assert!(!manager.exists(&id));
    }

    #[test]
    fn test_assign_side() {
        let mut player = Player::new("a1b2c3d4".to_string(), "玩家1".to_string());
        assert!(player.side.is_none());
        assert!(!player.ready);

        player.assign_side(Side::B);
        assert_eq!(player.side, Some(Side::B));
        assert!(player.ready);
    }
}
