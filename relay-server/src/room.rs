//! 房间系统

use std::collections::HashMap;
use std::time::Instant;

use rand::distributions::Alphanumeric;
use rand::Rng;

use protocol::{ErrorCode, GameState, PlayerId, RoomId, RoomInfo, RoomStatus, Side, ID_LEN};

use crate::player::Player;

/// 房间
///
/// 一场对局的生命周期：`Waiting →(加入)→ Full →(开始)→ Playing → Finished`。
/// 房间不会回到 Waiting，重开只能销毁后重建。
pub struct Room {
    pub id: RoomId,
    pub name: String,
    /// 房间密码（创建时未设置则任何人可加入）
    pub password: Option<String>,
    /// 房主（A 座位）
    pub host: Player,
    /// 加入者（B 座位）
    pub guest: Option<Player>,
    pub status: RoomStatus,
    /// 对局状态，中继层只维护回合与计数，不解析棋盘快照
    pub game_state: GameState,
    /// 创建时间
    pub created_at: Instant,
}

impl Room {
    /// 创建新房间，创建者即房主，固定分到 A 座位
    pub fn new(id: RoomId, name: String, password: Option<String>, mut host: Player) -> Self {
        host.side = Some(Side::A);
        Self {
            id,
            name,
            password,
            host,
            guest: None,
            status: RoomStatus::Waiting,
            game_state: GameState::initial(),
            created_at: Instant::now(),
        }
    }

    /// 获取房间信息（用于列表展示）
    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            host_name: self.host.name.clone(),
            guest_name: self.guest.as_ref().map(|g| g.name.clone()),
            has_password: self.password.is_some(),
        }
    }

    /// 检查房间是否已满
    pub fn is_full(&self) -> bool {
        self.guest.is_some()
    }

    /// 检查玩家是否在房间中
    pub fn has_player(&self, player_id: &PlayerId) -> bool {
        self.host.id == *player_id || self.guest.as_ref().is_some_and(|g| g.id == *player_id)
    }

    /// 获取玩家的座位
    pub fn side_of(&self, player_id: &PlayerId) -> Option<Side> {
        if self.host.id == *player_id {
            self.host.side
        } else if let Some(guest) = &self.guest {
            if guest.id == *player_id {
                guest.side
            } else {
                None
            }
        } else {
            None
        }
    }

    /// 获取对手
    pub fn opponent(&self, player_id: &PlayerId) -> Option<&Player> {
        if self.host.id == *player_id {
            self.guest.as_ref()
        } else if self.guest.as_ref().is_some_and(|g| g.id == *player_id) {
            Some(&self.host)
        } else {
            None
        }
    }

    /// 获取指定座位的玩家昵称
    pub fn player_name(&self, side: Side) -> Option<&str> {
        match side {
            Side::A => Some(self.host.name.as_str()),
            Side::B => self.guest.as_ref().map(|g| g.name.as_str()),
        }
    }

    /// 验证密码（无密码房间恒为真）
    pub fn validate_password(&self, candidate: Option<&str>) -> bool {
        match &self.password {
            None => true,
            Some(expected) => candidate == Some(expected.as_str()),
        }
    }

    /// 添加加入者
    ///
    /// 房间已有两名玩家则失败。成功时加入者分到 B 座位，双方同时
    /// 标记为已准备。
    pub fn add_player(&mut self, mut player: Player) -> bool {
        if self.guest.is_some() {
            return false;
        }
        player.assign_side(Side::B);
        self.host.ready = true;
        self.guest = Some(player);
        self.status = RoomStatus::Full;
        true
    }

    /// 移除玩家
    ///
    /// 返回 true 表示房主离开、整个房间应当解散（由调用方从注册表删除）。
    /// 加入者在对局中离开时，剩余一方记为胜者、房间保留以便通知；
    /// 重复移除是无操作。
    pub fn remove_player(&mut self, player_id: &PlayerId) -> bool {
        if self.host.id == *player_id {
            return true;
        }

        if self.guest.as_ref().is_some_and(|g| g.id == *player_id) {
            self.guest = None;
            if self.status == RoomStatus::Playing {
                self.finish(Some(Side::A));
            } else if self.status == RoomStatus::Full {
                // 不支持回到 Waiting，房间直接作废
                self.finish(None);
            }
        }
        false
    }

    /// 开始游戏
    ///
    /// 仅当两个座位都有人且双方均已准备时成功；重复调用返回 false。
    pub fn start_game(&mut self) -> bool {
        if self.status == RoomStatus::Playing || self.status == RoomStatus::Finished {
            return false;
        }
        let Some(guest) = &self.guest else {
            return false;
        };
        if !self.host.ready || !guest.ready {
            return false;
        }

        self.game_state = GameState::initial();
        self.status = RoomStatus::Playing;
        true
    }

    /// 处理走棋
    ///
    /// 只做回合仲裁：检查对局进行中、未结束、轮到该玩家。走法本身
    /// 的合法性由接入游戏在调用前验证。成功时切换走子方并累加步数。
    pub fn process_move(&mut self, player_id: &PlayerId) -> Result<(), ErrorCode> {
        if self.status != RoomStatus::Playing {
            return Err(ErrorCode::GameNotStarted);
        }
        if self.game_state.is_game_over {
            return Err(ErrorCode::GameAlreadyOver);
        }

        let side = self.side_of(player_id).ok_or(ErrorCode::NotInRoom)?;
        if side != self.game_state.current_player {
            return Err(ErrorCode::NotYourTurn);
        }

        self.game_state.switch_turn();
        self.game_state.move_count += 1;
        Ok(())
    }

    /// 结束对局
    pub fn finish(&mut self, winner: Option<Side>) {
        self.status = RoomStatus::Finished;
        self.game_state.is_game_over = true;
        self.game_state.winner = winner;
    }
}

/// 房间管理器
pub struct RoomManager {
    rooms: HashMap<RoomId, Room>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }

    /// 生成新的房间 ID
    fn generate_id(&self) -> RoomId {
        loop {
            let id: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(ID_LEN)
                .map(char::from)
                .collect();
            if !self.rooms.contains_key(&id) {
                return id;
            }
        }
    }

    /// 创建房间
    pub fn create(&mut self, name: String, password: Option<String>, host: Player) -> RoomId {
        let id = self.generate_id();
        let room = Room::new(id.clone(), name, password, host);
        self.rooms.insert(id.clone(), room);
        id
    }

    /// 获取房间
    pub fn get(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// 获取房间（可变）
    pub fn get_mut(&mut self, room_id: &RoomId) -> Option<&mut Room> {
        self.rooms.get_mut(room_id)
    }

    /// 移除房间
    pub fn remove(&mut self, room_id: &RoomId) -> Option<Room> {
        self.rooms.remove(room_id)
    }

    /// 获取可加入的房间列表（Waiting 状态）
    pub fn list_joinable(&self) -> Vec<&Room> {
        self.rooms
            .values()
            .filter(|r| r.status == RoomStatus::Waiting)
            .collect()
    }

    /// 获取房间数量
    pub fn count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}
