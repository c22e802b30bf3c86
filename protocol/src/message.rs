//! 消息类型定义

use serde::{Deserialize, Serialize};

/// 玩家 ID（服务端生成的不透明字符串）
pub type PlayerId = String;

/// 房间 ID（服务端生成的不透明字符串）
pub type RoomId = String;

/// 对局座位
///
/// `A` 为房主座位，`B` 为加入者座位。座位含义（先后手、棋子颜色等）
/// 由接入的具体棋类游戏自行解释。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    /// 对方座位
    pub fn opponent(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// 房间状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    /// 等待玩家加入
    Waiting,
    /// 两个座位已满，即将开始
    Full,
    /// 游戏进行中
    Playing,
    /// 游戏结束
    Finished,
}

/// 对局状态快照
///
/// `board_snapshot` 是接入游戏自行序列化的棋盘表示，中继层原样转发、
/// 从不解析。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    /// 当前走子方
    pub current_player: Side,
    /// 已走步数
    pub move_count: u32,
    /// 游戏是否结束
    pub is_game_over: bool,
    /// 胜者（平局或未结束为 None）
    pub winner: Option<Side>,
    /// 不透明的棋盘快照
    pub board_snapshot: String,
}

impl GameState {
    /// 初始状态：A 方先行，步数归零
    pub fn initial() -> Self {
        Self {
            current_player: Side::A,
            move_count: 0,
            is_game_over: false,
            winner: None,
            board_snapshot: String::new(),
        }
    }

    /// 切换走子方
    pub fn switch_turn(&mut self) {
        self.current_player = self.current_player.opponent();
    }
}

/// 房间信息（用于列表展示）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: RoomId,
    pub name: String,
    pub status: RoomStatus,
    pub host_name: String,
    pub guest_name: Option<String>,
    pub has_password: bool,
}

/// 中继协议消息
///
/// 单一封闭集合：双向消息（Move、Heartbeat、TextMessage、Disconnect）
/// 在两个方向上使用同一个变体，编解码对任意一端完全对称。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    // === 握手 ===
    /// 连接请求（C→S）
    ConnectRequest { display_name: String },
    /// 连接响应（S→C）
    ConnectResponse {
        success: bool,
        message: String,
        player_id: PlayerId,
    },

    // === 房间操作 ===
    /// 创建房间（C→S）
    CreateRoomRequest {
        room_name: String,
        password: Option<String>,
    },
    /// 创建房间响应（S→C）
    CreateRoomResponse {
        success: bool,
        message: String,
        room_id: RoomId,
    },
    /// 加入房间（C→S）
    JoinRoomRequest {
        room_id: RoomId,
        password: Option<String>,
    },
    /// 加入房间响应（S→C）
    JoinRoomResponse {
        success: bool,
        message: String,
        room_id: RoomId,
        opponent_name: String,
    },
    /// 离开房间（C→S）
    LeaveRoom { player_id: PlayerId },
    /// 获取房间列表（C→S）
    ListRooms,
    /// 房间列表（S→C）
    RoomList { rooms: Vec<RoomInfo> },

    // === 对局消息 ===
    /// 走棋（C↔S↔C，原样转发）
    Move {
        from_row: u8,
        from_col: u8,
        to_row: u8,
        to_col: u8,
        timestamp: i64,
    },
    /// 游戏开始（S→C，双方收到各自的 `your_side`）
    GameStart {
        side_a_name: String,
        side_b_name: String,
        your_side: Side,
    },
    /// 游戏结束（S→C）
    GameEnd {
        winner: Option<Side>,
        reason: String,
    },
    /// 权威状态同步（S→C，走棋后广播给双方）
    GameStateSync {
        board_snapshot: String,
        current_player: Side,
        is_game_over: bool,
        winner: Option<Side>,
    },

    // === 连接维护 ===
    /// 心跳（C↔S）
    Heartbeat { timestamp: i64 },
    /// 错误消息（S→C）
    Error { code: ErrorCode, message: String },
    /// 文字消息（C↔S↔C，原样转发）
    TextMessage {
        sender: String,
        content: String,
        timestamp: i64,
    },
    /// 断开连接（C↔S）
    Disconnect { reason: String },
}

/// 错误码定义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    // === 房间相关 (1xx) ===
    /// 房间不存在
    RoomNotFound = 100,
    /// 房间已满
    RoomFull = 101,
    /// 房间已关闭（非等待状态）
    RoomClosed = 102,
    /// 密码错误
    WrongPassword = 103,
    /// 不在房间中
    NotInRoom = 104,
    /// 已在房间中
    AlreadyInRoom = 105,

    // === 游戏相关 (2xx) ===
    /// 不是你的回合
    NotYourTurn = 200,
    /// 游戏未开始
    GameNotStarted = 201,
    /// 游戏已结束
    GameAlreadyOver = 202,

    // === 玩家相关 (3xx) ===
    /// 无效昵称
    InvalidName = 300,
    /// 玩家不存在
    PlayerNotFound = 301,

    // === 系统相关 (5xx) ===
    /// 内部错误
    InternalError = 500,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
