//! 协议常量定义

use std::time::Duration;

/// 协议版本号
pub const PROTOCOL_VERSION: u8 = 1;

/// 昵称最大长度
pub const MAX_NAME_LEN: usize = 20;

/// 房间名最大长度
pub const MAX_ROOM_NAME_LEN: usize = 32;

/// 消息帧最大大小
pub const MAX_FRAME_SIZE: usize = 65536;

/// 服务端最大连接数
pub const MAX_CONNECTIONS: usize = 100;

/// 生成的玩家/房间 ID 长度
pub const ID_LEN: usize = 8;

/// 心跳间隔（秒）- 客户端发送周期，同时也是服务端巡检周期
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// 服务端心跳超时（秒）- 超过此时间无心跳则判定连接失活
pub const SERVER_HEARTBEAT_TIMEOUT_SECS: u64 = 60;

/// 客户端心跳超时（秒）- 超过此时间未收到服务端心跳则判定断线
pub const CLIENT_HEARTBEAT_TIMEOUT_SECS: u64 = 120;

/// 断线重连延迟（秒）
pub const RECONNECT_DELAY_SECS: u64 = 5;

/// 连接超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 心跳间隔 Duration
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(HEARTBEAT_INTERVAL_SECS);

/// 服务端心跳超时 Duration
pub const SERVER_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(SERVER_HEARTBEAT_TIMEOUT_SECS);

/// 客户端心跳超时 Duration
pub const CLIENT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(CLIENT_HEARTBEAT_TIMEOUT_SECS);

/// 断线重连延迟 Duration
pub const RECONNECT_DELAY: Duration = Duration::from_secs(RECONNECT_DELAY_SECS);

/// 连接超时 Duration
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(CONNECT_TIMEOUT_SECS);
