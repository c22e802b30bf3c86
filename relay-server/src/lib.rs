//! 对战中继服务端
//!
//! 包含:
//! - 房间系统
//! - 玩家管理
//! - 连接调度与消息路由
//! - 心跳巡检
//! - 服务端配置

pub mod config;
pub mod player;
pub mod room;
pub mod server;

pub use config::ServerConfig;
pub use player::{Player, PlayerManager};
pub use room::{Room, RoomManager};
pub use server::{MessageHandler, RelayServer, ServerState, SharedState};
