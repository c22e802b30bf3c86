//! 对战中继共享协议库
//!
//! 包含:
//! - 消息类型定义 (Message, ErrorCode, GameState, RoomInfo)
//! - 传输层抽象 (Connector, Connection, Listener traits)
//! - 帧编解码 (FrameReader, FrameWriter)
//! - 协议常量与错误类型

mod constants;
mod error;
mod message;
mod transport;

pub use constants::*;
pub use error::{ProtocolError, Result};
pub use message::{
    ErrorCode, GameState, Message, PlayerId, RoomId, RoomInfo, RoomStatus, Side,
};
pub use transport::{
    Connection, Connector, FrameReader, FrameWriter, Listener, TcpConnection, TcpConnector,
    TcpListener,
};
