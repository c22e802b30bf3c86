//! 对战中继客户端
//!
//! 供棋类游戏 UI 层接入的中继客户端库：维护连接、心跳与重连，
//! 把服务端消息转换成异步事件流。

pub mod client;

pub use client::{ClientConfig, ClientEvent, ReconnectPolicy, RelayClient};
