//! 服务端配置
//!
//! 提供配置数据结构和 JSON 文件加载

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use protocol::{HEARTBEAT_INTERVAL_SECS, MAX_CONNECTIONS, SERVER_HEARTBEAT_TIMEOUT_SECS};

/// 服务端配置
///
/// 心跳参数以毫秒存储，便于测试时用很短的窗口驱动巡检逻辑。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    pub bind_addr: String,
    /// 心跳巡检周期（毫秒）
    pub heartbeat_interval_ms: u64,
    /// 心跳超时（毫秒）- 超过此时间无心跳的连接会被强制断开
    pub heartbeat_timeout_ms: u64,
    /// 最大连接数
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9527".to_string(),
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_SECS * 1000,
            heartbeat_timeout_ms: SERVER_HEARTBEAT_TIMEOUT_SECS * 1000,
            max_connections: MAX_CONNECTIONS,
        }
    }
}

impl ServerConfig {
    /// 心跳巡检周期
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// 心跳超时
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// 从文件加载配置
    ///
    /// 文件不存在或格式无效时回退到默认配置。
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            tracing::info!("配置文件不存在，使用默认配置: {:?}", path);
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => {
                    tracing::info!("已加载配置: {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::warn!("配置文件格式无效: {}，使用默认配置", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("无法读取配置文件: {}，使用默认配置", e);
                Self::default()
            }
        }
    }
}
