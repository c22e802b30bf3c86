use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relay_server::{RelayServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("relay_server=debug".parse()?))
        .init();

    info!("对战中继服务端启动中...");

    // 第一个参数是可选的配置文件路径
    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(path),
        None => ServerConfig::default(),
    };

    let mut server = RelayServer::new(config);
    server.start().await?;
    info!("监听地址: {}", server.local_addr().unwrap_or("未知"));

    tokio::signal::ctrl_c().await?;
    info!("收到退出信号，正在关闭...");
    server.stop().await;

    Ok(())
}
