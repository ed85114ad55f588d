//! 主应用程序入口
//!
//! 加载配置、装配进程内协作方，启动 Axum Web API 服务。

use config::AppConfig;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 读取并校验配置
    let config = AppConfig::from_env();
    config.validate()?;

    let state = AppState::from_config(&config);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "订单会话服务已启动");

    axum::serve(listener, router(state)).await?;
    Ok(())
}
