use std::net::SocketAddr;

use config::AppConfig;
use web_api::{router, AppState};

/// 启动一个绑定随机端口的完整服务实例。
pub async fn spawn_app() -> SocketAddr {
    let config = AppConfig::from_env();
    config.validate().expect("default config must be valid");
    let state = AppState::from_config(&config);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(listener, router(state))
            .await
            .expect("server task");
    });

    addr
}
