//! Web API 层。
//!
//! 提供 Axum 路由，把 HTTP / WebSocket 请求委托给应用层的会话
//! 协调器；决策逻辑全部留在应用层。

mod error;
mod routes;
mod state;
mod ws_connection;

pub use routes::router;
pub use state::AppState;
