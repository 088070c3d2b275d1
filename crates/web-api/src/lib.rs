//! Web API 层。
//!
//! 提供 Axum 路由：`/ping` 健康检查、协作方路由挂载点，以及承载
//! 在线状态与消息中继的 WebSocket 端点。

mod error;
pub mod protocol;
mod routes;
mod state;
mod ws_connection;

pub use error::ApiError;
pub use routes::{cors_layer, router, Collaborators, SOCKET_PATH};
pub use state::AppState;
