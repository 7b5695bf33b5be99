//! Web API 层。
//!
//! 提供 Axum 路由：健康检查、网关统计接口，以及两个 WebSocket
//! 命名空间（讨论串 / 通知）的升级入口和连接生命周期管理。

mod auth;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use auth::{Claims, JwtService};
pub use config::JwtConfig;
pub use routes::router;
pub use state::AppState;
