//! 实时子系统错误类型。
//!
//! 每个变体对应一条固定的用户可见错误文案；`disconnects()` 决定
//! 该错误是否需要在回发错误帧之后关闭传输连接。

use domain::RepositoryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RealtimeError {
    /// 连接准入：单 IP 连接频率超限（认证之前检查）。
    #[error("Connection rate limit exceeded")]
    ConnectionRateLimited,

    /// 连接准入：单用户并发连接达到上限。
    #[error("Too many connections for this user")]
    TooManyConnections,

    /// 消息级限流。消息被丢弃，连接保持打开。
    #[error("Rate limit exceeded")]
    MessageRateLimited,

    /// 握手时缺少凭证。
    #[error("Authentication required")]
    AuthenticationRequired,

    /// 凭证无效或已过期。
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// 在未认证的连接上执行指令。
    #[error("Not authenticated")]
    NotAuthenticated,

    /// 越权操作（例如订阅他人的通知频道）。
    #[error("Access denied")]
    AccessDenied,

    #[error("Thread not found")]
    ThreadNotFound,

    #[error("Notification not found")]
    NotificationNotFound,

    /// 无法按协议解析的入站帧。消息被丢弃，连接保持打开。
    #[error("Invalid message format")]
    InvalidMessage,

    #[error("Storage error: {0}")]
    Repository(RepositoryError),
}

impl RealtimeError {
    /// 该错误是否终止连接。准入/认证失败关闭连接；其余只回发错误帧。
    pub fn disconnects(&self) -> bool {
        matches!(
            self,
            RealtimeError::ConnectionRateLimited
                | RealtimeError::TooManyConnections
                | RealtimeError::AuthenticationRequired
                | RealtimeError::AuthenticationFailed
        )
    }
}

impl From<RepositoryError> for RealtimeError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => RealtimeError::NotificationNotFound,
            other => RealtimeError::Repository(other),
        }
    }
}
