//! 领域层错误定义。

use thiserror::Error;

/// 仓储（持久化协作方）错误类型。
///
/// 本服务不直接访问数据库，评论/通知的查询通过仓储接口委托给外部实现。
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
