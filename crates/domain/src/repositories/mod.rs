//! 持久化协作方接口。
//!
//! 评论与通知的存储在本服务范围之外，这里只定义实时子系统依赖的最小契约。

use async_trait::async_trait;

use crate::entities::comment::CommentView;
use crate::entities::notification::NotificationView;
use crate::errors::RepositoryError;
use crate::value_objects::{CommentId, NotificationId, UserId};

/// 评论查询接口。加入讨论串前用于校验目标评论存在。
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// 按 id 查询评论，不存在时返回 `None`（而非错误）。
    async fn find_by_id(&self, id: CommentId) -> Result<Option<CommentView>, RepositoryError>;
}

/// 通知查询/更新接口。
///
/// 未读数永远从这里现查，推送中不携带缓存的计数，避免与真实状态漂移。
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn unread_count(&self, user_id: UserId) -> Result<u64, RepositoryError>;

    /// 将通知标记为已读。通知不存在、或不属于该用户时返回 `NotFound`。
    async fn mark_read(
        &self,
        id: NotificationId,
        user_id: UserId,
    ) -> Result<NotificationView, RepositoryError>;
}
