//! 通知推送载荷。

use serde::{Deserialize, Serialize};

use crate::value_objects::{CommentId, NotificationId, Timestamp, UserId};

/// 推送给客户端的通知视图。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: NotificationId,
    /// 接收者。通知只会投递到该用户的私有频道。
    pub user_id: UserId,
    pub comment_id: CommentId,
    pub is_read: bool,
    pub created_at: Timestamp,
}

/// 批量通知操作的类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkOperation {
    MarkAllRead,
    DeleteRead,
}
