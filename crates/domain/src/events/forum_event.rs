//! 论坛领域事件。
//!
//! 由持久化侧的服务（评论/通知 CRUD，本服务范围之外）发布，
//! 扇出调度器消费后转成定向 WebSocket 推送。事件是瞬态的，不落盘。

use serde::{Deserialize, Serialize};

use crate::entities::comment::CommentView;
use crate::entities::notification::{BulkOperation, NotificationView};
use crate::value_objects::{CommentId, NotificationId, UserId};

/// 论坛领域事件的标签联合。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ForumEvent {
    /// 新评论创建。只有回复（`parent_id` 非空）会触发讨论串推送。
    CommentCreated {
        comment: CommentView,
        parent_id: Option<CommentId>,
    },

    /// 评论被编辑。
    CommentUpdated { comment: CommentView },

    /// 评论被删除。
    CommentDeleted {
        comment_id: CommentId,
        parent_id: Option<CommentId>,
    },

    /// 回复计数变化（客户端侧的推送式缓存失效）。
    ReplyCountUpdated {
        comment_id: CommentId,
        reply_count: u32,
        total_replies: u32,
    },

    /// 新通知创建。
    NotificationCreated {
        notification: NotificationView,
        recipient_id: UserId,
    },

    /// 通知更新（例如已读状态变化）。
    NotificationUpdated {
        notification: NotificationView,
        recipient_id: UserId,
    },

    /// 通知被删除。
    NotificationDeleted {
        notification_id: NotificationId,
        recipient_id: UserId,
    },

    /// 批量通知操作。
    NotificationBulkUpdated {
        recipient_id: UserId,
        operation: BulkOperation,
        affected: u64,
    },
}

impl ForumEvent {
    pub fn comment_created(comment: CommentView) -> Self {
        let parent_id = comment.parent_id;
        ForumEvent::CommentCreated { comment, parent_id }
    }

    pub fn comment_updated(comment: CommentView) -> Self {
        ForumEvent::CommentUpdated { comment }
    }

    pub fn comment_deleted(comment_id: CommentId, parent_id: Option<CommentId>) -> Self {
        ForumEvent::CommentDeleted {
            comment_id,
            parent_id,
        }
    }

    pub fn reply_count_updated(comment_id: CommentId, reply_count: u32, total_replies: u32) -> Self {
        ForumEvent::ReplyCountUpdated {
            comment_id,
            reply_count,
            total_replies,
        }
    }

    pub fn notification_created(notification: NotificationView) -> Self {
        let recipient_id = notification.user_id;
        ForumEvent::NotificationCreated {
            notification,
            recipient_id,
        }
    }

    pub fn notification_updated(notification: NotificationView) -> Self {
        let recipient_id = notification.user_id;
        ForumEvent::NotificationUpdated {
            notification,
            recipient_id,
        }
    }

    pub fn notification_deleted(notification_id: NotificationId, recipient_id: UserId) -> Self {
        ForumEvent::NotificationDeleted {
            notification_id,
            recipient_id,
        }
    }

    pub fn notification_bulk_updated(
        recipient_id: UserId,
        operation: BulkOperation,
        affected: u64,
    ) -> Self {
        ForumEvent::NotificationBulkUpdated {
            recipient_id,
            operation,
            affected,
        }
    }
}
