//! WebSocket 线上协议。
//!
//! 所有帧都是 JSON 文本：`{"event": "<事件名>", "data": {...}}`，
//! 无载荷的命令省略 `data` 字段。事件名与字段名沿用客户端既有约定
//! （kebab-case 事件名、camelCase 字段名）。

use serde::{Deserialize, Serialize};

use crate::entities::comment::CommentView;
use crate::entities::notification::{BulkOperation, NotificationView};
use crate::value_objects::{CommentId, NotificationId, Timestamp, UserId};

/// 评论讨论串命名空间（`/ws/comments`）的客户端命令。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ThreadClientMessage {
    JoinThread { thread_id: CommentId },
    LeaveThread { thread_id: CommentId },
    GetThreadStats { thread_id: CommentId },
    Ping,
}

/// 通知命名空间（`/ws/notifications`）的客户端命令。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum NotifyClientMessage {
    /// 订阅自己的通知频道。`user_id` 仅用于越权校验，只能是自己。
    SubscribeNotifications { user_id: Option<UserId> },
    UnsubscribeNotifications { user_id: Option<UserId> },
    MarkNotificationRead { notification_id: NotificationId },
    GetUnreadCount,
    Ping,
}

/// 服务端推送的消息（两个命名空间共用）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    Connected {
        user_id: UserId,
        timestamp: Timestamp,
    },
    Error {
        message: String,
    },
    Pong {
        timestamp: Timestamp,
        user_id: UserId,
    },

    // ---- 讨论串在场状态 ----
    ThreadJoined {
        thread_id: CommentId,
        user_count: usize,
        timestamp: Timestamp,
    },
    ThreadUserJoined {
        thread_id: CommentId,
        user_count: usize,
        timestamp: Timestamp,
    },
    ThreadLeft {
        thread_id: CommentId,
        user_count: usize,
        timestamp: Timestamp,
    },
    ThreadUserLeft {
        thread_id: CommentId,
        user_count: usize,
        timestamp: Timestamp,
    },
    ThreadStats {
        thread_id: CommentId,
        user_count: usize,
        timestamp: Timestamp,
    },

    // ---- 评论事件扇出 ----
    NewReply {
        reply: CommentView,
        thread_id: CommentId,
        timestamp: Timestamp,
    },
    ReplyCountUpdated {
        comment_id: CommentId,
        count: u32,
        total_replies: u32,
        timestamp: Timestamp,
    },
    CommentUpdated {
        comment: CommentView,
        timestamp: Timestamp,
    },
    CommentDeleted {
        id: CommentId,
        timestamp: Timestamp,
    },

    // ---- 通知频道 ----
    Subscribed {
        user_id: UserId,
        timestamp: Timestamp,
    },
    Unsubscribed {
        user_id: UserId,
        timestamp: Timestamp,
    },
    NewNotification {
        notification: NotificationView,
        timestamp: Timestamp,
    },
    NotificationUpdated {
        notification: NotificationView,
        timestamp: Timestamp,
    },
    NotificationDeleted {
        notification_id: NotificationId,
        timestamp: Timestamp,
    },
    NotificationBulkUpdated {
        operation: BulkOperation,
        affected: u64,
        timestamp: Timestamp,
    },
    UnreadCount {
        count: u64,
        timestamp: Timestamp,
    },
    NotificationMarkedRead {
        notification_id: NotificationId,
        timestamp: Timestamp,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
