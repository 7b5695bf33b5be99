//! 事件扇出调度器
//!
//! 订阅领域事件总线，把每个事件转成对目标房间/频道的定向推送。
//! 每个事件标签对应一条纯路由规则：事件载荷 -> (目标连接集, 消息)。
//!
//! 投递保证：对每个当前订阅的连接至多一次；跨房间不保证顺序；
//! 单条事件的处理失败只丢弃该次投递，调度循环本身不退出。

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use domain::{
    CommentId, ConnectionId, ForumEvent, NotificationRepository, ServerMessage, UserId,
};

use crate::error::RealtimeError;
use crate::presence::ThreadPresenceTracker;
use crate::registry::ConnectionRegistry;
use crate::router::NotificationRoomRouter;

pub struct EventFanoutDispatcher {
    registry: Arc<ConnectionRegistry>,
    presence: Arc<ThreadPresenceTracker>,
    router: Arc<NotificationRoomRouter>,
    notifications: Arc<dyn NotificationRepository>,
}

impl EventFanoutDispatcher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        presence: Arc<ThreadPresenceTracker>,
        router: Arc<NotificationRoomRouter>,
        notifications: Arc<dyn NotificationRepository>,
    ) -> Self {
        Self {
            registry,
            presence,
            router,
            notifications,
        }
    }

    /// 在后台任务中消费事件流。
    pub fn spawn(self: Arc<Self>, receiver: broadcast::Receiver<ForumEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(receiver).await;
        })
    }

    /// 调度主循环。单条事件的失败只记录日志，不中断消费。
    pub async fn run(&self, mut receiver: broadcast::Receiver<ForumEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(err) = self.dispatch(event).await {
                        tracing::error!(error = %err, "事件扇出失败，本次投递被丢弃");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "扇出调度器消费滞后，跳过积压事件");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("事件总线已关闭，扇出调度器退出");
                    break;
                }
            }
        }
    }

    /// 路由单个事件。
    pub async fn dispatch(&self, event: ForumEvent) -> Result<(), RealtimeError> {
        let timestamp = Utc::now();
        match event {
            ForumEvent::CommentCreated { comment, parent_id } => {
                // 只有回复才推送；顶层评论没有所属讨论串房间
                let Some(thread_id) = parent_id else {
                    return Ok(());
                };
                let message = ServerMessage::NewReply {
                    reply: comment.redacted(),
                    thread_id,
                    timestamp,
                };
                self.push_to_threads(&[thread_id], message).await;
            }

            ForumEvent::CommentUpdated { comment } => {
                let rooms = comment.room_keys();
                let message = ServerMessage::CommentUpdated {
                    comment: comment.redacted(),
                    timestamp,
                };
                self.push_to_threads(&rooms, message).await;
            }

            ForumEvent::CommentDeleted {
                comment_id,
                parent_id,
            } => {
                let mut rooms = vec![comment_id];
                if let Some(parent_id) = parent_id {
                    rooms.push(parent_id);
                }
                let message = ServerMessage::CommentDeleted {
                    id: comment_id,
                    timestamp,
                };
                self.push_to_threads(&rooms, message).await;
            }

            ForumEvent::ReplyCountUpdated {
                comment_id,
                reply_count,
                total_replies,
            } => {
                let message = ServerMessage::ReplyCountUpdated {
                    comment_id,
                    count: reply_count,
                    total_replies,
                    timestamp,
                };
                self.push_to_threads(&[comment_id], message).await;
            }

            ForumEvent::NotificationCreated {
                notification,
                recipient_id,
            } => {
                let message = ServerMessage::NewNotification {
                    notification,
                    timestamp,
                };
                self.push_to_channel(recipient_id, message).await;
                self.push_unread_count(recipient_id).await?;
            }

            ForumEvent::NotificationUpdated {
                notification,
                recipient_id,
            } => {
                let message = ServerMessage::NotificationUpdated {
                    notification,
                    timestamp,
                };
                self.push_to_channel(recipient_id, message).await;
                self.push_unread_count(recipient_id).await?;
            }

            ForumEvent::NotificationDeleted {
                notification_id,
                recipient_id,
            } => {
                let message = ServerMessage::NotificationDeleted {
                    notification_id,
                    timestamp,
                };
                self.push_to_channel(recipient_id, message).await;
                self.push_unread_count(recipient_id).await?;
            }

            ForumEvent::NotificationBulkUpdated {
                recipient_id,
                operation,
                affected,
            } => {
                let message = ServerMessage::NotificationBulkUpdated {
                    operation,
                    affected,
                    timestamp,
                };
                self.push_to_channel(recipient_id, message).await;
                self.push_unread_count(recipient_id).await?;
            }
        }
        Ok(())
    }

    /// 推送到一组讨论串房间。同一连接出现在多个目标房间时去重，
    /// 保证单个事件对单个连接至多推一次。
    async fn push_to_threads(&self, rooms: &[CommentId], message: ServerMessage) -> usize {
        let mut targets: HashSet<ConnectionId> = HashSet::new();
        for thread_id in rooms {
            targets.extend(self.presence.connections(*thread_id).await);
        }
        if targets.is_empty() {
            return 0;
        }
        let connection_ids: Vec<ConnectionId> = targets.into_iter().collect();
        let delivered = self.registry.send_to_all(&connection_ids, &message).await;
        tracing::debug!(rooms = rooms.len(), delivered, "讨论串事件已扇出");
        delivered
    }

    /// 推送到某个用户的私有通知频道。
    async fn push_to_channel(&self, recipient_id: UserId, message: ServerMessage) -> usize {
        let subscribers = self.router.subscribers(recipient_id).await;
        if subscribers.is_empty() {
            return 0;
        }
        self.registry.send_to_all(&subscribers, &message).await
    }

    /// 每次通知推送后补发最新未读数。计数总是现查，避免与底层状态漂移；
    /// 查询是挂起点，之后重新解析订阅者集合再发送。
    async fn push_unread_count(&self, recipient_id: UserId) -> Result<(), RealtimeError> {
        let count = self.notifications.unread_count(recipient_id).await?;
        let message = ServerMessage::UnreadCount {
            count,
            timestamp: Utc::now(),
        };
        self.push_to_channel(recipient_id, message).await;
        Ok(())
    }
}
