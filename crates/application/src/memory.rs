//! 内存实现的持久化协作方（用于测试和本地运行）。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use domain::{
    CommentId, CommentRepository, CommentView, NotificationId, NotificationRepository,
    NotificationView, RepositoryError, UserId,
};

#[derive(Default)]
pub struct MemoryCommentRepository {
    comments: RwLock<HashMap<CommentId, CommentView>>,
}

impl MemoryCommentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, comment: CommentView) {
        let mut comments = self.comments.write().await;
        comments.insert(comment.id, comment);
    }
}

#[async_trait]
impl CommentRepository for MemoryCommentRepository {
    async fn find_by_id(&self, id: CommentId) -> Result<Option<CommentView>, RepositoryError> {
        let comments = self.comments.read().await;
        Ok(comments.get(&id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryNotificationRepository {
    notifications: RwLock<HashMap<NotificationId, NotificationView>>,
}

impl MemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, notification: NotificationView) {
        let mut notifications = self.notifications.write().await;
        notifications.insert(notification.id, notification);
    }
}

#[async_trait]
impl NotificationRepository for MemoryNotificationRepository {
    async fn unread_count(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let notifications = self.notifications.read().await;
        Ok(notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count() as u64)
    }

    async fn mark_read(
        &self,
        id: NotificationId,
        user_id: UserId,
    ) -> Result<NotificationView, RepositoryError> {
        let mut notifications = self.notifications.write().await;
        // 归属校验和存在性校验同样返回 NotFound，不泄露他人通知的存在
        match notifications.get_mut(&id) {
            Some(notification) if notification.user_id == user_id => {
                notification.is_read = true;
                Ok(notification.clone())
            }
            _ => Err(RepositoryError::NotFound),
        }
    }
}
