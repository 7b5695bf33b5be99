use std::sync::Arc;

use application::{
    ConnectionRegistry, ConnectionThrottler, NotificationRoomRouter, ThreadPresenceTracker,
};
use domain::{CommentRepository, NotificationRepository};

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub presence: Arc<ThreadPresenceTracker>,
    pub notification_router: Arc<NotificationRoomRouter>,
    pub throttler: Arc<ConnectionThrottler>,
    pub comments: Arc<dyn CommentRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        presence: Arc<ThreadPresenceTracker>,
        notification_router: Arc<NotificationRoomRouter>,
        throttler: Arc<ConnectionThrottler>,
        comments: Arc<dyn CommentRepository>,
        notifications: Arc<dyn NotificationRepository>,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        Self {
            registry,
            presence,
            notification_router,
            throttler,
            comments,
            notifications,
            jwt_service,
        }
    }
}
