//! 后台清扫任务
//!
//! 周期性回收过期限流窗口和空的在场/频道条目，防止内存泄漏。
//! 只做垃圾回收：活动期内的窗口和非空条目绝不触碰。

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::presence::ThreadPresenceTracker;
use crate::rate_limiter::ConnectionThrottler;
use crate::router::NotificationRoomRouter;

pub struct Sweeper {
    throttler: Arc<ConnectionThrottler>,
    presence: Arc<ThreadPresenceTracker>,
    router: Arc<NotificationRoomRouter>,
    interval: Duration,
}

impl Sweeper {
    pub fn new(
        throttler: Arc<ConnectionThrottler>,
        presence: Arc<ThreadPresenceTracker>,
        router: Arc<NotificationRoomRouter>,
        interval: Duration,
    ) -> Self {
        Self {
            throttler,
            presence,
            router,
            interval,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // 首个 tick 立即触发，对空表是无害的空操作
            loop {
                ticker.tick().await;
                self.throttler.cleanup();
                self.presence.sweep().await;
                self.router.sweep().await;

                let stats = self.throttler.stats();
                tracing::debug!(
                    connection_windows = stats.connection_windows,
                    message_windows = stats.message_windows,
                    tracked_users = stats.tracked_users,
                    "清扫完成"
                );
            }
        })
    }
}
