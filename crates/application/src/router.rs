//! 通知频道路由
//!
//! 记录每个用户的私有通知频道当前挂着哪些连接。授权约束
//! （只能订阅自己的频道）在连接生命周期层校验，这里只做成员登记。

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use domain::{ConnectionId, UserId};

#[derive(Default)]
pub struct NotificationRoomRouter {
    channels: RwLock<HashMap<UserId, HashSet<ConnectionId>>>,
}

impl NotificationRoomRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅。重复订阅是幂等的，返回是否为新增。
    pub async fn subscribe(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        let mut channels = self.channels.write().await;
        channels.entry(user_id).or_default().insert(connection_id)
    }

    /// 退订。频道在最后一个连接退订时销毁。
    pub async fn unsubscribe(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        let mut channels = self.channels.write().await;
        let Some(connections) = channels.get_mut(&user_id) else {
            return false;
        };
        let removed = connections.remove(&connection_id);
        if connections.is_empty() {
            channels.remove(&user_id);
        }
        removed
    }

    /// 该用户频道上的全部连接（推送目标）。
    pub async fn subscribers(&self, user_id: UserId) -> Vec<ConnectionId> {
        let channels = self.channels.read().await;
        channels
            .get(&user_id)
            .map(|connections| connections.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// 清扫空频道（兜底，正常路径下频道自行销毁）。
    pub async fn sweep(&self) {
        let mut channels = self.channels.write().await;
        channels.retain(|_, connections| !connections.is_empty());
    }
}
