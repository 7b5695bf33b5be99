//! 连接注册表
//!
//! 维护存活 WebSocket 连接到已认证身份的映射，并持有每个连接的
//! 出站发送端。所有推送都经由这里投递。

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, RwLock};

use domain::{ConnectionId, ServerMessage, Timestamp, UserId};

/// 已认证连接的身份信息，在认证成功时创建，断开时销毁。
#[derive(Debug, Clone)]
pub struct ConnectionIdentity {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub username: String,
    pub connected_at: Timestamp,
}

struct RegisteredConnection {
    identity: ConnectionIdentity,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

/// 注册表状态快照
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RegistryStats {
    pub connected_clients: usize,
    pub connected_users: usize,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, RegisteredConnection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记连接。同一 connection_id 至多一条记录。
    pub async fn register(
        &self,
        identity: ConnectionIdentity,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) {
        let mut connections = self.connections.write().await;
        let connection_id = identity.connection_id;
        if connections
            .insert(connection_id, RegisteredConnection { identity, sender })
            .is_some()
        {
            tracing::warn!(connection_id = %connection_id, "连接 ID 重复登记，旧记录被替换");
        }
    }

    pub async fn unregister(&self, connection_id: ConnectionId) -> Option<ConnectionIdentity> {
        let mut connections = self.connections.write().await;
        connections.remove(&connection_id).map(|c| c.identity)
    }

    pub async fn identity(&self, connection_id: ConnectionId) -> Option<ConnectionIdentity> {
        let connections = self.connections.read().await;
        connections.get(&connection_id).map(|c| c.identity.clone())
    }

    /// 向单个连接投递。连接已消失或通道已关闭时返回 false。
    pub async fn send(&self, connection_id: ConnectionId, message: ServerMessage) -> bool {
        let connections = self.connections.read().await;
        match connections.get(&connection_id) {
            Some(connection) => connection.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// 向一组连接投递同一条消息，返回成功送入通道的数量。
    pub async fn send_to_all(
        &self,
        connection_ids: &[ConnectionId],
        message: &ServerMessage,
    ) -> usize {
        let connections = self.connections.read().await;
        let mut delivered = 0;
        for connection_id in connection_ids {
            if let Some(connection) = connections.get(connection_id) {
                if connection.sender.send(message.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn user_connection_count(&self, user_id: UserId) -> usize {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|c| c.identity.user_id == user_id)
            .count()
    }

    pub async fn is_user_connected(&self, user_id: UserId) -> bool {
        self.user_connection_count(user_id).await > 0
    }

    pub async fn stats(&self) -> RegistryStats {
        let connections = self.connections.read().await;
        let users: HashSet<UserId> = connections.values().map(|c| c.identity.user_id).collect();
        RegistryStats {
            connected_clients: connections.len(),
            connected_users: users.len(),
        }
    }
}
