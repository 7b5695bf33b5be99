//! 讨论串在场状态追踪器
//!
//! 记录每个讨论串当前有哪些用户在看。成员关系按（用户, 连接）记录：
//! 同一用户开多个连接只算一个观看者，且只有当该用户在这个房间里的
//! 最后一个连接离开时才算真正离场。viewer_count 始终从集合大小推导，
//! 不单独存储。

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use domain::{CommentId, ConnectionId, UserId};

#[derive(Default)]
struct ThreadRoom {
    /// 用户 -> 该用户在本房间内的存活连接
    viewers: HashMap<UserId, HashSet<ConnectionId>>,
}

impl ThreadRoom {
    fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    fn connection_ids(&self) -> Vec<ConnectionId> {
        self.viewers.values().flatten().copied().collect()
    }
}

/// join 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    pub viewer_count: usize,
    /// 该用户是否是首次进入此房间（已在场用户重复 join 时为 false）
    pub newly_joined: bool,
}

/// leave 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveOutcome {
    pub viewer_count: usize,
    /// 该用户是否真正离场（仍有其他连接在房间时为 false）
    pub user_left: bool,
}

/// 断开清理时单个房间的离场记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadDeparture {
    pub thread_id: CommentId,
    pub viewer_count: usize,
    pub user_left: bool,
}

#[derive(Default)]
pub struct ThreadPresenceTracker {
    rooms: RwLock<HashMap<CommentId, ThreadRoom>>,
}

impl ThreadPresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入讨论串房间。房间在首次 join 时创建。
    ///
    /// 注意：目标评论是否存在由调用方先行校验，这里只管成员关系。
    pub async fn join(
        &self,
        thread_id: CommentId,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> JoinOutcome {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(thread_id).or_default();
        let connections = room.viewers.entry(user_id).or_default();
        let newly_joined = connections.is_empty();
        connections.insert(connection_id);
        JoinOutcome {
            viewer_count: room.viewer_count(),
            newly_joined,
        }
    }

    /// 离开讨论串房间（按连接）。房间在最后一个观看者离开时销毁。
    pub async fn leave(
        &self,
        thread_id: CommentId,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> LeaveOutcome {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(&thread_id) else {
            return LeaveOutcome {
                viewer_count: 0,
                user_left: false,
            };
        };

        let mut user_left = false;
        if let Some(connections) = room.viewers.get_mut(&user_id) {
            connections.remove(&connection_id);
            if connections.is_empty() {
                room.viewers.remove(&user_id);
                user_left = true;
            }
        }

        let viewer_count = room.viewer_count();
        if viewer_count == 0 {
            rooms.remove(&thread_id);
        }
        LeaveOutcome {
            viewer_count,
            user_left,
        }
    }

    /// 断开清理：把该连接从所有房间移除，返回每个受影响房间的离场记录。
    pub async fn leave_all(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Vec<ThreadDeparture> {
        let mut rooms = self.rooms.write().await;
        let mut departures = Vec::new();
        let mut emptied = Vec::new();

        for (thread_id, room) in rooms.iter_mut() {
            let Some(connections) = room.viewers.get_mut(&user_id) else {
                continue;
            };
            if !connections.remove(&connection_id) {
                continue;
            }
            let mut user_left = false;
            if connections.is_empty() {
                room.viewers.remove(&user_id);
                user_left = true;
            }
            departures.push(ThreadDeparture {
                thread_id: *thread_id,
                viewer_count: room.viewer_count(),
                user_left,
            });
            if room.viewer_count() == 0 {
                emptied.push(*thread_id);
            }
        }

        for thread_id in emptied {
            rooms.remove(&thread_id);
        }
        departures
    }

    /// 当前观看人数（按用户去重）。未知房间为 0。
    pub async fn viewer_count(&self, thread_id: CommentId) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(&thread_id).map(|r| r.viewer_count()).unwrap_or(0)
    }

    /// 房间内全部存活连接（广播目标）。
    pub async fn connections(&self, thread_id: CommentId) -> Vec<ConnectionId> {
        let rooms = self.rooms.read().await;
        rooms
            .get(&thread_id)
            .map(|r| r.connection_ids())
            .unwrap_or_default()
    }

    pub async fn active_thread_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// 所有房间观看人数之和（同一用户看多个讨论串会被计多次）。
    pub async fn total_viewers(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.values().map(|r| r.viewer_count()).sum()
    }

    /// 清扫空房间。正常路径下房间会自行销毁，这里只是兜底回收。
    pub async fn sweep(&self) {
        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, room| room.viewer_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ids() -> (CommentId, UserId, ConnectionId) {
        (
            CommentId::new(Uuid::new_v4()),
            UserId::from(Uuid::new_v4()),
            ConnectionId::generate(),
        )
    }

    #[tokio::test]
    async fn join_is_idempotent_per_user() {
        let tracker = ThreadPresenceTracker::new();
        let (thread_id, user_id, connection_id) = ids();

        let first = tracker.join(thread_id, user_id, connection_id).await;
        assert_eq!(first.viewer_count, 1);
        assert!(first.newly_joined);

        // 同一（用户, 连接）重复 join 不改变人数
        let second = tracker.join(thread_id, user_id, connection_id).await;
        assert_eq!(second.viewer_count, 1);
        assert!(!second.newly_joined);
    }

    #[tokio::test]
    async fn second_connection_of_same_user_counts_once() {
        let tracker = ThreadPresenceTracker::new();
        let (thread_id, user_id, conn_a) = ids();
        let conn_b = ConnectionId::generate();

        tracker.join(thread_id, user_id, conn_a).await;
        let outcome = tracker.join(thread_id, user_id, conn_b).await;
        assert_eq!(outcome.viewer_count, 1);
        assert!(!outcome.newly_joined);

        // 先断开一个连接：用户仍在场
        let leave = tracker.leave(thread_id, user_id, conn_a).await;
        assert_eq!(leave.viewer_count, 1);
        assert!(!leave.user_left);

        // 最后一个连接离开：用户离场，房间销毁
        let leave = tracker.leave(thread_id, user_id, conn_b).await;
        assert_eq!(leave.viewer_count, 0);
        assert!(leave.user_left);
        assert_eq!(tracker.active_thread_count().await, 0);
    }

    #[tokio::test]
    async fn leave_unknown_room_is_noop() {
        let tracker = ThreadPresenceTracker::new();
        let (thread_id, user_id, connection_id) = ids();

        let outcome = tracker.leave(thread_id, user_id, connection_id).await;
        assert_eq!(outcome.viewer_count, 0);
        assert!(!outcome.user_left);
    }

    #[tokio::test]
    async fn leave_all_reports_each_room() {
        let tracker = ThreadPresenceTracker::new();
        let (thread_a, user_id, connection_id) = ids();
        let thread_b = CommentId::new(Uuid::new_v4());
        let other_user = UserId::from(Uuid::new_v4());
        let other_conn = ConnectionId::generate();

        tracker.join(thread_a, user_id, connection_id).await;
        tracker.join(thread_b, user_id, connection_id).await;
        tracker.join(thread_b, other_user, other_conn).await;

        let mut departures = tracker.leave_all(user_id, connection_id).await;
        departures.sort_by_key(|d| d.viewer_count);
        assert_eq!(departures.len(), 2);

        // thread_a 只有一个观看者，离开后房间销毁
        assert_eq!(departures[0].viewer_count, 0);
        assert!(departures[0].user_left);
        // thread_b 还剩另一位观看者
        assert_eq!(departures[1].viewer_count, 1);
        assert!(departures[1].user_left);

        assert_eq!(tracker.active_thread_count().await, 1);
        assert_eq!(tracker.viewer_count(thread_b).await, 1);
    }

    #[tokio::test]
    async fn connections_lists_every_member_connection() {
        let tracker = ThreadPresenceTracker::new();
        let (thread_id, user_a, conn_a) = ids();
        let user_b = UserId::from(Uuid::new_v4());
        let conn_b = ConnectionId::generate();

        tracker.join(thread_id, user_a, conn_a).await;
        tracker.join(thread_id, user_b, conn_b).await;

        let mut connections = tracker.connections(thread_id).await;
        connections.sort_by_key(|c| c.0);
        let mut expected = vec![conn_a, conn_b];
        expected.sort_by_key(|c| c.0);
        assert_eq!(connections, expected);
        assert_eq!(tracker.total_viewers().await, 2);
    }
}
