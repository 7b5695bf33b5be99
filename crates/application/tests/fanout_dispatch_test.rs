//! 扇出调度器的端到端路由测试：事件进 -> 定向推送出。

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use application::{
    ConnectionIdentity, ConnectionRegistry, EventFanoutDispatcher, MemoryNotificationRepository,
    NotificationRoomRouter, ThreadPresenceTracker,
};
use domain::{
    BulkOperation, CommentAuthor, CommentId, CommentView, ConnectionId, ForumEvent,
    NotificationId, NotificationView, ServerMessage, UserId,
};

struct TestClient {
    connection_id: ConnectionId,
    user_id: UserId,
    rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl TestClient {
    /// 收取目前积压的所有推送。
    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            messages.push(message);
        }
        messages
    }
}

struct Harness {
    registry: Arc<ConnectionRegistry>,
    presence: Arc<ThreadPresenceTracker>,
    router: Arc<NotificationRoomRouter>,
    notifications: Arc<MemoryNotificationRepository>,
    dispatcher: EventFanoutDispatcher,
}

impl Harness {
    fn new() -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let presence = Arc::new(ThreadPresenceTracker::new());
        let router = Arc::new(NotificationRoomRouter::new());
        let notifications = Arc::new(MemoryNotificationRepository::new());
        let dispatcher = EventFanoutDispatcher::new(
            registry.clone(),
            presence.clone(),
            router.clone(),
            notifications.clone(),
        );
        Self {
            registry,
            presence,
            router,
            notifications,
            dispatcher,
        }
    }

    async fn connect(&self) -> TestClient {
        let user_id = UserId::from(Uuid::new_v4());
        let connection_id = ConnectionId::generate();
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry
            .register(
                ConnectionIdentity {
                    connection_id,
                    user_id,
                    username: format!("user-{}", &user_id.to_string()[..8]),
                    connected_at: Utc::now(),
                },
                tx,
            )
            .await;
        TestClient {
            connection_id,
            user_id,
            rx,
        }
    }
}

fn comment(id: CommentId, parent_id: Option<CommentId>, deleted: bool) -> CommentView {
    let author_id = UserId::from(Uuid::new_v4());
    CommentView {
        id,
        text: "interesting take".to_string(),
        author: Some(CommentAuthor {
            id: author_id,
            username: "poster".to_string(),
        }),
        parent_id,
        is_deleted: deleted,
        reply_count: 0,
        total_replies: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn notification(user_id: UserId) -> NotificationView {
    NotificationView {
        id: NotificationId::new(Uuid::new_v4()),
        user_id,
        comment_id: CommentId::new(Uuid::new_v4()),
        is_read: false,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn reply_fans_out_to_parent_thread_members_only() {
    let harness = Harness::new();
    let thread_id = CommentId::new(Uuid::new_v4());
    let other_thread = CommentId::new(Uuid::new_v4());

    let mut member_a = harness.connect().await;
    let mut member_b = harness.connect().await;
    let mut bystander = harness.connect().await;

    harness
        .presence
        .join(thread_id, member_a.user_id, member_a.connection_id)
        .await;
    harness
        .presence
        .join(thread_id, member_b.user_id, member_b.connection_id)
        .await;
    harness
        .presence
        .join(other_thread, bystander.user_id, bystander.connection_id)
        .await;

    let reply = comment(CommentId::new(Uuid::new_v4()), Some(thread_id), false);
    harness
        .dispatcher
        .dispatch(ForumEvent::comment_created(reply.clone()))
        .await
        .unwrap();

    for client in [&mut member_a, &mut member_b] {
        let messages = client.drain();
        assert_eq!(messages.len(), 1, "每个房间成员恰好收到一条推送");
        match &messages[0] {
            ServerMessage::NewReply {
                reply: pushed,
                thread_id: pushed_thread,
                ..
            } => {
                assert_eq!(pushed.id, reply.id);
                assert_eq!(*pushed_thread, thread_id);
            }
            other => panic!("expected new-reply, got {:?}", other),
        }
    }
    assert!(bystander.drain().is_empty(), "其他房间不应收到推送");
}

#[tokio::test]
async fn top_level_comment_creates_no_push() {
    let harness = Harness::new();
    let thread_id = CommentId::new(Uuid::new_v4());
    let mut member = harness.connect().await;
    harness
        .presence
        .join(thread_id, member.user_id, member.connection_id)
        .await;

    let top_level = comment(CommentId::new(Uuid::new_v4()), None, false);
    harness
        .dispatcher
        .dispatch(ForumEvent::comment_created(top_level))
        .await
        .unwrap();

    assert!(member.drain().is_empty());
}

#[tokio::test]
async fn comment_update_dual_room_is_deduplicated_per_connection() {
    let harness = Harness::new();
    let parent_id = CommentId::new(Uuid::new_v4());
    let comment_id = CommentId::new(Uuid::new_v4());

    // 同一连接同时在评论自身房间和父级房间
    let mut client = harness.connect().await;
    harness
        .presence
        .join(comment_id, client.user_id, client.connection_id)
        .await;
    harness
        .presence
        .join(parent_id, client.user_id, client.connection_id)
        .await;

    let updated = comment(comment_id, Some(parent_id), false);
    harness
        .dispatcher
        .dispatch(ForumEvent::comment_updated(updated))
        .await
        .unwrap();

    let messages = client.drain();
    assert_eq!(messages.len(), 1, "双房间目标必须按连接去重");
    assert!(matches!(messages[0], ServerMessage::CommentUpdated { .. }));
}

#[tokio::test]
async fn deleted_comment_is_redacted_before_push() {
    let harness = Harness::new();
    let parent_id = CommentId::new(Uuid::new_v4());
    let mut client = harness.connect().await;
    harness
        .presence
        .join(parent_id, client.user_id, client.connection_id)
        .await;

    let deleted = comment(CommentId::new(Uuid::new_v4()), Some(parent_id), true);
    harness
        .dispatcher
        .dispatch(ForumEvent::comment_updated(deleted))
        .await
        .unwrap();

    let messages = client.drain();
    match &messages[0] {
        ServerMessage::CommentUpdated { comment, .. } => {
            assert_eq!(comment.text, "[deleted]");
            assert!(comment.author.is_none());
        }
        other => panic!("expected comment-updated, got {:?}", other),
    }
}

#[tokio::test]
async fn comment_delete_reaches_own_and_parent_rooms() {
    let harness = Harness::new();
    let parent_id = CommentId::new(Uuid::new_v4());
    let comment_id = CommentId::new(Uuid::new_v4());

    let mut in_own_room = harness.connect().await;
    let mut in_parent_room = harness.connect().await;
    harness
        .presence
        .join(comment_id, in_own_room.user_id, in_own_room.connection_id)
        .await;
    harness
        .presence
        .join(
            parent_id,
            in_parent_room.user_id,
            in_parent_room.connection_id,
        )
        .await;

    harness
        .dispatcher
        .dispatch(ForumEvent::comment_deleted(comment_id, Some(parent_id)))
        .await
        .unwrap();

    for client in [&mut in_own_room, &mut in_parent_room] {
        let messages = client.drain();
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            ServerMessage::CommentDeleted { id, .. } => assert_eq!(*id, comment_id),
            other => panic!("expected comment-deleted, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn notification_push_is_followed_by_fresh_unread_count() {
    let harness = Harness::new();
    let mut client = harness.connect().await;
    harness
        .router
        .subscribe(client.user_id, client.connection_id)
        .await;

    // 持久层已有两条未读；第三条刚创建（事件发布前已入库）
    harness.notifications.insert(notification(client.user_id)).await;
    harness.notifications.insert(notification(client.user_id)).await;
    let fresh = notification(client.user_id);
    harness.notifications.insert(fresh.clone()).await;

    harness
        .dispatcher
        .dispatch(ForumEvent::notification_created(fresh.clone()))
        .await
        .unwrap();

    let messages = client.drain();
    assert_eq!(messages.len(), 2, "通知推送后必须紧跟未读数推送");
    match &messages[0] {
        ServerMessage::NewNotification { notification, .. } => {
            assert_eq!(notification.id, fresh.id)
        }
        other => panic!("expected new-notification, got {:?}", other),
    }
    match &messages[1] {
        ServerMessage::UnreadCount { count, .. } => assert_eq!(*count, 3),
        other => panic!("expected unread-count, got {:?}", other),
    }
}

#[tokio::test]
async fn notification_events_target_recipient_channel_only() {
    let harness = Harness::new();
    let mut recipient = harness.connect().await;
    let mut stranger = harness.connect().await;
    harness
        .router
        .subscribe(recipient.user_id, recipient.connection_id)
        .await;
    harness
        .router
        .subscribe(stranger.user_id, stranger.connection_id)
        .await;

    let n = notification(recipient.user_id);
    harness.notifications.insert(n.clone()).await;
    harness
        .dispatcher
        .dispatch(ForumEvent::notification_deleted(n.id, recipient.user_id))
        .await
        .unwrap();

    assert_eq!(recipient.drain().len(), 2);
    assert!(stranger.drain().is_empty());
}

#[tokio::test]
async fn reply_count_update_targets_own_room() {
    let harness = Harness::new();
    let comment_id = CommentId::new(Uuid::new_v4());
    let mut client = harness.connect().await;
    harness
        .presence
        .join(comment_id, client.user_id, client.connection_id)
        .await;

    harness
        .dispatcher
        .dispatch(ForumEvent::reply_count_updated(comment_id, 4, 9))
        .await
        .unwrap();

    let messages = client.drain();
    assert_eq!(messages.len(), 1);
    match &messages[0] {
        ServerMessage::ReplyCountUpdated {
            comment_id: pushed,
            count,
            total_replies,
            ..
        } => {
            assert_eq!(*pushed, comment_id);
            assert_eq!(*count, 4);
            assert_eq!(*total_replies, 9);
        }
        other => panic!("expected reply-count-updated, got {:?}", other),
    }
}

#[tokio::test]
async fn notification_update_pushes_updated_view() {
    let harness = Harness::new();
    let mut client = harness.connect().await;
    harness
        .router
        .subscribe(client.user_id, client.connection_id)
        .await;

    let mut n = notification(client.user_id);
    n.is_read = true;
    harness.notifications.insert(n.clone()).await;
    harness
        .dispatcher
        .dispatch(ForumEvent::notification_updated(n.clone()))
        .await
        .unwrap();

    let messages = client.drain();
    assert_eq!(messages.len(), 2);
    match &messages[0] {
        ServerMessage::NotificationUpdated { notification, .. } => {
            assert_eq!(notification.id, n.id);
            assert!(notification.is_read);
        }
        other => panic!("expected notification-updated, got {:?}", other),
    }
    assert!(matches!(
        messages[1],
        ServerMessage::UnreadCount { count: 0, .. }
    ));
}

#[tokio::test]
async fn bulk_mark_all_read_pushes_zero_unread() {
    let harness = Harness::new();
    let mut client = harness.connect().await;
    harness
        .router
        .subscribe(client.user_id, client.connection_id)
        .await;

    // 批量事件发布时持久层已全部标记为已读
    let mut a = notification(client.user_id);
    let mut b = notification(client.user_id);
    a.is_read = true;
    b.is_read = true;
    harness.notifications.insert(a).await;
    harness.notifications.insert(b).await;

    harness
        .dispatcher
        .dispatch(ForumEvent::notification_bulk_updated(
            client.user_id,
            BulkOperation::MarkAllRead,
            2,
        ))
        .await
        .unwrap();

    let messages = client.drain();
    assert_eq!(messages.len(), 2);
    match &messages[0] {
        ServerMessage::NotificationBulkUpdated {
            operation,
            affected,
            ..
        } => {
            assert_eq!(*operation, BulkOperation::MarkAllRead);
            assert_eq!(*affected, 2);
        }
        other => panic!("expected notification-bulk-updated, got {:?}", other),
    }
    assert!(matches!(
        messages[1],
        ServerMessage::UnreadCount { count: 0, .. }
    ));
}

#[tokio::test]
async fn late_joiner_never_receives_past_events() {
    let harness = Harness::new();
    let thread_id = CommentId::new(Uuid::new_v4());

    // 房间为空时事件被安静丢弃
    let reply = comment(CommentId::new(Uuid::new_v4()), Some(thread_id), false);
    harness
        .dispatcher
        .dispatch(ForumEvent::comment_created(reply))
        .await
        .unwrap();

    // 之后才加入的连接不会补收历史事件
    let mut late = harness.connect().await;
    harness
        .presence
        .join(thread_id, late.user_id, late.connection_id)
        .await;
    assert!(late.drain().is_empty());
}
