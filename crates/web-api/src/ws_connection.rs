//! WebSocket 连接生命周期
//!
//! 两个命名空间共用同一条准入链和收发骨架：
//! 1. 准入：IP 限流 -> 凭证存在性 -> JWT 验证 -> 单用户并发上限。
//!    任何一步失败都回发一条错误帧后关闭连接。
//! 2. 会话：出站走 mpsc 通道（注册表持有发送端），入站逐帧解析、
//!    逐条过消息限流后交给命名空间各自的指令处理器。处理器返回的
//!    错误统一转成错误帧，是否随即断开由错误类别决定。
//! 3. 清理：断开时退出所有房间、退订频道、注销连接、释放并发额度。

use std::net::SocketAddr;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use application::{ConnectionIdentity, RealtimeError};
use domain::{
    CommentId, ConnectionId, NotifyClientMessage, ServerMessage, ThreadClientMessage,
};

use crate::state::AppState;

/// 准入检查。顺序是协议的一部分：IP 限流先于认证，
/// 这样洪水攻击在签名验证之前就被挡掉。
fn admit(
    state: &AppState,
    token: Option<&str>,
    ip: &str,
) -> Result<ConnectionIdentity, RealtimeError> {
    if !state.throttler.check_connection_limit(ip) {
        return Err(RealtimeError::ConnectionRateLimited);
    }

    let token = token.ok_or(RealtimeError::AuthenticationRequired)?;
    let claims = state.jwt_service.verify_token(token).map_err(|err| {
        tracing::debug!(error = ?err, "JWT 验证失败");
        RealtimeError::AuthenticationFailed
    })?;

    // 并发额度在这里占用，断开时必须归还
    state.throttler.add_connection(claims.sub)?;

    Ok(ConnectionIdentity {
        connection_id: ConnectionId::generate(),
        user_id: claims.sub,
        username: claims.username,
        connected_at: Utc::now(),
    })
}

/// 拒绝连接：回发一条错误帧，然后关闭。
async fn reject(mut socket: WebSocket, err: &RealtimeError) {
    let frame = ServerMessage::error(err.to_string());
    if let Ok(payload) = serde_json::to_string(&frame) {
        let _ = socket.send(WsMessage::Text(payload.into())).await;
    }
    let _ = socket.send(WsMessage::Close(None)).await;
    tracing::info!(error = %err, "WebSocket 连接被拒绝");
}

/// 讨论串命名空间（`/ws/comments`）。
pub(crate) async fn serve_comments(
    socket: WebSocket,
    state: AppState,
    addr: SocketAddr,
    token: Option<String>,
) {
    let identity = match admit(&state, token.as_deref(), &addr.ip().to_string()) {
        Ok(identity) => identity,
        Err(err) => {
            reject(socket, &err).await;
            return;
        }
    };
    run_session(socket, state, identity, Namespace::Comments).await;
}

/// 通知命名空间（`/ws/notifications`）。
pub(crate) async fn serve_notifications(
    socket: WebSocket,
    state: AppState,
    addr: SocketAddr,
    token: Option<String>,
) {
    let identity = match admit(&state, token.as_deref(), &addr.ip().to_string()) {
        Ok(identity) => identity,
        Err(err) => {
            reject(socket, &err).await;
            return;
        }
    };
    run_session(socket, state, identity, Namespace::Notifications).await;
}

#[derive(Clone, Copy, PartialEq)]
enum Namespace {
    Comments,
    Notifications,
}

async fn run_session(
    socket: WebSocket,
    state: AppState,
    identity: ConnectionIdentity,
    namespace: Namespace,
) {
    let connection_id = identity.connection_id;
    let user_id = identity.user_id;
    tracing::info!(
        connection_id = %connection_id,
        user_id = %user_id,
        username = %identity.username,
        "WebSocket 连接已建立"
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    state.registry.register(identity.clone(), tx).await;

    state
        .registry
        .send(
            connection_id,
            ServerMessage::Connected {
                user_id,
                timestamp: Utc::now(),
            },
        )
        .await;

    // 通知命名空间连接即订阅自己的频道，并立刻推一次未读数
    if namespace == Namespace::Notifications {
        state
            .notification_router
            .subscribe(user_id, connection_id)
            .await;
        push_unread_count(&state, &identity).await;
    }

    let (mut sender, mut incoming) = socket.split();

    // 发送任务：把注册表投递进来的消息序列化后写到 socket
    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let payload = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to serialize websocket payload");
                    continue;
                }
            };
            if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    // 接收循环：逐帧解析客户端指令
    while let Some(Ok(frame)) = incoming.next().await {
        match frame {
            WsMessage::Close(_) => break,
            WsMessage::Text(text) => {
                let result = handle_frame(&state, &identity, namespace, &text).await;
                if let Err(err) = result {
                    state
                        .registry
                        .send(connection_id, ServerMessage::error(err.to_string()))
                        .await;
                    if err.disconnects() {
                        break;
                    }
                }
            }
            // Ping/Pong 帧由底层协议栈处理，二进制帧直接忽略
            _ => {}
        }
    }

    send_task.abort();
    cleanup(&state, &identity).await;
}

/// 单条入站帧：限流 -> 解析 -> 分发。
async fn handle_frame(
    state: &AppState,
    identity: &ConnectionIdentity,
    namespace: Namespace,
    text: &str,
) -> Result<(), RealtimeError> {
    // 消息限流按用户计，超限丢弃本条消息但保持连接
    if !state.throttler.check_message_limit(identity.user_id) {
        return Err(RealtimeError::MessageRateLimited);
    }

    match namespace {
        Namespace::Comments => {
            let command: ThreadClientMessage = serde_json::from_str(text).map_err(|err| {
                tracing::debug!(error = %err, "无法解析的讨论串指令");
                RealtimeError::InvalidMessage
            })?;
            handle_thread_command(state, identity, command).await
        }
        Namespace::Notifications => {
            let command: NotifyClientMessage = serde_json::from_str(text).map_err(|err| {
                tracing::debug!(error = %err, "无法解析的通知指令");
                RealtimeError::InvalidMessage
            })?;
            handle_notify_command(state, identity, command).await
        }
    }
}

/// 断开清理。顺序不重要，但每一步都必须执行。
async fn cleanup(state: &AppState, identity: &ConnectionIdentity) {
    let departures = state
        .presence
        .leave_all(identity.user_id, identity.connection_id)
        .await;
    let timestamp = Utc::now();
    for departure in departures {
        if departure.user_left {
            broadcast_to_thread_except(
                state,
                departure.thread_id,
                identity.connection_id,
                ServerMessage::ThreadUserLeft {
                    thread_id: departure.thread_id,
                    user_count: departure.viewer_count,
                    timestamp,
                },
            )
            .await;
        }
    }

    state
        .notification_router
        .unsubscribe(identity.user_id, identity.connection_id)
        .await;
    state.registry.unregister(identity.connection_id).await;
    state.throttler.remove_connection(identity.user_id);

    tracing::info!(
        connection_id = %identity.connection_id,
        user_id = %identity.user_id,
        "WebSocket 连接已断开，状态已清理"
    );
}

/// 推送给房间里除自己之外的所有连接。
async fn broadcast_to_thread_except(
    state: &AppState,
    thread_id: CommentId,
    except: ConnectionId,
    message: ServerMessage,
) {
    let targets: Vec<ConnectionId> = state
        .presence
        .connections(thread_id)
        .await
        .into_iter()
        .filter(|id| *id != except)
        .collect();
    if !targets.is_empty() {
        state.registry.send_to_all(&targets, &message).await;
    }
}

async fn handle_thread_command(
    state: &AppState,
    identity: &ConnectionIdentity,
    command: ThreadClientMessage,
) -> Result<(), RealtimeError> {
    let connection_id = identity.connection_id;
    let timestamp = Utc::now();

    match command {
        ThreadClientMessage::JoinThread { thread_id } => {
            // 目标评论必须存在才能加入它的讨论串
            let comment = state
                .comments
                .find_by_id(thread_id)
                .await
                .map_err(RealtimeError::Repository)?;
            if comment.is_none() {
                return Err(RealtimeError::ThreadNotFound);
            }

            let outcome = state
                .presence
                .join(thread_id, identity.user_id, connection_id)
                .await;
            state
                .registry
                .send(
                    connection_id,
                    ServerMessage::ThreadJoined {
                        thread_id,
                        user_count: outcome.viewer_count,
                        timestamp,
                    },
                )
                .await;
            // 只有用户首次进入才通知房间其他人，多开标签页不重复广播
            if outcome.newly_joined {
                broadcast_to_thread_except(
                    state,
                    thread_id,
                    connection_id,
                    ServerMessage::ThreadUserJoined {
                        thread_id,
                        user_count: outcome.viewer_count,
                        timestamp,
                    },
                )
                .await;
            }
        }

        ThreadClientMessage::LeaveThread { thread_id } => {
            let outcome = state
                .presence
                .leave(thread_id, identity.user_id, connection_id)
                .await;
            state
                .registry
                .send(
                    connection_id,
                    ServerMessage::ThreadLeft {
                        thread_id,
                        user_count: outcome.viewer_count,
                        timestamp,
                    },
                )
                .await;
            if outcome.user_left {
                broadcast_to_thread_except(
                    state,
                    thread_id,
                    connection_id,
                    ServerMessage::ThreadUserLeft {
                        thread_id,
                        user_count: outcome.viewer_count,
                        timestamp,
                    },
                )
                .await;
            }
        }

        ThreadClientMessage::GetThreadStats { thread_id } => {
            let user_count = state.presence.viewer_count(thread_id).await;
            state
                .registry
                .send(
                    connection_id,
                    ServerMessage::ThreadStats {
                        thread_id,
                        user_count,
                        timestamp,
                    },
                )
                .await;
        }

        ThreadClientMessage::Ping => {
            state
                .registry
                .send(
                    connection_id,
                    ServerMessage::Pong {
                        timestamp,
                        user_id: identity.user_id,
                    },
                )
                .await;
        }
    }
    Ok(())
}

async fn handle_notify_command(
    state: &AppState,
    identity: &ConnectionIdentity,
    command: NotifyClientMessage,
) -> Result<(), RealtimeError> {
    let connection_id = identity.connection_id;
    let timestamp = Utc::now();

    match command {
        NotifyClientMessage::SubscribeNotifications { user_id } => {
            // 只能订阅自己的频道
            ensure_own_channel(identity, user_id)?;
            state
                .notification_router
                .subscribe(identity.user_id, connection_id)
                .await;
            state
                .registry
                .send(
                    connection_id,
                    ServerMessage::Subscribed {
                        user_id: identity.user_id,
                        timestamp,
                    },
                )
                .await;
            push_unread_count(state, identity).await;
        }

        NotifyClientMessage::UnsubscribeNotifications { user_id } => {
            ensure_own_channel(identity, user_id)?;
            state
                .notification_router
                .unsubscribe(identity.user_id, connection_id)
                .await;
            state
                .registry
                .send(
                    connection_id,
                    ServerMessage::Unsubscribed {
                        user_id: identity.user_id,
                        timestamp,
                    },
                )
                .await;
        }

        NotifyClientMessage::MarkNotificationRead { notification_id } => {
            // 归属不符和不存在都映射为 NotificationNotFound
            state
                .notifications
                .mark_read(notification_id, identity.user_id)
                .await?;
            state
                .registry
                .send(
                    connection_id,
                    ServerMessage::NotificationMarkedRead {
                        notification_id,
                        timestamp,
                    },
                )
                .await;
            push_unread_count(state, identity).await;
        }

        NotifyClientMessage::GetUnreadCount => {
            push_unread_count(state, identity).await;
        }

        NotifyClientMessage::Ping => {
            state
                .registry
                .send(
                    connection_id,
                    ServerMessage::Pong {
                        timestamp,
                        user_id: identity.user_id,
                    },
                )
                .await;
        }
    }
    Ok(())
}

fn ensure_own_channel(
    identity: &ConnectionIdentity,
    requested: Option<domain::UserId>,
) -> Result<(), RealtimeError> {
    match requested {
        Some(user_id) if user_id != identity.user_id => Err(RealtimeError::AccessDenied),
        _ => Ok(()),
    }
}

/// 现查未读数并推送。查询失败只记日志，不打断会话。
async fn push_unread_count(state: &AppState, identity: &ConnectionIdentity) {
    match state.notifications.unread_count(identity.user_id).await {
        Ok(count) => {
            state
                .registry
                .send(
                    identity.connection_id,
                    ServerMessage::UnreadCount {
                        count,
                        timestamp: Utc::now(),
                    },
                )
                .await;
        }
        Err(err) => {
            tracing::error!(error = %err, user_id = %identity.user_id, "未读数查询失败");
        }
    }
}
