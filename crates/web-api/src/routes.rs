use std::net::SocketAddr;

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use application::{RegistryStats, ThrottlerStats};

use crate::{state::AppState, ws_connection};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/realtime/stats", get(realtime_stats))
        .route("/ws/comments", get(comments_upgrade))
        .route("/ws/notifications", get(notifications_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// 网关运行状态快照（无需认证，供监控拉取）
#[derive(Debug, Serialize)]
struct RealtimeStatsResponse {
    registry: RegistryStats,
    throttler: ThrottlerStats,
    active_threads: usize,
    total_viewers: usize,
    notification_channels: usize,
}

async fn realtime_stats(State(state): State<AppState>) -> Json<RealtimeStatsResponse> {
    Json(RealtimeStatsResponse {
        registry: state.registry.stats().await,
        throttler: state.throttler.stats(),
        active_threads: state.presence.active_thread_count().await,
        total_viewers: state.presence.total_viewers().await,
        notification_channels: state.notification_router.channel_count().await,
    })
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// 凭证优先取 query 参数，其次取 Authorization 头。
/// 浏览器的 WebSocket API 无法设置自定义头，query 是主路径。
fn resolve_token(query_token: Option<String>, headers: &HeaderMap) -> Option<String> {
    if query_token.is_some() {
        return query_token;
    }
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

async fn comments_upgrade(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = resolve_token(query.token, &headers);
    ws.on_upgrade(move |socket| ws_connection::serve_comments(socket, state, addr, token))
}

async fn notifications_upgrade(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = resolve_token(query.token, &headers);
    ws.on_upgrade(move |socket| ws_connection::serve_notifications(socket, state, addr, token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::HeaderValue;
    use chrono::Utc;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use application::{
        ConnectionIdentity, ConnectionRegistry, ConnectionThrottler, MemoryCommentRepository,
        MemoryNotificationRepository, NotificationRoomRouter, ThreadPresenceTracker,
        ThrottleSettings,
    };
    use config::JwtConfig;
    use domain::{CommentId, ConnectionId, UserId};

    use crate::JwtService;

    fn test_state() -> AppState {
        AppState::new(
            Arc::new(ConnectionRegistry::new()),
            Arc::new(ThreadPresenceTracker::new()),
            Arc::new(NotificationRoomRouter::new()),
            Arc::new(ConnectionThrottler::new(ThrottleSettings::default())),
            Arc::new(MemoryCommentRepository::new()),
            Arc::new(MemoryNotificationRepository::new()),
            Arc::new(JwtService::new(JwtConfig {
                secret: "test-secret-key-with-at-least-32-chars!!".to_string(),
                expiration_hours: 1,
            })),
        )
    }

    #[test]
    fn token_prefers_query_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );

        assert_eq!(
            resolve_token(Some("from-query".to_string()), &headers),
            Some("from-query".to_string())
        );
        assert_eq!(
            resolve_token(None, &headers),
            Some("from-header".to_string())
        );
        assert_eq!(resolve_token(None, &HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn stats_reflect_registry_and_presence() {
        let state = test_state();

        let user_id = UserId::from(Uuid::new_v4());
        let connection_id = ConnectionId::generate();
        let (tx, _rx) = mpsc::unbounded_channel();
        state
            .registry
            .register(
                ConnectionIdentity {
                    connection_id,
                    user_id,
                    username: "viewer".to_string(),
                    connected_at: Utc::now(),
                },
                tx,
            )
            .await;
        state
            .presence
            .join(CommentId::new(Uuid::new_v4()), user_id, connection_id)
            .await;
        state
            .notification_router
            .subscribe(user_id, connection_id)
            .await;

        let Json(stats) = realtime_stats(State(state)).await;
        assert_eq!(stats.registry.connected_clients, 1);
        assert_eq!(stats.registry.connected_users, 1);
        assert_eq!(stats.active_threads, 1);
        assert_eq!(stats.total_viewers, 1);
        assert_eq!(stats.notification_channels, 1);
    }
}
