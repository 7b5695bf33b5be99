//! 主应用程序入口
//!
//! 组装实时网关的各组件并启动 Axum Web API 服务。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use application::{
    ConnectionRegistry, ConnectionThrottler, EventFanoutDispatcher, ForumEventBus,
    MemoryCommentRepository, MemoryNotificationRepository, NotificationRoomRouter, Sweeper,
    ThreadPresenceTracker, ThrottleSettings,
};
use config::AppConfig;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 读取环境变量配置
    let config = AppConfig::from_env();
    config.validate()?;

    // 实时网关核心组件
    let registry = Arc::new(ConnectionRegistry::new());
    let presence = Arc::new(ThreadPresenceTracker::new());
    let notification_router = Arc::new(NotificationRoomRouter::new());
    let throttler = Arc::new(ConnectionThrottler::new(ThrottleSettings::from(
        &config.realtime,
    )));

    // 内存持久化协作方 - 生产环境替换为数据库实现
    let comments = Arc::new(MemoryCommentRepository::new());
    let notifications = Arc::new(MemoryNotificationRepository::new());

    // 事件总线和扇出调度器
    let bus = ForumEventBus::new(config.realtime.bus_capacity);
    let dispatcher = Arc::new(EventFanoutDispatcher::new(
        registry.clone(),
        presence.clone(),
        notification_router.clone(),
        notifications.clone(),
    ));
    let _fanout_task = dispatcher.spawn(bus.subscribe());

    // 后台清扫任务
    let sweeper = Sweeper::new(
        throttler.clone(),
        presence.clone(),
        notification_router.clone(),
        Duration::from_secs(config.realtime.sweep_interval_secs),
    );
    let _sweep_task = sweeper.spawn();

    // JWT 服务
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    // 创建应用状态
    let state = AppState::new(
        registry,
        presence,
        notification_router,
        throttler,
        comments,
        notifications,
        jwt_service,
    );

    // 启动 Web 服务器
    let app = router(state);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("实时网关启动在 http://{}", bind_addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
