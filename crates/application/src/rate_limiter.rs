//! 连接/消息限流器
//!
//! 固定窗口计数：连接准入按 IP、消息准入按用户，各自独立计窗；
//! 另维护单用户并发连接的实时计数（不是时间窗口）。
//! 防止连接/消息洪水，保护网关稳定性。

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use domain::UserId;

use crate::error::RealtimeError;

/// 一个固定窗口计数器
#[derive(Debug, Clone)]
struct WindowState {
    count: u32,
    reset_at: Instant,
}

/// 限流参数
#[derive(Debug, Clone)]
pub struct ThrottleSettings {
    /// 单 IP 每窗口允许的连接次数
    pub connection_limit: u32,
    /// 连接限流窗口
    pub connection_window: Duration,
    /// 单用户每窗口允许的消息数
    pub message_limit: u32,
    /// 消息限流窗口
    pub message_window: Duration,
    /// 单用户并发连接上限
    pub max_connections_per_user: u32,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            connection_limit: 10,
            connection_window: Duration::from_secs(60),
            message_limit: 60,
            message_window: Duration::from_secs(60),
            max_connections_per_user: 5,
        }
    }
}

impl From<&config::RealtimeConfig> for ThrottleSettings {
    fn from(cfg: &config::RealtimeConfig) -> Self {
        Self {
            connection_limit: cfg.connection_limit,
            connection_window: Duration::from_secs(cfg.connection_window_secs),
            message_limit: cfg.message_limit,
            message_window: Duration::from_secs(cfg.message_window_secs),
            max_connections_per_user: cfg.max_connections_per_user,
        }
    }
}

/// 限流器当前状态快照
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ThrottlerStats {
    pub connection_windows: usize,
    pub message_windows: usize,
    pub tracked_users: usize,
    pub total_connections: u32,
}

/// 网关限流器
pub struct ConnectionThrottler {
    settings: ThrottleSettings,
    /// 连接尝试计窗，键为客户端 IP
    connection_attempts: RwLock<HashMap<String, WindowState>>,
    /// 消息计窗，键为用户
    message_rates: RwLock<HashMap<UserId, WindowState>>,
    /// 用户并发连接计数
    user_connections: RwLock<HashMap<UserId, u32>>,
}

impl ConnectionThrottler {
    pub fn new(settings: ThrottleSettings) -> Self {
        Self {
            settings,
            connection_attempts: RwLock::new(HashMap::new()),
            message_rates: RwLock::new(HashMap::new()),
            user_connections: RwLock::new(HashMap::new()),
        }
    }

    /// 检查并消费一次连接配额。窗口首次使用时惰性创建。
    pub fn check_connection_limit(&self, ip: &str) -> bool {
        check_window(
            &self.connection_attempts,
            ip.to_string(),
            self.settings.connection_limit,
            self.settings.connection_window,
        )
    }

    /// 检查并消费一次消息配额。
    pub fn check_message_limit(&self, user_id: UserId) -> bool {
        check_window(
            &self.message_rates,
            user_id,
            self.settings.message_limit,
            self.settings.message_window,
        )
    }

    /// 用户是否还能建立新连接（不改变计数）。
    pub fn check_user_connection_limit(&self, user_id: UserId) -> bool {
        let connections = self
            .user_connections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        connections.get(&user_id).copied().unwrap_or(0) < self.settings.max_connections_per_user
    }

    /// 连接建立时登记。达到上限时拒绝且不改变计数。
    pub fn add_connection(&self, user_id: UserId) -> Result<u32, RealtimeError> {
        let mut connections = self
            .user_connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let count = connections.entry(user_id).or_insert(0);
        if *count >= self.settings.max_connections_per_user {
            return Err(RealtimeError::TooManyConnections);
        }
        *count += 1;
        Ok(*count)
    }

    /// 连接断开时释放。计数归零即从表中移除。
    pub fn remove_connection(&self, user_id: UserId) {
        let mut connections = self
            .user_connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = connections.get_mut(&user_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                connections.remove(&user_id);
            }
        }
    }

    /// 回收过期窗口和零连接用户（由 Sweeper 周期调用）。
    /// 仍在活动期内的窗口绝不回收。
    pub fn cleanup(&self) {
        let now = Instant::now();

        self.connection_attempts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, state| now <= state.reset_at);

        self.message_rates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, state| now <= state.reset_at);

        self.user_connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, count| *count > 0);
    }

    pub fn stats(&self) -> ThrottlerStats {
        let connections = self
            .user_connections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        ThrottlerStats {
            connection_windows: self
                .connection_attempts
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            message_windows: self
                .message_rates
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            tracked_users: connections.len(),
            total_connections: connections.values().sum(),
        }
    }
}

impl Default for ConnectionThrottler {
    fn default() -> Self {
        Self::new(ThrottleSettings::default())
    }
}

/// 通用固定窗口检查：首次使用或窗口过期则重开（count=1），
/// 达到上限后饱和拒绝，不再继续累加。
fn check_window<K: Eq + Hash>(
    store: &RwLock<HashMap<K, WindowState>>,
    key: K,
    limit: u32,
    window: Duration,
) -> bool {
    let mut store = store.write().unwrap_or_else(PoisonError::into_inner);
    let now = Instant::now();

    match store.get_mut(&key) {
        Some(state) if now <= state.reset_at => {
            if state.count >= limit {
                return false;
            }
            state.count += 1;
            true
        }
        _ => {
            store.insert(
                key,
                WindowState {
                    count: 1,
                    reset_at: now + window,
                },
            );
            true
        }
    }
}
