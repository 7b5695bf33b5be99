//! 统一配置中心
//!
//! 提供应用的全局配置管理，包括：
//! - 服务监听地址
//! - JWT认证
//! - 实时网关限流参数

use serde::{Deserialize, Serialize};
use std::env;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务配置
    pub server: ServerConfig,
    /// JWT认证配置
    pub jwt: JwtConfig,
    /// 实时网关配置
    pub realtime: RealtimeConfig,
}

/// JWT配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 实时网关配置：限流窗口、连接上限、清扫周期
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// 单 IP 每窗口允许的连接次数
    pub connection_limit: u32,
    /// 连接限流窗口（秒）
    pub connection_window_secs: u64,
    /// 单用户每窗口允许的消息数
    pub message_limit: u32,
    /// 消息限流窗口（秒）
    pub message_window_secs: u64,
    /// 单用户并发连接上限
    pub max_connections_per_user: u32,
    /// 后台清扫间隔（秒）
    pub sweep_interval_secs: u64,
    /// 事件总线容量
    pub bus_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            connection_limit: 10,
            connection_window_secs: 60,
            message_limit: 60,
            message_window_secs: 60,
            max_connections_per_user: 5,
            sweep_interval_secs: 60,
            bus_capacity: 1000,
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

impl AppConfig {
    /// 从环境变量加载配置
    /// JWT_SECRET 缺失时会 panic，确保生产环境不会使用不安全的默认值
    pub fn from_env() -> Self {
        Self {
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET")
                    .expect("JWT_SECRET environment variable is required for production safety"),
                expiration_hours: env_parsed("JWT_EXPIRATION_HOURS", 24),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env_parsed("SERVER_PORT", 8080),
            },
            realtime: Self::realtime_from_env(),
        }
    }

    /// 从环境变量加载配置，开发环境版本
    /// 提供不安全的默认值，仅用于测试和开发
    pub fn from_env_with_defaults() -> Self {
        Self {
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET").unwrap_or_else(|_| {
                    "dev-secret-key-not-for-production-use-minimum-32-chars".to_string()
                }),
                expiration_hours: env_parsed("JWT_EXPIRATION_HOURS", 24),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env_parsed("SERVER_PORT", 8080),
            },
            realtime: Self::realtime_from_env(),
        }
    }

    fn realtime_from_env() -> RealtimeConfig {
        let defaults = RealtimeConfig::default();
        RealtimeConfig {
            connection_limit: env_parsed("WS_CONNECTION_LIMIT", defaults.connection_limit),
            connection_window_secs: env_parsed(
                "WS_CONNECTION_WINDOW_SECS",
                defaults.connection_window_secs,
            ),
            message_limit: env_parsed("WS_MESSAGE_LIMIT", defaults.message_limit),
            message_window_secs: env_parsed("WS_MESSAGE_WINDOW_SECS", defaults.message_window_secs),
            max_connections_per_user: env_parsed(
                "WS_MAX_CONNECTIONS_PER_USER",
                defaults.max_connections_per_user,
            ),
            sweep_interval_secs: env_parsed("WS_SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs),
            bus_capacity: env_parsed("EVENT_BUS_CAPACITY", defaults.bus_capacity),
        }
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 验证JWT密钥长度和安全性（至少256位/32字节）
        if self.jwt.secret.len() < 32 {
            return Err(ConfigError::InvalidJwtSecret(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        // 检查JWT密钥是否为明显的开发密钥
        if self.jwt.secret.contains("dev-secret")
            || self.jwt.secret.contains("not-for-production")
            || self.jwt.secret.contains("please-change")
        {
            return Err(ConfigError::InvalidJwtSecret(
                "Cannot use development JWT secret in production".to_string(),
            ));
        }

        if self.realtime.connection_limit == 0 || self.realtime.message_limit == 0 {
            return Err(ConfigError::InvalidRealtimeConfig(
                "Rate limits must be greater than 0".to_string(),
            ));
        }

        if self.realtime.max_connections_per_user == 0 {
            return Err(ConfigError::InvalidRealtimeConfig(
                "Per-user connection cap must be greater than 0".to_string(),
            ));
        }

        if self.realtime.connection_window_secs == 0
            || self.realtime.message_window_secs == 0
            || self.realtime.sweep_interval_secs == 0
        {
            return Err(ConfigError::InvalidRealtimeConfig(
                "Window and sweep durations must be greater than 0".to_string(),
            ));
        }

        if self.realtime.bus_capacity == 0 {
            return Err(ConfigError::InvalidRealtimeConfig(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid JWT secret: {0}")]
    InvalidJwtSecret(String),
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
    #[error("Invalid realtime configuration: {0}")]
    InvalidRealtimeConfig(String),
    #[error("Environment variable error: {0}")]
    EnvVarError(#[from] std::env::VarError),
}

impl Default for AppConfig {
    /// 默认配置使用开发环境版本
    /// 注意：生产环境应该明确调用 from_env() 而不是依赖默认值
    fn default() -> Self {
        Self::from_env_with_defaults()
    }
}
