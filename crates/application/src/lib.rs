//! 应用层实现。
//!
//! 实时网关的核心组件：限流、连接注册、讨论串在场状态、
//! 通知频道路由、事件扇出与后台清扫。所有内存表都由各自组件
//! 独占持有，只能通过组件方法访问。

pub mod bus;
pub mod error;
pub mod fanout;
pub mod memory;
pub mod presence;
pub mod rate_limiter;
pub mod registry;
pub mod router;
pub mod sweeper;

pub use bus::ForumEventBus;
pub use error::RealtimeError;
pub use fanout::EventFanoutDispatcher;
pub use memory::{MemoryCommentRepository, MemoryNotificationRepository};
pub use presence::{JoinOutcome, LeaveOutcome, ThreadDeparture, ThreadPresenceTracker};
pub use rate_limiter::{ConnectionThrottler, ThrottleSettings, ThrottlerStats};
pub use registry::{ConnectionIdentity, ConnectionRegistry, RegistryStats};
pub use router::NotificationRoomRouter;
pub use sweeper::Sweeper;
