//! 领域层。
//!
//! 定义实时子系统的标识类型、推送载荷、线上协议、领域事件，
//! 以及对外部持久化协作方的接口契约。

pub mod entities;
pub mod errors;
pub mod events;
pub mod repositories;
pub mod value_objects;

pub use entities::comment::{CommentAuthor, CommentView};
pub use entities::notification::{BulkOperation, NotificationView};
pub use entities::websocket::{NotifyClientMessage, ServerMessage, ThreadClientMessage};
pub use errors::RepositoryError;
pub use events::ForumEvent;
pub use repositories::{CommentRepository, NotificationRepository};
pub use value_objects::{CommentId, ConnectionId, NotificationId, Timestamp, UserId};
