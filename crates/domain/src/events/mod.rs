pub mod forum_event;

pub use forum_event::ForumEvent;
