//! 进程内事件总线
//!
//! 持久化侧的服务发布领域事件，扇出调度器订阅消费。事件不落盘、
//! 不重放：订阅发生在事件发布之后的连接永远收不到旧事件。

use tokio::sync::broadcast;

use domain::ForumEvent;

#[derive(Clone)]
pub struct ForumEventBus {
    sender: broadcast::Sender<ForumEvent>,
}

impl ForumEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 发布事件，返回当前订阅者数量。没有订阅者时事件被静默丢弃。
    pub fn publish(&self, event: ForumEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::debug!("事件总线当前没有订阅者，事件被丢弃");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ForumEvent> {
        self.sender.subscribe()
    }
}

impl Default for ForumEventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
