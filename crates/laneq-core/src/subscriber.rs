//! Delivery trait implemented by topic consumers

use async_trait::async_trait;
use laneq_types::Message;

/// Consumer a topic's dispatch task hands messages to.
///
/// Delivery may wait as long as the consumer needs; while it waits the
/// dispatch task pulls nothing else from the topic's lanes.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Receive one message from the topic
    async fn on_message_received(&self, msg: Message);
}
