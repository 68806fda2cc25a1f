//! LaneQ Core - in-process priority broker
//!
//! This crate contains the broker itself:
//! - Topic: two priority lanes and the dispatch task
//! - Queue: topic registry
//! - Client: subscribe / publish / wait façade
//! - MessagePool: message reuse

pub mod client;
pub mod pool;
pub mod queue;
pub mod subscriber;
pub mod topic;

// Re-exports
pub use client::Client;
pub use pool::{MessagePool, PoolStats};
pub use queue::Queue;
pub use subscriber::Subscriber;
pub use topic::{Topic, TopicStats};
