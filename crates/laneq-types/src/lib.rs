//! LaneQ Types - Core domain types for the message broker
//!
//! This crate contains all shared types used across LaneQ components.

pub mod config;
pub mod error;
pub mod message;
pub mod payload;
pub mod state;

// Re-export commonly used types
pub use config::{BrokerConfig, ClientConfig, PoolConfig, TopicConfig};
pub use error::{Error, Result};
pub use message::{Action, Message, Priority, ReplyCallback, ReplyPath, ReplySlot};
pub use payload::Payload;
pub use state::{AtomicState, State};
