//! Configuration types for LaneQ
//!
//! All structs deserialize from JSON with every field optional.

use serde::{Deserialize, Serialize};

/// Lane capacities for a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Capacity of the high-priority lane
    #[serde(default = "default_high_capacity")]
    pub high_capacity: usize,

    /// Capacity of the low-priority lane (also used for `Priority::None`)
    #[serde(default = "default_low_capacity")]
    pub low_capacity: usize,
}

fn default_high_capacity() -> usize {
    64
}

fn default_low_capacity() -> usize {
    1024
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            high_capacity: default_high_capacity(),
            low_capacity: default_low_capacity(),
        }
    }
}

/// Client receive surface configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Messages buffered between the dispatch task and the consumer
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

fn default_inbox_capacity() -> usize {
    1
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: default_inbox_capacity(),
        }
    }
}

/// Message pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of spare messages kept for reuse
    #[serde(default = "default_max_idle")]
    pub max_idle: usize,
}

fn default_max_idle() -> usize {
    1024
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: default_max_idle(),
        }
    }
}

/// Top-level configuration used by the process entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Name of the queue owning all topics
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    #[serde(default)]
    pub topic: TopicConfig,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub pool: PoolConfig,
}

fn default_queue_name() -> String {
    "laneq".to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            queue_name: default_queue_name(),
            topic: TopicConfig::default(),
            client: ClientConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// Parse a configuration from JSON text
    pub fn from_json(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
