//! Message pool
//!
//! Hands out reusable [`Message`] instances so publishing does not allocate
//! a fresh envelope every time. One pool is built by the process entry point
//! and shared by handle with everything that acquires or releases messages.

use std::sync::atomic::{AtomicU64, Ordering};

use laneq_types::{Action, Message, Payload, PoolConfig, ReplyPath};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace};

/// Pool counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Messages constructed because no spare was available
    pub created: u64,
    /// Acquisitions served from a spare
    pub reused: u64,
    /// Messages cleared and returned to the free list
    pub recycled: u64,
    /// Released messages dropped instead of kept (still shared, or pool full)
    pub discarded: u64,
    /// Spare messages currently held
    pub idle: usize,
}

/// Pool of reusable messages
#[derive(Debug)]
pub struct MessagePool {
    config: PoolConfig,
    idle: Mutex<Vec<Message>>,
    created: AtomicU64,
    reused: AtomicU64,
    recycled: AtomicU64,
    discarded: AtomicU64,
}

impl MessagePool {
    /// Create a pool with default configuration
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Create a pool with custom configuration
    pub fn with_config(config: PoolConfig) -> Self {
        debug!(max_idle = config.max_idle, "Initializing message pool");
        Self {
            config,
            idle: Mutex::new(Vec::new()),
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            recycled: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Get a message with the given fields populated.
    ///
    /// Priority starts at `None`; set it with [`Message::with_priority`].
    pub fn acquire(
        &self,
        topic: impl Into<String>,
        action: Action,
        payload: impl Into<Payload>,
        reply: ReplyPath,
    ) -> Message {
        let spare = self.idle.lock().pop();
        let mut message = match spare {
            Some(message) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                message
            }
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                Message::blank()
            }
        };
        message.fill(topic.into(), action, payload.into(), reply);
        message
    }

    /// Get a message that expects a reply through a fresh slot
    pub fn acquire_request(
        &self,
        topic: impl Into<String>,
        action: Action,
        payload: impl Into<Payload>,
    ) -> Message {
        self.acquire(topic, action, payload, ReplyPath::slot())
    }

    /// Get a fire-and-forget message, typically used as a reply
    pub fn acquire_no_reply(&self, payload: impl Into<Payload>) -> Message {
        self.acquire("", Action::default(), payload, ReplyPath::None)
    }

    /// Get a fire-and-forget message carrying `err` as its payload
    pub fn acquire_error(&self, err: impl std::error::Error + Send + Sync + 'static) -> Message {
        self.acquire("", Action::default(), Payload::error(err), ReplyPath::None)
    }

    /// Recycle messages and keep them for reuse. `None` entries are skipped.
    ///
    /// A message whose handle is still shared with another holder is dropped
    /// rather than cleared, so no holder can observe a reused envelope.
    pub fn release<I, M>(&self, messages: I)
    where
        I: IntoIterator<Item = M>,
        M: Into<Option<Message>>,
    {
        for message in messages {
            let Some(mut message) = message.into() else {
                continue;
            };

            if !message.recycle() {
                self.discarded.fetch_add(1, Ordering::Relaxed);
                trace!(topic = %message.topic(), "Message still shared, not reused");
                continue;
            }

            let mut idle = self.idle.lock();
            if idle.len() < self.config.max_idle {
                idle.push(message);
                self.recycled.fetch_add(1, Ordering::Relaxed);
            } else {
                self.discarded.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            recycled: self.recycled.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            idle: self.idle.lock().len(),
        }
    }
}

impl Default for MessagePool {
    fn default() -> Self {
        Self::new()
    }
}
