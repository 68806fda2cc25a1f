//! Message types for LaneQ
//!
//! A [`Message`] is a cheap, cloneable handle. The publisher keeps one
//! handle to wait on while the subscriber replies through another, so both
//! sides observe the same reply path.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

use crate::error::{Error, Result};
use crate::payload::Payload;

/// Operation code distinguishing messages within one topic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action(pub u32);

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Action {
    fn from(code: u32) -> Self {
        Action(code)
    }
}

/// Delivery priority. `None` and `Low` share the low lane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    None,
    Low,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::None => "None",
            Priority::Low => "Low",
            Priority::High => "High",
        };
        f.write_str(name)
    }
}

/// One-capacity rendezvous a reply is delivered into
#[derive(Clone)]
pub struct ReplySlot {
    tx: mpsc::Sender<Message>,
    rx: Arc<Mutex<mpsc::Receiver<Message>>>,
}

impl ReplySlot {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    async fn put(&self, reply: Message) -> Result<()> {
        // The slot owns its receiver, so the channel never closes under us.
        self.tx
            .send(reply)
            .await
            .map_err(|_| Error::Internal("reply slot closed".to_string()))
    }

    async fn take(&self, timeout: Duration) -> Result<Message> {
        let wait = async {
            let mut rx = self.rx.lock().await;
            rx.recv().await
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(Error::Internal("reply slot closed".to_string())),
            Err(_) => Err(Error::WaitTimeout),
        }
    }
}

impl Default for ReplySlot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReplySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplySlot")
            .field("pending", &(self.tx.max_capacity() - self.tx.capacity()))
            .finish()
    }
}

/// Function invoked with the reply on a spawned task
#[derive(Clone)]
pub struct ReplyCallback(Arc<dyn Fn(Message) + Send + Sync>);

impl ReplyCallback {
    pub fn new(f: impl Fn(Message) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }
}

impl fmt::Debug for ReplyCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReplyCallback")
    }
}

/// How a subscriber answers a message
#[derive(Debug, Clone, Default)]
pub enum ReplyPath {
    /// Fire-and-forget; replying fails
    #[default]
    None,
    /// Reply is put into a slot the publisher waits on
    Slot(ReplySlot),
    /// Reply is handed to a callback
    Callback(ReplyCallback),
}

impl ReplyPath {
    /// A reply path backed by a fresh slot
    pub fn slot() -> Self {
        ReplyPath::Slot(ReplySlot::new())
    }

    /// A reply path backed by `f`
    pub fn callback(f: impl Fn(Message) + Send + Sync + 'static) -> Self {
        ReplyPath::Callback(ReplyCallback::new(f))
    }
}

#[derive(Debug, Clone, Default)]
struct Envelope {
    topic: String,
    action: Action,
    priority: Priority,
    payload: Payload,
    reply: ReplyPath,
}

/// A message exchanged through a topic
#[derive(Debug, Clone)]
pub struct Message {
    inner: Arc<Envelope>,
}

impl Message {
    /// Create a message with the given fields and no reply path
    pub fn new(topic: impl Into<String>, action: Action, payload: impl Into<Payload>) -> Self {
        Self {
            inner: Arc::new(Envelope {
                topic: topic.into(),
                action,
                payload: payload.into(),
                ..Default::default()
            }),
        }
    }

    /// An empty message holding a fresh reply slot, as handed out by a pool
    /// that has no spare instance.
    ///
    /// The slot is only a starting value. [`Message::fill`] replaces it with
    /// the caller's reply path, so a no-reply message drops it unused.
    pub fn blank() -> Self {
        Self {
            inner: Arc::new(Envelope {
                reply: ReplyPath::slot(),
                ..Default::default()
            }),
        }
    }

    /// Set priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        Arc::make_mut(&mut self.inner).priority = priority;
        self
    }

    /// Set the reply path
    pub fn with_reply(mut self, reply: ReplyPath) -> Self {
        Arc::make_mut(&mut self.inner).reply = reply;
        self
    }

    /// Overwrite every field except priority, which is reset to `None`.
    pub fn fill(
        &mut self,
        topic: String,
        action: Action,
        payload: Payload,
        reply: ReplyPath,
    ) {
        let envelope = Arc::make_mut(&mut self.inner);
        envelope.topic = topic;
        envelope.action = action;
        envelope.priority = Priority::None;
        envelope.payload = payload;
        envelope.reply = reply;
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    pub fn action(&self) -> Action {
        self.inner.action
    }

    pub fn priority(&self) -> Priority {
        self.inner.priority
    }

    pub fn payload(&self) -> &Payload {
        &self.inner.payload
    }

    pub fn reply_path(&self) -> &ReplyPath {
        &self.inner.reply
    }

    /// The error carried as payload, if any
    pub fn error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.inner.payload.as_error()
    }

    /// Whether another handle to this message is still alive
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.inner) > 1
    }

    /// Answer this message.
    ///
    /// A slot reply waits for room in the one-capacity slot; a callback reply
    /// runs on a spawned task so the replier never blocks on it.
    pub async fn reply(&self, reply: Message) -> Result<()> {
        match &self.inner.reply {
            ReplyPath::None => Err(Error::NoReplyPath),
            ReplyPath::Slot(slot) => slot.put(reply).await,
            ReplyPath::Callback(callback) => {
                let callback = callback.clone();
                tokio::spawn(async move { (callback.0)(reply) });
                Ok(())
            }
        }
    }

    /// Block until a reply lands in the slot or `timeout` elapses.
    ///
    /// Without a slot no reply can ever arrive, so this always ends in
    /// [`Error::WaitTimeout`] once `timeout` has passed.
    pub async fn wait(&self, timeout: Duration) -> Result<Message> {
        match &self.inner.reply {
            ReplyPath::Slot(slot) => slot.take(timeout).await,
            ReplyPath::None | ReplyPath::Callback(_) => {
                tokio::time::sleep(timeout).await;
                Err(Error::WaitTimeout)
            }
        }
    }

    /// Reset every field to its empty value.
    ///
    /// Only succeeds when this is the last handle; returns `false` and leaves
    /// the message untouched otherwise.
    pub fn recycle(&mut self) -> bool {
        match Arc::get_mut(&mut self.inner) {
            Some(envelope) => {
                *envelope = Envelope::default();
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "message{{topic:{}, action:{}, payload:{}, priority:{}}}",
            self.inner.topic, self.inner.action, self.inner.payload, self.inner.priority
        )
    }
}
