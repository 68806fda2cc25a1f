//! Client - subscription and publish/wait façade
//!
//! A client is bound to one queue and, after subscribing, to exactly one
//! topic. Messages the topic dispatches land on the client's receive
//! surface; publishing goes to the bound topic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use laneq_types::{AtomicState, ClientConfig, Error, Message, Result, State};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::queue::Queue;
use crate::subscriber::Subscriber;
use crate::topic::Topic;

/// A single-topic subscriber and publisher
pub struct Client {
    queue: Arc<Queue>,
    topic: OnceLock<Arc<Topic>>,
    subscribing: AtomicBool,
    inbox_tx: parking_lot::Mutex<Option<mpsc::Sender<Message>>>,
    inbox_rx: tokio::sync::Mutex<mpsc::Receiver<Message>>,
    state: AtomicState,
}

impl Client {
    /// Create a client in `Init` state bound to `queue`
    pub fn new(queue: Arc<Queue>) -> Arc<Self> {
        Self::with_config(queue, ClientConfig::default())
    }

    /// Create a client with a custom receive surface
    pub fn with_config(queue: Arc<Queue>, config: ClientConfig) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.inbox_capacity.max(1));
        Arc::new(Self {
            queue,
            topic: OnceLock::new(),
            subscribing: AtomicBool::new(false),
            inbox_tx: parking_lot::Mutex::new(Some(tx)),
            inbox_rx: tokio::sync::Mutex::new(rx),
            state: AtomicState::new(State::Init),
        })
    }

    pub fn state(&self) -> State {
        self.state.load()
    }

    /// Name of the bound topic, if subscribed
    pub fn topic_name(&self) -> Option<&str> {
        self.topic.get().map(|t| t.name())
    }

    /// Register `topic` in the queue and subscribe to it.
    ///
    /// The topic must not exist yet: an existing registration is an error,
    /// not something to attach to.
    ///
    /// The topic's dispatch task holds a reference to this client until the
    /// topic closes, so a subscribed client is only released by [`Client::close`].
    pub fn subscribe(self: &Arc<Self>, topic: &str) -> Result<()> {
        let state = self.state();
        if state != State::Init || self.subscribing.swap(true, Ordering::AcqRel) {
            error!(topic = %topic, state = %state, "Cannot subscribe client in wrong state");
            return Err(Error::WrongState(state));
        }

        match self.bind(topic) {
            Ok(()) => {
                debug!(topic = %topic, "Client subscribed");
                Ok(())
            }
            Err(e) => {
                self.subscribing.store(false, Ordering::Release);
                error!(topic = %topic, error = %e, "Client subscribe failed");
                Err(e)
            }
        }
    }

    fn bind(self: &Arc<Self>, name: &str) -> Result<()> {
        let topic = self.queue.register_topic(name)?;
        topic.subscribe(self.clone())?;
        self.topic
            .set(topic)
            .map_err(|_| Error::Internal(format!("client already bound to {}", name)))?;
        self.state
            .transition(State::Init, State::Running)
            .map_err(Error::WrongState)
    }

    /// Receive the next message delivered by the bound topic.
    ///
    /// Returns `None` once the client is closed and every delivered message
    /// has been received.
    pub async fn recv(&self) -> Option<Message> {
        self.inbox_rx.lock().await.recv().await
    }

    /// Publish `msg` to the bound topic
    pub async fn publish(&self, msg: Message, timeout: Duration) -> Result<()> {
        let Some(topic) = self.topic.get() else {
            error!(state = %self.state(), "Publish from unsubscribed client");
            return Err(Error::WrongState(self.state()));
        };

        let state = topic.state();
        if state != State::Running {
            error!(topic = %topic.name(), state = %state, "Publish to topic in wrong state");
            return Err(Error::WrongState(state));
        }
        topic.publish(msg, timeout).await
    }

    /// Wait for the reply to `msg`
    pub async fn wait(&self, msg: &Message, timeout: Duration) -> Result<Message> {
        msg.wait(timeout).await
    }

    /// Publish `msg` and wait for its reply. Waiting is skipped if publishing fails.
    pub async fn publish_and_wait(
        &self,
        msg: Message,
        publish_timeout: Duration,
        wait_timeout: Duration,
    ) -> Result<Message> {
        let handle = msg.clone();
        self.publish(msg, publish_timeout).await?;
        self.wait(&handle, wait_timeout).await
    }

    /// Close the bound topic, waiting for it to drain into this client
    pub async fn close(&self) -> Result<()> {
        if let Err(state) = self.state.transition(State::Running, State::Closing) {
            error!(state = %state, "Close client in wrong state");
            return Err(Error::WrongState(state));
        }

        let result = match self.topic.get() {
            Some(topic) => topic.close().await,
            None => Ok(()),
        };

        // Dropping the sender ends `recv` once the inbox is empty.
        self.inbox_tx.lock().take();
        let _ = self.state.transition(State::Closing, State::Closed);
        info!(topic = ?self.topic_name(), "Client closed");
        result
    }
}

#[async_trait]
impl Subscriber for Client {
    async fn on_message_received(&self, msg: Message) {
        let tx = self.inbox_tx.lock().clone();
        match tx {
            Some(tx) => {
                if tx.send(msg).await.is_err() {
                    warn!(topic = ?self.topic_name(), "Client inbox closed, message dropped");
                }
            }
            None => warn!(topic = ?self.topic_name(), "Client closed, message dropped"),
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("queue", &self.queue.name())
            .field("topic", &self.topic_name())
            .field("state", &self.state())
            .finish()
    }
}
