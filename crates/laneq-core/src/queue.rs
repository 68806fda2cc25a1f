//! Queue - named registry of topics
//!
//! The queue owns every topic registered through it and gates registration
//! on its own lifecycle. Closing the queue leaves its topics alone; they are
//! closed through the clients bound to them.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use laneq_types::{AtomicState, Error, Message, Result, State, TopicConfig};
use tracing::{debug, error, info};

use crate::topic::Topic;

/// Registry mapping topic names to topics
#[derive(Debug)]
pub struct Queue {
    name: String,
    config: TopicConfig,
    topics: DashMap<String, Arc<Topic>>,
    state: AtomicState,
}

impl Queue {
    /// Create a queue whose topics use the default lane capacities
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, TopicConfig::default())
    }

    /// Create a queue whose topics use `config`
    pub fn with_config(name: impl Into<String>, config: TopicConfig) -> Self {
        Self {
            name: name.into(),
            config,
            topics: DashMap::new(),
            state: AtomicState::new(State::Init),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> State {
        self.state.load()
    }

    /// Move from `Init` to `Running`
    pub fn start(&self) -> Result<()> {
        if let Err(state) = self.state.transition(State::Init, State::Running) {
            error!(queue = %self.name, state = %state, "Cannot start queue");
            return Err(Error::WrongState(state));
        }
        info!(queue = %self.name, "Queue started");
        Ok(())
    }

    /// Move from `Running` to `Closed`. Registered topics keep running.
    pub fn close(&self) -> Result<()> {
        if let Err(state) = self.state.transition(State::Running, State::Closed) {
            error!(queue = %self.name, state = %state, "Cannot close queue");
            return Err(Error::WrongState(state));
        }
        info!(queue = %self.name, "Queue closed");
        Ok(())
    }

    /// Create and store a new topic.
    ///
    /// Fails if the name is taken; the existing topic is left untouched.
    pub fn register_topic(&self, name: &str) -> Result<Arc<Topic>> {
        let state = self.state();
        if state != State::Running {
            error!(queue = %self.name, topic = %name, state = %state, "Register topic in wrong state");
            return Err(Error::WrongState(state));
        }

        match self.topics.entry(name.to_string()) {
            Entry::Occupied(_) => {
                error!(queue = %self.name, topic = %name, "Topic already exists");
                Err(Error::TopicAlreadyExists(name.to_string()))
            }
            Entry::Vacant(entry) => {
                let topic = Arc::new(Topic::new(name, &self.config));
                entry.insert(topic.clone());
                debug!(queue = %self.name, topic = %name, "Topic registered");
                Ok(topic)
            }
        }
    }

    /// Get a topic by name, regardless of queue state
    pub fn get_topic(&self, name: &str) -> Result<Arc<Topic>> {
        self.topics
            .get(name)
            .map(|topic| topic.clone())
            .ok_or_else(|| Error::TopicNotFound(name.to_string()))
    }

    /// Publish `msg` to the topic named by the message itself
    pub async fn publish(&self, msg: Message, timeout: Duration) -> Result<()> {
        let topic = self.get_topic(msg.topic())?;
        topic.publish(msg, timeout).await
    }

    /// Names of all registered topics
    pub fn topic_names(&self) -> Vec<String> {
        self.topics.iter().map(|t| t.key().clone()).collect()
    }

    /// Number of registered topics
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}
