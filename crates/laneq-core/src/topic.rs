//! Topic - two priority lanes feeding a single subscriber
//!
//! A topic owns a high lane and a low lane. Subscribing starts one dispatch
//! task that drains the high lane first and otherwise races both lanes and
//! the close signal. High priority is favored, not strictly ordered: once
//! the task falls through to the blocking wait, a low message may win.
//!
//! Closing is two-phase: signal the task, then wait for it to exit. Before
//! exiting the task closes both lanes, so later publishes fail, and delivers
//! everything that was already queued (high lane first, then low lane).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use laneq_types::{AtomicState, Error, Message, Priority, Result, State, TopicConfig};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::subscriber::Subscriber;

/// Topic statistics
#[derive(Debug, Clone, Serialize)]
pub struct TopicStats {
    pub name: String,
    pub state: State,
    /// Messages waiting in the high lane
    pub high_pending: usize,
    /// Messages waiting in the low lane
    pub low_pending: usize,
    /// Messages handed to the subscriber so far
    pub delivered: u64,
}

/// State shared with the dispatch task
#[derive(Debug)]
struct Shared {
    name: String,
    state: AtomicState,
    delivered: AtomicU64,
}

impl Shared {
    async fn deliver(&self, subscriber: &dyn Subscriber, msg: Message) {
        trace!(topic = %self.name, priority = %msg.priority(), "Delivering message");
        subscriber.on_message_received(msg).await;
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }
}

/// Receiving ends handed to the dispatch task on subscribe
struct Lanes {
    high: mpsc::Receiver<Message>,
    low: mpsc::Receiver<Message>,
    close: oneshot::Receiver<()>,
}

/// A named topic with one subscriber
pub struct Topic {
    shared: Arc<Shared>,
    high_tx: mpsc::Sender<Message>,
    low_tx: mpsc::Sender<Message>,
    lanes: Mutex<Option<Lanes>>,
    close_tx: Mutex<Option<oneshot::Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Topic {
    /// Create a topic in `Init` state
    pub fn new(name: impl Into<String>, config: &TopicConfig) -> Self {
        let (high_tx, high) = mpsc::channel(config.high_capacity.max(1));
        let (low_tx, low) = mpsc::channel(config.low_capacity.max(1));
        let (close_tx, close) = oneshot::channel();

        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                state: AtomicState::new(State::Init),
                delivered: AtomicU64::new(0),
            }),
            high_tx,
            low_tx,
            lanes: Mutex::new(Some(Lanes { high, low, close })),
            close_tx: Mutex::new(Some(close_tx)),
            worker: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> State {
        self.shared.state.load()
    }

    /// Queue `msg` on the lane matching its priority.
    ///
    /// Waits up to `timeout` for room in the lane. A timed out publish never
    /// enqueues the message.
    pub async fn publish(&self, msg: Message, timeout: Duration) -> Result<()> {
        let state = self.state();
        if state != State::Running {
            error!(topic = %self.name(), state = %state, "Publish on topic in wrong state");
            return Err(Error::WrongState(state));
        }

        let lane = match msg.priority() {
            Priority::High => &self.high_tx,
            Priority::Low | Priority::None => &self.low_tx,
        };

        match tokio::time::timeout(timeout, lane.send(msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => {
                // Lanes are closed once the dispatch task starts draining.
                let state = self.state();
                error!(topic = %self.name(), state = %state, "Publish on closed lane");
                Err(Error::WrongState(state))
            }
            Err(_) => {
                warn!(topic = %self.name(), timeout = ?timeout, "Publish timed out");
                Err(Error::PublishTimeout(self.name().to_string()))
            }
        }
    }

    /// Bind the one subscriber and start the dispatch task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> Result<()> {
        let state = self.state();
        if state != State::Init {
            error!(topic = %self.name(), state = %state, "Subscribe on topic in wrong state");
            return Err(Error::WrongState(state));
        }

        let Some(lanes) = self.lanes.lock().take() else {
            let state = self.state();
            error!(topic = %self.name(), state = %state, "Topic already has a subscriber");
            return Err(Error::WrongState(state));
        };

        let handle = tokio::spawn(dispatch(self.shared.clone(), lanes, subscriber));
        *self.worker.lock() = Some(handle);

        self.shared
            .state
            .transition(State::Init, State::Running)
            .map_err(Error::WrongState)?;
        info!(topic = %self.name(), "Topic running");
        Ok(())
    }

    /// Stop accepting messages and wait until everything queued is delivered
    pub async fn close(&self) -> Result<()> {
        if let Err(state) = self.shared.state.transition(State::Running, State::Closing) {
            error!(topic = %self.name(), state = %state, "Close on topic in wrong state");
            return Err(Error::WrongState(state));
        }
        info!(topic = %self.name(), "Topic closing");

        let close_tx = self.close_tx.lock().take();
        if let Some(close_tx) = close_tx {
            let _ = close_tx.send(());
        }

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                let _ = self.shared.state.transition(State::Closing, State::Closed);
                error!(topic = %self.name(), error = %e, "Dispatch task failed");
                return Err(Error::Internal(format!(
                    "dispatch task for topic {} failed: {}",
                    self.name(),
                    e
                )));
            }
        }

        info!(topic = %self.name(), "Topic closed");
        Ok(())
    }

    /// Get topic statistics
    pub fn stats(&self) -> TopicStats {
        TopicStats {
            name: self.name().to_string(),
            state: self.state(),
            high_pending: self.high_tx.max_capacity() - self.high_tx.capacity(),
            low_pending: self.low_tx.max_capacity() - self.low_tx.capacity(),
            delivered: self.shared.delivered.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish()
    }
}

async fn dispatch(shared: Arc<Shared>, lanes: Lanes, subscriber: Arc<dyn Subscriber>) {
    let Lanes {
        mut high,
        mut low,
        mut close,
    } = lanes;

    loop {
        if let Ok(msg) = high.try_recv() {
            shared.deliver(subscriber.as_ref(), msg).await;
            continue;
        }

        tokio::select! {
            Some(msg) = high.recv() => shared.deliver(subscriber.as_ref(), msg).await,
            Some(msg) = low.recv() => shared.deliver(subscriber.as_ref(), msg).await,
            _ = &mut close => break,
            else => break,
        }
    }

    debug!(topic = %shared.name, "Draining topic lanes");
    high.close();
    low.close();
    while let Some(msg) = high.recv().await {
        shared.deliver(subscriber.as_ref(), msg).await;
    }
    while let Some(msg) = low.recv().await {
        shared.deliver(subscriber.as_ref(), msg).await;
    }

    if let Err(state) = shared.state.transition(State::Closing, State::Closed) {
        debug!(topic = %shared.name, state = %state, "Dispatch stopped without close");
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use laneq_types::Action;

    use super::*;

    #[derive(Default)]
    struct Collector {
        received: Mutex<Vec<Message>>,
    }

    impl Collector {
        fn payloads(&self) -> Vec<String> {
            self.received
                .lock()
                .iter()
                .map(|m| m.payload().to_string())
                .collect()
        }
    }

    #[async_trait]
    impl Subscriber for Collector {
        async fn on_message_received(&self, msg: Message) {
            self.received.lock().push(msg);
        }
    }

    /// Takes the first message and never returns
    struct Stuck;

    #[async_trait]
    impl Subscriber for Stuck {
        async fn on_message_received(&self, _msg: Message) {
            std::future::pending::<()>().await;
        }
    }

    /// Records each message only after the test hands out a permit
    struct Gated {
        gate: tokio::sync::Semaphore,
        collector: Collector,
    }

    #[async_trait]
    impl Subscriber for Gated {
        async fn on_message_received(&self, msg: Message) {
            self.gate.acquire().await.unwrap().forget();
            self.collector.on_message_received(msg).await;
        }
    }

    fn msg(payload: String, priority: Priority) -> Message {
        Message::new("jobs", Action(1), payload).with_priority(priority)
    }

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_publish_before_subscribe_fails() {
        let topic = Topic::new("jobs", &TopicConfig::default());

        let err = topic
            .publish(msg("early".into(), Priority::High), TIMEOUT)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::WrongState(State::Init)));
        let stats = topic.stats();
        assert_eq!(stats.high_pending, 0);
        assert_eq!(stats.low_pending, 0);
    }

    #[tokio::test]
    async fn test_subscribe_twice_fails() {
        let topic = Topic::new("jobs", &TopicConfig::default());
        let first = Arc::new(Collector::default());
        let second = Arc::new(Collector::default());

        topic.subscribe(first.clone()).unwrap();
        let err = topic.subscribe(second.clone()).unwrap_err();
        assert!(matches!(err, Error::WrongState(State::Running)));

        topic
            .publish(msg("one".into(), Priority::Low), TIMEOUT)
            .await
            .unwrap();
        topic.close().await.unwrap();

        assert_eq!(first.payloads(), vec!["one"]);
        assert!(second.payloads().is_empty());
    }

    #[tokio::test]
    async fn test_close_drains_both_lanes() {
        let topic = Topic::new("jobs", &TopicConfig::default());
        let collector = Arc::new(Collector::default());
        topic.subscribe(collector.clone()).unwrap();

        for i in 0..10 {
            topic
                .publish(msg(format!("high-{}", i), Priority::High), TIMEOUT)
                .await
                .unwrap();
        }
        for i in 0..20 {
            let priority = if i % 2 == 0 { Priority::Low } else { Priority::None };
            topic
                .publish(msg(format!("low-{}", i), priority), TIMEOUT)
                .await
                .unwrap();
        }

        topic.close().await.unwrap();
        assert_eq!(topic.state(), State::Closed);

        let payloads = collector.payloads();
        assert_eq!(payloads.len(), 30);

        let mut unique = payloads.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 30);

        // FIFO within each lane
        let highs: Vec<_> = payloads.iter().filter(|p| p.starts_with("high")).cloned().collect();
        let lows: Vec<_> = payloads.iter().filter(|p| p.starts_with("low")).cloned().collect();
        assert_eq!(highs, (0..10).map(|i| format!("high-{}", i)).collect::<Vec<_>>());
        assert_eq!(lows, (0..20).map(|i| format!("low-{}", i)).collect::<Vec<_>>());

        assert_eq!(topic.stats().delivered, 30);
    }

    #[tokio::test]
    async fn test_high_lane_is_drained_first() {
        let topic = Topic::new("jobs", &TopicConfig::default());
        let collector = Arc::new(Collector::default());
        topic.subscribe(collector.clone()).unwrap();

        // Nothing runs the dispatch task until we yield, so both lanes fill up.
        for i in 0..5 {
            topic
                .publish(msg(format!("low-{}", i), Priority::Low), TIMEOUT)
                .await
                .unwrap();
        }
        for i in 0..5 {
            topic
                .publish(msg(format!("high-{}", i), Priority::High), TIMEOUT)
                .await
                .unwrap();
        }

        topic.close().await.unwrap();

        let payloads = collector.payloads();
        assert_eq!(payloads.len(), 10);
        assert!(payloads[..5].iter().all(|p| p.starts_with("high")));
    }

    #[tokio::test]
    async fn test_publish_after_close_fails() {
        let topic = Topic::new("jobs", &TopicConfig::default());
        let collector = Arc::new(Collector::default());
        topic.subscribe(collector.clone()).unwrap();
        topic.close().await.unwrap();

        let err = topic
            .publish(msg("late".into(), Priority::High), TIMEOUT)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::WrongState(State::Closed)));
        assert!(collector.payloads().is_empty());
    }

    #[tokio::test]
    async fn test_publish_while_closing_fails_and_drain_completes() {
        let topic = Arc::new(Topic::new("jobs", &TopicConfig::default()));
        let gated = Arc::new(Gated {
            gate: tokio::sync::Semaphore::new(0),
            collector: Collector::default(),
        });
        topic.subscribe(gated.clone()).unwrap();

        topic
            .publish(msg("a".into(), Priority::High), TIMEOUT)
            .await
            .unwrap();
        topic
            .publish(msg("b".into(), Priority::Low), TIMEOUT)
            .await
            .unwrap();

        let closing = tokio::spawn({
            let topic = topic.clone();
            async move { topic.close().await }
        });
        for _ in 0..100 {
            if topic.state() == State::Closing {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(topic.state(), State::Closing);

        let err = topic
            .publish(msg("late".into(), Priority::High), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WrongState(State::Closing)));

        gated.gate.add_permits(2);
        closing.await.unwrap().unwrap();

        assert_eq!(topic.state(), State::Closed);
        assert_eq!(topic.stats().delivered, 2);
        assert_eq!(gated.collector.payloads(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_close_outside_running_fails() {
        let topic = Topic::new("jobs", &TopicConfig::default());
        assert!(matches!(
            topic.close().await.unwrap_err(),
            Error::WrongState(State::Init)
        ));

        topic.subscribe(Arc::new(Collector::default())).unwrap();
        topic.close().await.unwrap();
        assert!(matches!(
            topic.close().await.unwrap_err(),
            Error::WrongState(State::Closed)
        ));

        let err = topic.subscribe(Arc::new(Collector::default())).unwrap_err();
        assert!(matches!(err, Error::WrongState(State::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_times_out_on_full_lane() {
        let config = TopicConfig {
            high_capacity: 1,
            low_capacity: 1,
        };
        let topic = Topic::new("jobs", &config);
        topic.subscribe(Arc::new(Stuck)).unwrap();

        // First message is taken by the stuck subscriber, second fills the lane.
        topic
            .publish(msg("a".into(), Priority::High), TIMEOUT)
            .await
            .unwrap();
        topic
            .publish(msg("b".into(), Priority::High), TIMEOUT)
            .await
            .unwrap();

        let err = topic
            .publish(msg("c".into(), Priority::High), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PublishTimeout(ref name) if name == "jobs"));
        assert_eq!(topic.stats().high_pending, 1);

        // The low lane is independent of the full high lane.
        topic
            .publish(msg("d".into(), Priority::Low), TIMEOUT)
            .await
            .unwrap();
    }
}
