//! LaneQ demo - request/reply over a priority topic
//!
//! Wires a queue, a worker client bound to the `jobs` topic and a batch of
//! producers that publish requests and wait for each reply.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use laneq_core::{Client, MessagePool, Queue};
use laneq_types::{Action, BrokerConfig, Priority};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const JOBS_TOPIC: &str = "jobs";
const ACTION_SQUARE: Action = Action(1);
const REQUESTS: i64 = 32;
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(1);
const WAIT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize, Deserialize)]
struct Job {
    id: i64,
    value: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct JobResult {
    id: i64,
    result: i64,
}

fn load_config() -> anyhow::Result<BrokerConfig> {
    match std::env::var("LANEQ_CONFIG") {
        Ok(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path))?;
            let config = BrokerConfig::from_json(&text)
                .with_context(|| format!("parsing config file {}", path))?;
            info!(path = %path, "Loaded configuration");
            Ok(config)
        }
        Err(_) => Ok(BrokerConfig::default()),
    }
}

/// Answer every job with the square of its value until the client closes
async fn run_worker(client: Arc<Client>, pool: Arc<MessagePool>) -> u64 {
    let mut handled = 0;
    while let Some(msg) = client.recv().await {
        let reply = match msg.payload().as_json::<Job>() {
            Ok(job) if msg.action() == ACTION_SQUARE => {
                let result = JobResult {
                    id: job.id,
                    result: job.value * job.value,
                };
                match serde_json::to_value(&result) {
                    Ok(value) => pool.acquire_no_reply(value),
                    Err(e) => pool.acquire_error(e),
                }
            }
            Ok(_) => {
                warn!(action = %msg.action(), "Unknown action");
                pool.acquire_no_reply("unknown action")
            }
            Err(e) => pool.acquire_error(e),
        };

        if let Err(e) = msg.reply(reply).await {
            warn!(error = %e, "Failed to reply");
        }
        handled += 1;
    }
    handled
}

/// Publish one job and wait for its result
async fn run_request(
    queue: Arc<Queue>,
    pool: Arc<MessagePool>,
    id: i64,
) -> anyhow::Result<JobResult> {
    let priority = if id % 2 == 0 { Priority::High } else { Priority::Low };
    let payload = serde_json::to_value(Job { id, value: id })?;
    let request = pool
        .acquire_request(JOBS_TOPIC, ACTION_SQUARE, payload)
        .with_priority(priority);

    queue.publish(request.clone(), PUBLISH_TIMEOUT).await?;
    let reply = request.wait(WAIT_TIMEOUT).await?;

    let result = match reply.error() {
        Some(e) => Err(anyhow::anyhow!("job {} failed: {}", id, e)),
        None => reply
            .payload()
            .as_json::<JobResult>()
            .map_err(anyhow::Error::from),
    };
    pool.release([reply, request]);
    result
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "laneq=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config()?;

    // One pool for the whole process
    let pool = Arc::new(MessagePool::with_config(config.pool.clone()));

    let queue = Arc::new(Queue::with_config(&config.queue_name, config.topic.clone()));
    queue.start()?;

    let worker_client = Client::with_config(queue.clone(), config.client.clone());
    worker_client.subscribe(JOBS_TOPIC)?;
    let worker = tokio::spawn(run_worker(worker_client.clone(), pool.clone()));

    let mut producers = JoinSet::new();
    for id in 0..REQUESTS {
        let queue = queue.clone();
        let pool = pool.clone();
        producers.spawn(run_request(queue, pool, id));
    }

    let mut completed = 0;
    while let Some(joined) = producers.join_next().await {
        match joined? {
            Ok(result) => {
                info!(id = result.id, result = result.result, "Job completed");
                completed += 1;
            }
            Err(e) => warn!(error = %e, "Job failed"),
        }
    }

    let topic = queue.get_topic(JOBS_TOPIC)?;
    info!(stats = %serde_json::to_string(&topic.stats())?, "Topic stats");

    worker_client.close().await?;
    let handled = worker.await?;
    queue.close()?;

    info!(
        completed = completed,
        handled = handled,
        pool = %serde_json::to_string(&pool.stats())?,
        "Demo finished"
    );

    Ok(())
}
