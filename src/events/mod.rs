/// Event Bus — publishes per-job lifecycle events to a shared Redis pub/sub
/// broker. The Progress Gateway pattern-subscribes and fans events out to
/// WebSocket clients; see [`gateway`].
pub mod gateway;

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use tokio::time::sleep;
use uuid::Uuid;

use crate::metrics::{EVENTS_PUBLISHED, EVENTS_PUBLISH_DROPPED};
use crate::queue::job::QueueName;

const RETRY_DELAYS_MS: [u64; 3] = [100, 200, 400];

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum JobEvent {
    #[serde(rename = "job.queue-to-start")]
    QueueToStart { job_id: Uuid },
    #[serde(rename = "job.progress")]
    Progress {
        job_id: Uuid,
        progress: u8,
        stage: Option<String>,
    },
    #[serde(rename = "job.completed")]
    Completed {
        job_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
        result: serde_json::Value,
    },
    #[serde(rename = "job.failed")]
    Failed {
        job_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
        error: String,
    },
}

impl JobEvent {
    fn job_id(&self) -> Uuid {
        match self {
            JobEvent::QueueToStart { job_id } => *job_id,
            JobEvent::Progress { job_id, .. } => *job_id,
            JobEvent::Completed { job_id, .. } => *job_id,
            JobEvent::Failed { job_id, .. } => *job_id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            JobEvent::QueueToStart { .. } => "queue-to-start",
            JobEvent::Progress { .. } => "progress",
            JobEvent::Completed { .. } => "completed",
            JobEvent::Failed { .. } => "failed",
        }
    }
}

fn channel(queue: QueueName, event: &JobEvent) -> String {
    format!("job:{}:{}:{}", event.kind(), queue, event.job_id())
}

#[derive(Clone)]
pub struct EventBus {
    redis: ConnectionManager,
}

impl EventBus {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Publishes with bounded retry. A publish that fails all attempts is
    /// logged as dropped; the store remains authoritative, so the worker
    /// proceeds regardless — persisted job state remains authoritative.
    pub async fn publish(&self, queue: QueueName, event: JobEvent) {
        let channel = channel(queue, &event);
        let payload = match serde_json::to_string(&event) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize job event");
                return;
            }
        };

        for (attempt, delay_ms) in std::iter::once(0).chain(RETRY_DELAYS_MS).enumerate() {
            if attempt > 0 {
                sleep(Duration::from_millis(delay_ms)).await;
            }

            let mut conn = self.redis.clone();
            match conn.publish::<_, _, i64>(&channel, &payload).await {
                Ok(_) => {
                    EVENTS_PUBLISHED.with_label_values(&[event.kind()]).inc();
                    return;
                }
                Err(e) if attempt < RETRY_DELAYS_MS.len() => {
                    tracing::debug!(error = %e, attempt, "event publish retrying");
                }
                Err(e) => {
                    tracing::warn!(error = %e, channel = %channel, "event publish dropped");
                    EVENTS_PUBLISH_DROPPED.inc();
                }
            }
        }
    }

    pub fn redis(&self) -> ConnectionManager {
        self.redis.clone()
    }
}
