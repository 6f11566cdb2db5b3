/// Queue & Worker Runtime.
///
/// Jobs are canonical rows in Postgres — the claim in `DatabaseManager::claim_next_job`
/// is the only place exclusivity is decided. Redis is a low-latency wakeup
/// signal layered on top: enqueue pushes the queue name onto a list so idle
/// workers blocked on `BRPOP` wake immediately instead of waiting for the
/// next poll tick.
pub mod handlers;
pub mod job;
pub mod worker;

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::core::errors::EngineResult;
use crate::metrics::JOBS_ENQUEUED;
use crate::queue::job::{Job, QueueName};
use crate::storage::DatabaseManager;

fn wakeup_key(queue: QueueName) -> String {
    format!("queue:wakeup:{queue}")
}

#[derive(Clone)]
pub struct QueueHandle {
    db: std::sync::Arc<DatabaseManager>,
    redis: ConnectionManager,
}

impl QueueHandle {
    pub fn new(db: std::sync::Arc<DatabaseManager>, redis: ConnectionManager) -> Self {
        Self { db, redis }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn enqueue(
        &self,
        queue: QueueName,
        kind: &str,
        payload: serde_json::Value,
        wallet_address: Option<&str>,
        scope: Option<&str>,
        max_attempts: i32,
    ) -> EngineResult<Job> {
        let job = self
            .db
            .enqueue_job(
                queue,
                kind,
                payload,
                wallet_address,
                scope,
                max_attempts,
                chrono::Utc::now(),
            )
            .await?;

        JOBS_ENQUEUED.with_label_values(&[queue.as_str(), kind]).inc();

        let mut conn = self.redis.clone();
        let _: Result<(), _> = conn.lpush(wakeup_key(queue), job.id.to_string()).await;

        Ok(job)
    }

    pub async fn get_job(&self, id: Uuid) -> EngineResult<Option<Job>> {
        self.db.get_job(id).await
    }

    pub async fn queue_stats(&self, queue: QueueName) -> EngineResult<job::QueueStats> {
        self.db.queue_stats(queue).await
    }

    /// Blocks (with a timeout, so the worker loop can still observe shutdown
    /// signals and promote delayed jobs) until a wakeup for `queue` arrives.
    pub async fn wait_for_wakeup(&self, queue: QueueName, timeout: Duration) {
        let mut conn = self.redis.clone();
        let _: Result<Option<(String, String)>, _> =
            conn.blpop(wakeup_key(queue), timeout.as_secs_f64()).await;
    }
}
