/// Worker runtime: one loop per queue, each claiming jobs with a bounded
/// number of concurrent handlers.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::core::config::Config;
use crate::core::errors::EngineResult;
use crate::events::EventBus;
use crate::fetcher::RateLimitedFetcher;
use crate::lock::DistributedLock;
use crate::metrics::{JOBS_COMPLETED, JOBS_FAILED, JOB_DURATION, QUEUE_DEPTH};
use crate::queue::job::{Job, QueueName};
use crate::queue::{handlers, QueueHandle};
use crate::scheduler::DashboardScheduler;
use crate::smart_fetch::SmartFetchController;
use crate::storage::DatabaseManager;

/// Shared dependencies every job handler needs. Cheap to clone (all fields
/// are `Arc`s or already-cloneable connection handles).
#[derive(Clone)]
pub struct WorkerContext {
    pub db: Arc<DatabaseManager>,
    pub queue: QueueHandle,
    pub events: EventBus,
    pub lock: DistributedLock,
    pub fetcher: RateLimitedFetcher,
    pub smart_fetch: Arc<SmartFetchController>,
    pub scheduler: Arc<DashboardScheduler>,
    pub config: Arc<Config>,
}

pub struct Worker {
    ctx: WorkerContext,
    queue_name: QueueName,
    concurrency: usize,
}

impl Worker {
    pub fn new(ctx: WorkerContext, queue_name: QueueName, concurrency: usize) -> Self {
        Self {
            ctx,
            queue_name,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run(self) {
        let permits = Arc::new(Semaphore::new(self.concurrency));

        loop {
            let _ = self.ctx.db.promote_delayed_jobs(self.queue_name).await;

            if let Ok(stats) = self.ctx.queue.queue_stats(self.queue_name).await {
                QUEUE_DEPTH
                    .with_label_values(&[self.queue_name.as_str()])
                    .set(stats.waiting as f64);
            }

            let claimed = match self.ctx.db.claim_next_job(self.queue_name).await {
                Ok(job) => job,
                Err(e) => {
                    tracing::warn!(error = %e, queue = %self.queue_name, "job claim failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let Some(job) = claimed else {
                self.ctx
                    .queue
                    .wait_for_wakeup(self.queue_name, Duration::from_secs(5))
                    .await;
                continue;
            };

            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };

            let ctx = self.ctx.clone();
            let queue_name = self.queue_name;
            tokio::spawn(async move {
                let _permit = permit;
                process_one(ctx, queue_name, job).await;
            });
        }
    }
}

async fn process_one(ctx: WorkerContext, queue_name: QueueName, job: Job) {
    use crate::events::JobEvent;

    ctx.events
        .publish(queue_name, JobEvent::QueueToStart { job_id: job.id })
        .await;

    let timer = crate::metrics::Timer::new();
    let result = run_with_timeout(&ctx, queue_name, &job).await;
    JOB_DURATION
        .with_label_values(&[queue_name.as_str(), &job.kind])
        .observe(timer.elapsed_secs());

    match result {
        Ok(payload) => {
            if let Err(e) = ctx.db.complete_job(job.id, payload.clone()).await {
                tracing::error!(error = %e, job_id = %job.id, "failed to persist job completion");
            }
            JOBS_COMPLETED
                .with_label_values(&[queue_name.as_str(), &job.kind])
                .inc();
            ctx.events
                .publish(
                    queue_name,
                    JobEvent::Completed {
                        job_id: job.id,
                        timestamp: chrono::Utc::now(),
                        result: payload,
                    },
                )
                .await;
        }
        // `already_running` is informational, not a failure: the lock
        // was held by another worker for this wallet. It completes the job
        // immediately without touching the retry/attempts counter.
        Err(crate::core::errors::EngineError::AlreadyRunning { job_id: running_id }) => {
            let payload = serde_json::json!({ "alreadyRunning": true, "jobId": running_id });
            if let Err(e) = ctx.db.complete_job(job.id, payload.clone()).await {
                tracing::error!(error = %e, job_id = %job.id, "failed to persist already-running completion");
            }
            JOBS_COMPLETED
                .with_label_values(&[queue_name.as_str(), &job.kind])
                .inc();
            ctx.events
                .publish(
                    queue_name,
                    JobEvent::Completed {
                        job_id: job.id,
                        timestamp: chrono::Utc::now(),
                        result: payload,
                    },
                )
                .await;
        }
        // Terminal classes (bad input, timeout, restricted wallet, lookup
        // misses, and internal errors) are never retried — they go straight
        // to `failed`. Only transient classes feed the attempts/backoff loop.
        Err(err) if !err.is_transient() => {
            let message = err.to_string();
            if let Err(e) = ctx.db.fail_job(job.id, &message).await {
                tracing::error!(error = %e, job_id = %job.id, "failed to persist job failure");
            }
            JOBS_FAILED
                .with_label_values(&[queue_name.as_str(), &job.kind])
                .inc();
            ctx.events
                .publish(
                    queue_name,
                    JobEvent::Failed {
                        job_id: job.id,
                        timestamp: chrono::Utc::now(),
                        error: message,
                    },
                )
                .await;
        }
        Err(err) => {
            let message = err.to_string();
            let next_state = ctx
                .db
                .fail_or_retry_job(
                    job.id,
                    &message,
                    ctx.config.retry_base_backoff,
                    ctx.config.retry_max_backoff,
                )
                .await
                .unwrap_or(crate::queue::job::JobState::Failed);

            JOBS_FAILED
                .with_label_values(&[queue_name.as_str(), &job.kind])
                .inc();

            if next_state == crate::queue::job::JobState::Failed {
                ctx.events
                    .publish(
                        queue_name,
                        JobEvent::Failed {
                            job_id: job.id,
                            timestamp: chrono::Utc::now(),
                            error: message,
                        },
                    )
                    .await;
            }
        }
    }
}

async fn run_with_timeout(
    ctx: &WorkerContext,
    queue_name: QueueName,
    job: &Job,
) -> EngineResult<serde_json::Value> {
    let timeout = handlers::timeout_for(queue_name, job, &ctx.config);
    match tokio::time::timeout(timeout, dispatch(ctx, queue_name, job)).await {
        Ok(result) => result,
        Err(_) => Err(crate::core::errors::EngineError::Timeout(format!(
            "job {} exceeded its time budget",
            job.id
        ))),
    }
}

async fn dispatch(
    ctx: &WorkerContext,
    queue_name: QueueName,
    job: &Job,
) -> EngineResult<serde_json::Value> {
    match (queue_name, job.kind.as_str()) {
        (QueueName::WalletOperations, "sync-wallet") => handlers::sync_wallet::run(ctx, job).await,
        (QueueName::AnalysisOperations, "analyze-wallet") => {
            handlers::analyze_wallet::run(ctx, job).await
        }
        (QueueName::SimilarityOperations, "similarity") => {
            handlers::similarity::run(ctx, job).await
        }
        (QueueName::EnrichmentOperations, "enrich-tokens") => {
            handlers::enrich_tokens::run(ctx, job).await
        }
        (queue, kind) => Err(crate::core::errors::EngineError::Internal(format!(
            "no handler registered for {queue}/{kind}"
        ))),
    }
}
