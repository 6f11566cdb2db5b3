/// `similarity-operations.similarity` — for each wallet, ensures sync+analyze
/// has completed (waiting via polled lock check, bounded by an aggregate
/// timeout), then computes pairwise similarity in-process.
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::analyzers::{cosine_similarity, pnl_vector};
use crate::core::errors::{EngineError, EngineResult};
use crate::core::ids::validate_wallet_address;
use crate::queue::job::Job;
use crate::queue::worker::WorkerContext;
use crate::scheduler::{AnalysisRequest, TriggerSource};
use crate::storage::models::Scope;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Scope similarity comparisons are ensured against. The source leaves this
/// unspecified; `working` balances history depth against ensure-latency.
const SIMILARITY_SCOPE: Scope = Scope::Working;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    wallet_addresses: Vec<String>,
    #[serde(default)]
    vector_type: Option<String>,
    /// Fraction of wallets (0.0-1.0) allowed to fail ensure-readiness before
    /// the whole job fails. Defaults to 0.0 (any failure fails the job).
    failure_threshold: Option<f64>,
    timeout_minutes: Option<u64>,
}

pub async fn run(ctx: &WorkerContext, job: &Job) -> EngineResult<serde_json::Value> {
    let payload: Payload = serde_json::from_value(job.payload.clone())
        .map_err(|e| EngineError::InvalidInput(format!("bad similarity payload: {e}")))?;

    if payload.wallet_addresses.len() < 2 {
        return Err(EngineError::InvalidInput(
            "similarity requires at least two wallet addresses".to_string(),
        ));
    }
    for addr in &payload.wallet_addresses {
        validate_wallet_address(addr)?;
    }

    let deadline = Instant::now()
        + payload
            .timeout_minutes
            .map(|m| Duration::from_secs(m * 60))
            .unwrap_or(ctx.config.similarity_timeout);
    let failure_threshold = payload.failure_threshold.unwrap_or(0.0);

    let mut vectors = Vec::new();
    let mut failed = Vec::new();

    for wallet in &payload.wallet_addresses {
        match ensure_ready(ctx, wallet, deadline).await {
            Ok(results) => vectors.push((wallet.clone(), pnl_vector(&results))),
            Err(e) => {
                tracing::warn!(wallet = %wallet, error = %e, "similarity ensure-readiness failed");
                failed.push(wallet.clone());
            }
        }
    }

    let failure_rate = failed.len() as f64 / payload.wallet_addresses.len() as f64;
    if failure_rate > failure_threshold {
        return Err(EngineError::Timeout(format!(
            "{}/{} wallets failed to become ready for similarity (threshold {})",
            failed.len(),
            payload.wallet_addresses.len(),
            failure_threshold
        )));
    }

    let mut pairs = Vec::new();
    for i in 0..vectors.len() {
        for j in (i + 1)..vectors.len() {
            let (wallet_a, vec_a) = &vectors[i];
            let (wallet_b, vec_b) = &vectors[j];
            let score = cosine_similarity(vec_a, vec_b);
            pairs.push(serde_json::json!({
                "walletA": wallet_a,
                "walletB": wallet_b,
                "score": score,
            }));
        }
    }

    serde_json::to_value(serde_json::json!({
        "vectorType": payload.vector_type.unwrap_or_else(|| "pnl".to_string()),
        "computedWallets": vectors.iter().map(|(w, _)| w).collect::<Vec<_>>(),
        "failedWallets": failed,
        "pairs": pairs,
    }))
    .map_err(|e| EngineError::Internal(e.to_string()))
}

/// Waits (bounded by `deadline`) for any in-progress sync to clear, ensures
/// the comparison scope is analyzed, then returns its results.
async fn ensure_ready(
    ctx: &WorkerContext,
    wallet: &str,
    deadline: Instant,
) -> EngineResult<Vec<crate::storage::models::AnalysisResult>> {
    while ctx.lock.is_held(wallet, "sync").await? {
        if Instant::now() >= deadline {
            return Err(EngineError::Timeout(format!(
                "timed out waiting for {wallet}'s sync to finish"
            )));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    let outcome = ctx
        .scheduler
        .schedule(AnalysisRequest {
            wallet_address: wallet.to_string(),
            analysis_scope: SIMILARITY_SCOPE,
            trigger_source: TriggerSource::System,
            force_refresh: false,
            history_window_days: None,
            target_signature_count: None,
            queue_working_after: false,
            queue_deep_after: false,
            enrich_metadata: false,
        })
        .await?;

    if let Some(job_id) = outcome.job_id {
        wait_for_job(ctx, job_id, deadline).await?;
    }

    ctx.db
        .get_analysis_results(wallet, SIMILARITY_SCOPE, 10_000, 0)
        .await
}

async fn wait_for_job(
    ctx: &WorkerContext,
    job_id: uuid::Uuid,
    deadline: Instant,
) -> EngineResult<()> {
    loop {
        let Some(job) = ctx.db.get_job(job_id).await? else {
            return Ok(());
        };
        match job.state {
            crate::queue::job::JobState::Completed => return Ok(()),
            crate::queue::job::JobState::Failed => {
                return Err(EngineError::ExternalUnavailable(format!(
                    "ensure-analysis job {job_id} failed"
                )))
            }
            _ => {
                if Instant::now() >= deadline {
                    return Err(EngineError::Timeout(format!(
                        "timed out waiting for analysis job {job_id}"
                    )));
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}
