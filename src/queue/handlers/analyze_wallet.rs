/// `analysis-operations.analyze-wallet` — the dashboard pipeline's worker-side
/// execution for one `(wallet, scope)` pair.
use serde::Deserialize;

use crate::core::errors::{EngineError, EngineResult};
use crate::core::ids::validate_wallet_address;
use crate::events::JobEvent;
use crate::queue::job::{Job, QueueName};
use crate::queue::worker::WorkerContext;
use crate::scheduler::{AnalysisRequest, TriggerSource};
use crate::storage::models::Scope;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    wallet_address: String,
    analysis_scope: Scope,
    #[serde(default)]
    force_refresh: bool,
    history_window_days: Option<u32>,
    target_signature_count: Option<u32>,
    #[serde(default)]
    queue_working_after: bool,
    #[serde(default)]
    queue_deep_after: bool,
    #[serde(default)]
    enrich_metadata: bool,
}

async fn progress(ctx: &WorkerContext, job_id: uuid::Uuid, pct: u8, stage: &str) {
    let _ = ctx.db.set_job_progress(job_id, pct as i32).await;
    ctx.events
        .publish(
            QueueName::AnalysisOperations,
            JobEvent::Progress {
                job_id,
                progress: pct,
                stage: Some(stage.to_string()),
            },
        )
        .await;
}

pub async fn run(ctx: &WorkerContext, job: &Job) -> EngineResult<serde_json::Value> {
    let payload: Payload = serde_json::from_value(job.payload.clone())
        .map_err(|e| EngineError::InvalidInput(format!("bad analyze-wallet payload: {e}")))?;

    validate_wallet_address(&payload.wallet_address)?;

    // Step 1: shared lock with sync-wallet — fetch and analyze are serialized
    // per wallet so the analyzer never reads a store mid-fetch.
    let lock = ctx
        .lock
        .try_acquire(&payload.wallet_address, "sync", ctx.config.lock_ttl)
        .await?;
    let Some(handle) = lock else {
        let running_id = ctx
            .db
            .has_active_job(&payload.wallet_address, "sync-wallet", None)
            .await?
            .map(|j| j.id.to_string())
            .unwrap_or_else(|| job.id.to_string());
        return Err(EngineError::AlreadyRunning { job_id: running_id });
    };

    let outcome = execute(ctx, job, &payload).await;

    let _ = ctx.lock.release(handle).await;
    outcome
}

async fn execute(
    ctx: &WorkerContext,
    job: &Job,
    payload: &Payload,
) -> EngineResult<serde_json::Value> {
    ctx.db.upsert_wallet(&payload.wallet_address).await?;

    let scope_config = ctx.config.scope(payload.analysis_scope);
    let target = payload
        .target_signature_count
        .unwrap_or(scope_config.target_signature_count);

    progress(ctx, job.id, 10, "fetching").await;

    // Step 2: Smart-Fetch brings the store up to the scope's target before
    // the analyzer reads it.
    let since = if payload.force_refresh {
        None
    } else {
        payload
            .history_window_days
            .or(scope_config.window_days)
            .map(|days| chrono::Utc::now() - chrono::Duration::days(days as i64))
    };

    ctx.smart_fetch
        .run(&payload.wallet_address, target, since, &ctx.db)
        .await?;

    progress(ctx, job.id, 40, "loading-inputs").await;

    // Step 3: load the swap inputs the analyzer will fold over. Flash/working
    // bound by the scope's window; deep reads the full history on file.
    let analyzer_since = scope_config
        .window_days
        .map(|days| chrono::Utc::now() - chrono::Duration::days(days as i64));
    let inputs = ctx
        .db
        .get_swap_inputs(&payload.wallet_address, analyzer_since)
        .await?;

    let run_id = ctx
        .db
        .start_analysis_run(&payload.wallet_address, payload.analysis_scope)
        .await?;

    progress(ctx, job.id, 60, "analyzing").await;

    // Step 4: pure analysis.
    let (results, summary, behavior) = crate::analyzers::analyze(
        &payload.wallet_address,
        payload.analysis_scope,
        &inputs,
    );

    // Step 5: atomic persistence of run + results + summary + behavior.
    if let Err(e) = ctx
        .db
        .complete_analysis_run(
            run_id,
            &payload.wallet_address,
            payload.analysis_scope,
            inputs.len() as i32,
            &results,
            &summary,
            &behavior,
        )
        .await
    {
        let _ = ctx.db.fail_analysis_run(run_id).await;
        return Err(e);
    }

    progress(ctx, job.id, 85, "persisted").await;

    // Step 6/7: chain follow-up scopes and the enrichment job. These are
    // best-effort — a failure here does not fail the analysis itself. A
    // follow-up that the scheduler itself skips (fresh store, concurrency
    // gate) is simply absent from `followUpJobsQueued` — that omission is
    // the exclusive signal clients use to transition a queued placeholder
    // to `skipped`.
    let mut candidate_scopes = Vec::new();
    if payload.queue_working_after && payload.analysis_scope == Scope::Flash {
        candidate_scopes.push(Scope::Working);
    }
    if payload.queue_deep_after
        && matches!(payload.analysis_scope, Scope::Flash | Scope::Working)
    {
        candidate_scopes.push(Scope::Deep);
    }

    let mut follow_up_jobs_queued = Vec::new();
    for follow_up in &candidate_scopes {
        let req = AnalysisRequest {
            wallet_address: payload.wallet_address.clone(),
            analysis_scope: *follow_up,
            trigger_source: TriggerSource::System,
            force_refresh: false,
            history_window_days: None,
            target_signature_count: None,
            queue_working_after: false,
            queue_deep_after: false,
            enrich_metadata: payload.enrich_metadata,
        };
        match ctx.scheduler.schedule(req).await {
            Ok(resp) => {
                if let Some(job_id) = resp.job_id.filter(|_| !resp.already_running) {
                    follow_up_jobs_queued.push(serde_json::json!({
                        "scope": follow_up,
                        "jobId": job_id,
                    }));
                }
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    wallet = %payload.wallet_address,
                    scope = %follow_up,
                    "failed to queue follow-up scope"
                );
            }
        }
    }

    let mut enrichment_job_id: Option<uuid::Uuid> = None;
    if payload.enrich_metadata {
        let mints: Vec<String> = results.iter().map(|r| r.token_mint.clone()).collect();
        if !mints.is_empty() {
            let enrich_payload = serde_json::json!({
                "walletAddress": payload.wallet_address,
                "mints": mints,
            });
            match ctx
                .queue
                .enqueue(
                    QueueName::EnrichmentOperations,
                    "enrich-tokens",
                    enrich_payload,
                    Some(&payload.wallet_address),
                    Some(&payload.analysis_scope.to_string()),
                    ctx.config.retry_max_attempts as i32,
                )
                .await
            {
                Ok(enrich_job) => enrichment_job_id = Some(enrich_job.id),
                Err(e) => tracing::warn!(error = %e, "failed to queue enrichment job"),
            }
        }
    }

    serde_json::to_value(serde_json::json!({
        "walletAddress": payload.wallet_address,
        "scope": payload.analysis_scope,
        "inputRecordCount": inputs.len(),
        "resultCount": results.len(),
        "enrichmentJobId": enrichment_job_id,
        "followUpJobsQueued": follow_up_jobs_queued,
    }))
    .map_err(|e| EngineError::Internal(e.to_string()))
}
