/// `wallet-operations.sync-wallet` — runs Smart-Fetch for a wallet outside
/// the dashboard scope ladder (e.g. a plain resync request).
use serde::Deserialize;

use crate::core::errors::{EngineError, EngineResult};
use crate::core::ids::validate_wallet_address;
use crate::queue::job::Job;
use crate::queue::worker::WorkerContext;

#[derive(Debug, Deserialize)]
struct Payload {
    wallet_address: String,
    #[serde(default)]
    force_refresh: bool,
    #[serde(default)]
    fetch_older: bool,
    #[serde(default)]
    fetch_all: bool,
}

pub async fn run(ctx: &WorkerContext, job: &Job) -> EngineResult<serde_json::Value> {
    let payload: Payload = serde_json::from_value(job.payload.clone())
        .map_err(|e| EngineError::InvalidInput(format!("bad sync-wallet payload: {e}")))?;

    validate_wallet_address(&payload.wallet_address)?;

    let lock = ctx
        .lock
        .try_acquire(&payload.wallet_address, "sync", ctx.config.lock_ttl)
        .await?;

    let Some(handle) = lock else {
        // Idle-deduplicate: report the wallet's actual running job, not this
        // one's own id.
        let running_id = ctx
            .db
            .has_active_job(&payload.wallet_address, "sync-wallet", None)
            .await?
            .map(|j| j.id.to_string())
            .unwrap_or_else(|| job.id.to_string());
        return Err(EngineError::AlreadyRunning { job_id: running_id });
    };

    ctx.db.upsert_wallet(&payload.wallet_address).await?;

    let target = if payload.fetch_all {
        ctx.config.deep.target_signature_count
    } else {
        ctx.config.working.target_signature_count
    };

    let since = if payload.force_refresh {
        None
    } else {
        Some(chrono::Utc::now() - chrono::Duration::days(30))
    };

    // `fetchOlder` asks for backward pagination only, leaving recently
    // synced signatures untouched.
    let result = if payload.fetch_older {
        ctx.smart_fetch
            .run_older_only(&payload.wallet_address, target, &ctx.db)
            .await
    } else {
        ctx.smart_fetch
            .run(&payload.wallet_address, target, since, &ctx.db)
            .await
    };

    let _ = ctx.lock.release(handle).await;

    let summary = result?;
    serde_json::to_value(summary).map_err(|e| EngineError::Internal(e.to_string()))
}
