/// `enrichment-operations.enrich-tokens` — fetches token metadata/prices for
/// the mints a just-completed analysis touched. Independent lifecycle: a
/// failure here never rolls back the analysis that triggered it.
use serde::Deserialize;

use crate::core::errors::{EngineError, EngineResult};
use crate::queue::job::Job;
use crate::queue::worker::WorkerContext;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    wallet_address: String,
    mints: Vec<String>,
}

pub async fn run(ctx: &WorkerContext, job: &Job) -> EngineResult<serde_json::Value> {
    let payload: Payload = serde_json::from_value(job.payload.clone())
        .map_err(|e| EngineError::InvalidInput(format!("bad enrich-tokens payload: {e}")))?;

    let metadata = ctx.fetcher.fetch_token_metadata(&payload.mints).await?;

    serde_json::to_value(serde_json::json!({
        "walletAddress": payload.wallet_address,
        "enrichedCount": metadata.len(),
        "tokens": metadata,
    }))
    .map_err(|e| EngineError::Internal(e.to_string()))
}
