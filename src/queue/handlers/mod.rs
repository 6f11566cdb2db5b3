pub mod analyze_wallet;
pub mod enrich_tokens;
pub mod similarity;
pub mod sync_wallet;

use std::time::Duration;

use crate::core::config::Config;
use crate::queue::job::{Job, QueueName};
use crate::storage::models::Scope;

/// Per-job-kind time budget a worker enforces via cancellation.
pub fn timeout_for(queue: QueueName, job: &Job, config: &Config) -> Duration {
    match queue {
        QueueName::SimilarityOperations => config.similarity_timeout,
        QueueName::AnalysisOperations => job
            .scope
            .as_deref()
            .and_then(|s| s.parse::<Scope>().ok())
            .map(|scope| config.scope(scope).timeout)
            .unwrap_or(Duration::from_secs(5 * 60)),
        _ => Duration::from_secs(5 * 60),
    }
}
