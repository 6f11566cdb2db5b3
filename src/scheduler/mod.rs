/// Dashboard Analysis Scheduler — the three-scope (`flash`/`working`/`deep`)
/// pipeline entry point. Owns the freshness gate, the concurrency gate, and
/// the enqueue onto `analysis-operations`; the worker-side execution lives
/// in `queue::handlers::analyze_wallet`.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::config::Config;
use crate::core::errors::{EngineError, EngineResult};
use crate::core::ids::validate_wallet_address;
use crate::metrics::{SCHEDULER_FOLLOWUPS_QUEUED, SCHEDULER_SKIPPED};
use crate::queue::job::QueueName;
use crate::queue::QueueHandle;
use crate::storage::models::{Scope, WalletClassification};
use crate::storage::DatabaseManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    Auto,
    Manual,
    System,
}

/// Request body for `POST /analyses/wallets/dashboard-analysis`, and the
/// payload shape persisted on the `analyze-wallet` job row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub wallet_address: String,
    pub analysis_scope: Scope,
    pub trigger_source: TriggerSource,
    #[serde(default)]
    pub force_refresh: bool,
    pub history_window_days: Option<u32>,
    pub target_signature_count: Option<u32>,
    #[serde(default)]
    pub queue_working_after: bool,
    #[serde(default)]
    pub queue_deep_after: bool,
    #[serde(default)]
    pub enrich_metadata: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResponse {
    pub job_id: Option<Uuid>,
    pub already_running: bool,
    pub skipped: bool,
    pub skip_reason: Option<String>,
    pub queued_follow_up_scopes: Vec<Scope>,
}

pub struct DashboardScheduler {
    db: std::sync::Arc<DatabaseManager>,
    queue: QueueHandle,
    config: std::sync::Arc<Config>,
}

impl DashboardScheduler {
    pub fn new(
        db: std::sync::Arc<DatabaseManager>,
        queue: QueueHandle,
        config: std::sync::Arc<Config>,
    ) -> Self {
        Self { db, queue, config }
    }

    /// Validates, applies the freshness and concurrency gates, and enqueues
    /// the analyze-wallet job, returning which follow-up scopes a client
    /// should render as queued placeholders.
    pub async fn schedule(&self, req: AnalysisRequest) -> EngineResult<ScheduleResponse> {
        // 1. Validation.
        validate_wallet_address(&req.wallet_address)?;

        if req.force_refresh && req.trigger_source != TriggerSource::Manual {
            return Err(EngineError::InvalidInput(
                "only a manual trigger may set forceRefresh".to_string(),
            ));
        }

        if let Some(wallet) = self.db.get_wallet(&req.wallet_address).await? {
            if wallet.classification == WalletClassification::Restricted {
                return Err(EngineError::Restricted(req.wallet_address.clone()));
            }
        }

        let scope = req.analysis_scope;
        let scope_config = self.config.scope(scope);
        let target = req
            .target_signature_count
            .unwrap_or(scope_config.target_signature_count);

        // 2. Freshness gate.
        if !req.force_refresh {
            if let Some(run) = self.db.latest_successful_run(&req.wallet_address, scope).await? {
                if let Some(finished_at) = run.finished_at {
                    let age = chrono::Utc::now() - finished_at;
                    let fresh_enough =
                        age.to_std().unwrap_or_default() < scope_config.freshness_window;
                    let store_count =
                        self.db.count_wallet_signatures(&req.wallet_address).await?;
                    if fresh_enough && store_count >= target as i64 {
                        SCHEDULER_SKIPPED.with_label_values(&[&scope.to_string()]).inc();
                        return Ok(ScheduleResponse {
                            job_id: None,
                            already_running: false,
                            skipped: true,
                            skip_reason: Some("recent-run-within-window".to_string()),
                            queued_follow_up_scopes: vec![],
                        });
                    }
                }
            }
        }

        // 3. Concurrency gate.
        if let Some(existing) = self
            .db
            .has_active_job(&req.wallet_address, "analyze-wallet", Some(&scope.to_string()))
            .await?
        {
            return Ok(ScheduleResponse {
                job_id: Some(existing.id),
                already_running: true,
                skipped: false,
                skip_reason: None,
                queued_follow_up_scopes: vec![],
            });
        }

        // 4. Enqueue.
        let payload = serde_json::to_value(&req)?;
        let job = self
            .queue
            .enqueue(
                QueueName::AnalysisOperations,
                "analyze-wallet",
                payload,
                Some(&req.wallet_address),
                Some(&scope.to_string()),
                self.config.retry_max_attempts as i32,
            )
            .await?;

        // 6. Follow-up scopes the client should render as queued placeholders;
        // the worker enqueues them for real once this scope's results land.
        let mut queued_follow_up_scopes = Vec::new();
        if req.queue_working_after && scope == Scope::Flash {
            queued_follow_up_scopes.push(Scope::Working);
        }
        if req.queue_deep_after && matches!(scope, Scope::Flash | Scope::Working) {
            queued_follow_up_scopes.push(Scope::Deep);
        }
        for s in &queued_follow_up_scopes {
            SCHEDULER_FOLLOWUPS_QUEUED.with_label_values(&[&s.to_string()]).inc();
        }

        Ok(ScheduleResponse {
            job_id: Some(job.id),
            already_running: false,
            skipped: false,
            skip_reason: None,
            queued_follow_up_scopes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_only_may_force_refresh() {
        let req = AnalysisRequest {
            wallet_address: "W".to_string(),
            analysis_scope: Scope::Flash,
            trigger_source: TriggerSource::Auto,
            force_refresh: true,
            history_window_days: None,
            target_signature_count: None,
            queue_working_after: false,
            queue_deep_after: false,
            enrich_metadata: false,
        };
        assert_eq!(req.trigger_source, TriggerSource::Auto);
        assert!(req.force_refresh);
    }
}
