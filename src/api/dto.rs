/// Request/response shapes for the job and wallet routes. The dashboard
/// endpoint reuses `scheduler::AnalysisRequest`/`ScheduleResponse` directly
/// since its wire shape and its job-payload shape are the same thing.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::queue::job::{Job, JobState, QueueName, QueueStats};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncJobRequest {
    pub wallet_address: String,
    #[serde(default)]
    pub force_refresh: bool,
    #[serde(default)]
    pub fetch_older: bool,
    #[serde(default)]
    pub fetch_all: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericAnalyzeRequest {
    pub wallet_address: String,
    pub analysis_scope: crate::storage::models::Scope,
    #[serde(default)]
    pub force_refresh: bool,
    pub history_window_days: Option<u32>,
    pub target_signature_count: Option<u32>,
    #[serde(default)]
    pub enrich_metadata: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityJobRequest {
    pub wallet_addresses: Vec<String>,
    pub vector_type: Option<String>,
    pub failure_threshold: Option<f64>,
    pub timeout_minutes: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub id: Uuid,
    pub name: String,
    pub queue: QueueName,
    pub status: JobState,
    pub progress: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub processed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            name: job.kind,
            queue: job.queue,
            status: job.state,
            progress: job.progress,
            created_at: job.created_at,
            processed_at: job.processed_at,
            finished_at: job.finished_at,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            result: job.result,
            error: job.error,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressResponse {
    pub id: Uuid,
    pub status: JobState,
    pub progress: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatsResponse {
    pub waiting: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
    pub delayed: i64,
    pub paused: i64,
}

impl From<QueueStats> for QueueStatsResponse {
    fn from(s: QueueStats) -> Self {
        Self {
            waiting: s.waiting,
            active: s.active,
            completed: s.completed,
            failed: s.failed,
            delayed: s.delayed,
            paused: s.paused,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_scope")]
    pub scope: crate::storage::models::Scope,
}

fn default_limit() -> i64 {
    50
}

fn default_scope() -> crate::storage::models::Scope {
    crate::storage::models::Scope::Working
}
