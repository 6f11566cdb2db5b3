use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Delayed,
    Completed,
    Failed,
    Paused,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Delayed => "delayed",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Paused => "paused",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobState {
    type Err = crate::core::errors::EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "active" => Ok(Self::Active),
            "delayed" => Ok(Self::Delayed),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "paused" => Ok(Self::Paused),
            other => Err(crate::core::errors::EngineError::Internal(format!(
                "unknown job state: {other}"
            ))),
        }
    }
}

/// The four queues named in the worker runtime; each gets its own pool of
/// workers and concurrency cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueName {
    WalletOperations,
    AnalysisOperations,
    SimilarityOperations,
    EnrichmentOperations,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::WalletOperations => "wallet-operations",
            QueueName::AnalysisOperations => "analysis-operations",
            QueueName::SimilarityOperations => "similarity-operations",
            QueueName::EnrichmentOperations => "enrichment-operations",
        }
    }

    pub fn all() -> [QueueName; 4] {
        [
            QueueName::WalletOperations,
            QueueName::AnalysisOperations,
            QueueName::SimilarityOperations,
            QueueName::EnrichmentOperations,
        ]
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for QueueName {
    type Err = crate::core::errors::EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wallet-operations" => Ok(Self::WalletOperations),
            "analysis-operations" => Ok(Self::AnalysisOperations),
            "similarity-operations" => Ok(Self::SimilarityOperations),
            "enrichment-operations" => Ok(Self::EnrichmentOperations),
            other => Err(crate::core::errors::EngineError::InvalidInput(format!(
                "unknown queue: {other}"
            ))),
        }
    }
}

/// Row persisted in the `jobs` table; Postgres is the system of record,
/// Redis is only a low-latency wakeup signal layered on top of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub queue: QueueName,
    pub kind: String,
    pub payload: serde_json::Value,
    pub wallet_address: Option<String>,
    pub scope: Option<String>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub state: JobState,
    pub progress: i32,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
    pub delayed: i64,
    pub paused: i64,
}
