use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletClassification {
    Unknown,
    Normal,
    HighFrequency,
    Restricted,
}

impl fmt::Display for WalletClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WalletClassification::Unknown => "unknown",
            WalletClassification::Normal => "normal",
            WalletClassification::HighFrequency => "high_frequency",
            WalletClassification::Restricted => "restricted",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for WalletClassification {
    type Err = crate::core::errors::EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "normal" => Ok(Self::Normal),
            "high_frequency" => Ok(Self::HighFrequency),
            "restricted" => Ok(Self::Restricted),
            other => Err(crate::core::errors::EngineError::Internal(format!(
                "unknown wallet classification: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub address: String,
    pub classification: WalletClassification,
    pub last_analyzed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A scope bundles a history window and a signature target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Flash,
    Working,
    Deep,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Scope::Flash => "flash",
            Scope::Working => "working",
            Scope::Deep => "deep",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Scope {
    type Err = crate::core::errors::EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flash" => Ok(Self::Flash),
            "working" => Ok(Self::Working),
            "deep" => Ok(Self::Deep),
            other => Err(crate::core::errors::EngineError::InvalidInput(format!(
                "unknown analysis scope: {other}"
            ))),
        }
    }
}

/// One row cached per transaction signature, shared across every wallet
/// that appears in it. Insertion is idempotent on `signature`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransactionCacheEntry {
    pub signature: String,
    pub slot: i64,
    pub block_time: Option<i64>,
    pub parsed_detail: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapDirection {
    In,
    Out,
}

impl fmt::Display for SwapDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", if *self == SwapDirection::In { "in" } else { "out" })
    }
}

impl std::str::FromStr for SwapDirection {
    type Err = crate::core::errors::EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(Self::In),
            "out" => Ok(Self::Out),
            other => Err(crate::core::errors::EngineError::Internal(format!(
                "unknown swap direction: {other}"
            ))),
        }
    }
}

/// One row per (walletAddress, signature, direction, mint); unique on that tuple.
/// Derived by the transaction mapper; never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapAnalysisInput {
    pub wallet_address: String,
    pub signature: String,
    pub direction: SwapDirection,
    pub mint: String,
    pub sol_value: f64,
    pub token_amount: f64,
    pub fee_lamports: i64,
    pub interaction_type: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunState {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Running => "RUNNING",
            RunState::Completed => "COMPLETED",
            RunState::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunState {
    type Err = crate::core::errors::EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(crate::core::errors::EngineError::Internal(format!(
                "unknown run state: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub id: Uuid,
    pub wallet_address: String,
    pub scope: Scope,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub input_record_count: i32,
}

/// Per (wallet, tokenMint) P&L row, upserted per run. Replaced, not versioned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub wallet_address: String,
    pub scope: Scope,
    pub token_mint: String,
    pub realized_pnl_sol: f64,
    pub total_bought: f64,
    pub total_sold: f64,
    pub trade_count: i32,
    pub win_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletPnlSummary {
    pub wallet_address: String,
    pub scope: Scope,
    pub total_realized_pnl_sol: f64,
    pub total_trades: i32,
    pub win_rate: f64,
    pub best_token: Option<String>,
    pub worst_token: Option<String>,
    pub last_analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletBehaviorProfile {
    pub wallet_address: String,
    pub scope: Scope,
    pub behavior_tags: Vec<String>,
    pub avg_hold_time_secs: f64,
    pub flip_rate: f64,
    pub updated_at: DateTime<Utc>,
}
