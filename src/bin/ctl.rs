/// Operational CLI — enqueues jobs and inspects queue/job state directly
/// against the store, for operators who don't want to go through the REST
/// control plane. Exit codes: 0 success, 1 unhandled error, 2 invalid input.
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use wallet_analysis_engine::core::config::Config;
use wallet_analysis_engine::core::ids::validate_wallet_address;
use wallet_analysis_engine::queue::job::QueueName;
use wallet_analysis_engine::queue::QueueHandle;
use wallet_analysis_engine::redis_conn;
use wallet_analysis_engine::storage::models::Scope;
use wallet_analysis_engine::storage::DatabaseManager;

#[derive(Parser)]
#[command(name = "wallet-analysis-ctl", about = "Wallet analysis engine operational CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enqueue a `sync-wallet` job outside the dashboard ladder.
    SyncWallet {
        wallet_address: String,
        #[arg(long)]
        force_refresh: bool,
        #[arg(long)]
        fetch_older: bool,
        #[arg(long)]
        fetch_all: bool,
    },
    /// Enqueue a generic `analyze-wallet` job for one scope.
    AnalyzeWallet {
        wallet_address: String,
        scope: Scope,
        #[arg(long)]
        force_refresh: bool,
    },
    /// Print the current row for a job id.
    JobStatus { job_id: Uuid },
    /// Print `{waiting, active, completed, failed, delayed, paused}` for a queue.
    QueueStats { queue_name: QueueName },
    /// Reclaim `RUNNING` analysis runs older than the configured threshold as `FAILED`.
    ReclaimStaleRuns,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::from(0),
        Err(CliError::InvalidInput(msg)) => {
            eprintln!("invalid input: {msg}");
            ExitCode::from(2)
        }
        Err(CliError::Other(msg)) => {
            eprintln!("error: {msg}");
            ExitCode::from(1)
        }
    }
}

enum CliError {
    InvalidInput(String),
    Other(String),
}

impl From<wallet_analysis_engine::core::errors::EngineError> for CliError {
    fn from(e: wallet_analysis_engine::core::errors::EngineError) -> Self {
        match e {
            wallet_analysis_engine::core::errors::EngineError::InvalidInput(m) => {
                CliError::InvalidInput(m)
            }
            other => CliError::Other(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for CliError {
    fn from(e: anyhow::Error) -> Self {
        CliError::Other(e.to_string())
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = Arc::new(Config::from_env());
    let db = Arc::new(
        DatabaseManager::new(&config.database_url)
            .await
            .map_err(CliError::from)?,
    );
    let redis = redis_conn::connect(&config.redis_url)
        .await
        .map_err(CliError::from)?;
    let queue = QueueHandle::new(Arc::clone(&db), redis);

    match cli.command {
        Command::SyncWallet {
            wallet_address,
            force_refresh,
            fetch_older,
            fetch_all,
        } => {
            validate_wallet_address(&wallet_address).map_err(CliError::from)?;
            let payload = serde_json::json!({
                "wallet_address": wallet_address,
                "force_refresh": force_refresh,
                "fetch_older": fetch_older,
                "fetch_all": fetch_all,
            });
            let job = queue
                .enqueue(
                    QueueName::WalletOperations,
                    "sync-wallet",
                    payload,
                    Some(&wallet_address),
                    None,
                    config.retry_max_attempts as i32,
                )
                .await
                .map_err(CliError::from)?;
            print_json(&job);
        }
        Command::AnalyzeWallet {
            wallet_address,
            scope,
            force_refresh,
        } => {
            validate_wallet_address(&wallet_address).map_err(CliError::from)?;
            let payload = serde_json::json!({
                "walletAddress": wallet_address,
                "analysisScope": scope,
                "forceRefresh": force_refresh,
                "queueWorkingAfter": false,
                "queueDeepAfter": false,
                "enrichMetadata": false,
            });
            let job = queue
                .enqueue(
                    QueueName::AnalysisOperations,
                    "analyze-wallet",
                    payload,
                    Some(&wallet_address),
                    Some(&scope.to_string()),
                    config.retry_max_attempts as i32,
                )
                .await
                .map_err(CliError::from)?;
            print_json(&job);
        }
        Command::JobStatus { job_id } => {
            let job = queue.get_job(job_id).await.map_err(CliError::from)?;
            match job {
                Some(job) => print_json(&job),
                None => return Err(CliError::InvalidInput(format!("no such job: {job_id}"))),
            }
        }
        Command::QueueStats { queue_name } => {
            let stats = queue.queue_stats(queue_name).await.map_err(CliError::from)?;
            print_json(&stats);
        }
        Command::ReclaimStaleRuns => {
            let n = db
                .reclaim_stale_running_runs(config.stale_run_reclaim_after.as_secs() as i64)
                .await
                .map_err(CliError::from)?;
            print_json(&serde_json::json!({ "reclaimed": n }));
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to serialize output: {e}"),
    }
}
