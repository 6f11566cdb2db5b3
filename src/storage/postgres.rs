/// PostgreSQL-backed Persistence Store.
///
/// Owns raw transaction cache, swap analysis inputs, analysis runs/results,
/// wallet aggregate snapshots, and job records. Bulk paths prefer
/// set-based writes (`UNNEST` + `ON CONFLICT DO NOTHING`) over per-row
/// round trips, per the source's ≈150-rows/batch measurements.
use chrono::{DateTime, Utc};
use deadpool_postgres::{GenericClient, Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;
use uuid::Uuid;

use crate::core::errors::{EngineError, EngineResult};
use crate::metrics::{DB_QUERIES, DB_QUERY_DURATION};
use crate::queue::job::{Job, JobState, QueueName, QueueStats};
use crate::storage::models::{
    AnalysisResult, AnalysisRun, RawTransactionCacheEntry, RunState, Scope, SwapAnalysisInput,
    SwapDirection, Wallet, WalletBehaviorProfile, WalletClassification, WalletPnlSummary,
};

pub struct DatabaseManager {
    pool: Pool,
}

fn timed(operation: &str) -> crate::metrics::Timer {
    DB_QUERIES.with_label_values(&[operation]).inc();
    crate::metrics::Timer::new()
}

fn observe(operation: &str, timer: crate::metrics::Timer) {
    DB_QUERY_DURATION
        .with_label_values(&[operation])
        .observe(timer.elapsed_secs());
}

impl DatabaseManager {
    pub async fn new(database_url: &str) -> EngineResult<Self> {
        let pg_config: tokio_postgres::Config = database_url
            .parse()
            .map_err(|e| EngineError::Database(format!("invalid DATABASE_URL: {e}")))?;

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let manager = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(manager)
            .max_size(16)
            .build()
            .map_err(|e| EngineError::Database(format!("failed to build pool: {e}")))?;

        Ok(Self { pool })
    }

    pub async fn init_schema(&self) -> EngineResult<()> {
        let client = self.pool.get().await?;

        client
            .batch_execute(
                "
                CREATE TABLE IF NOT EXISTS wallets (
                    address TEXT PRIMARY KEY,
                    classification TEXT NOT NULL DEFAULT 'unknown',
                    last_analyzed_at TIMESTAMPTZ,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE TABLE IF NOT EXISTS raw_transaction_cache (
                    signature TEXT PRIMARY KEY,
                    slot BIGINT NOT NULL,
                    block_time BIGINT,
                    parsed_detail JSONB NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );
                CREATE INDEX IF NOT EXISTS idx_raw_tx_block_time
                    ON raw_transaction_cache(block_time);

                CREATE TABLE IF NOT EXISTS swap_analysis_inputs (
                    wallet_address TEXT NOT NULL,
                    signature TEXT NOT NULL,
                    direction TEXT NOT NULL,
                    mint TEXT NOT NULL,
                    sol_value DOUBLE PRECISION NOT NULL,
                    token_amount DOUBLE PRECISION NOT NULL,
                    fee_lamports BIGINT NOT NULL,
                    interaction_type TEXT NOT NULL,
                    tx_timestamp TIMESTAMPTZ NOT NULL,
                    PRIMARY KEY (wallet_address, signature, direction, mint)
                );
                CREATE INDEX IF NOT EXISTS idx_swap_inputs_wallet_time
                    ON swap_analysis_inputs(wallet_address, tx_timestamp DESC);

                CREATE TABLE IF NOT EXISTS analysis_runs (
                    id UUID PRIMARY KEY,
                    wallet_address TEXT NOT NULL,
                    scope TEXT NOT NULL,
                    state TEXT NOT NULL,
                    started_at TIMESTAMPTZ NOT NULL,
                    finished_at TIMESTAMPTZ,
                    input_record_count INTEGER NOT NULL DEFAULT 0
                );
                CREATE INDEX IF NOT EXISTS idx_analysis_runs_wallet_scope
                    ON analysis_runs(wallet_address, scope, started_at DESC);

                CREATE TABLE IF NOT EXISTS analysis_results (
                    wallet_address TEXT NOT NULL,
                    scope TEXT NOT NULL,
                    token_mint TEXT NOT NULL,
                    realized_pnl_sol DOUBLE PRECISION NOT NULL,
                    total_bought DOUBLE PRECISION NOT NULL,
                    total_sold DOUBLE PRECISION NOT NULL,
                    trade_count INTEGER NOT NULL,
                    win_rate DOUBLE PRECISION NOT NULL,
                    PRIMARY KEY (wallet_address, scope, token_mint)
                );

                CREATE TABLE IF NOT EXISTS wallet_pnl_summary (
                    wallet_address TEXT NOT NULL,
                    scope TEXT NOT NULL,
                    total_realized_pnl_sol DOUBLE PRECISION NOT NULL,
                    total_trades INTEGER NOT NULL,
                    win_rate DOUBLE PRECISION NOT NULL,
                    best_token TEXT,
                    worst_token TEXT,
                    last_analyzed_at TIMESTAMPTZ NOT NULL,
                    PRIMARY KEY (wallet_address, scope)
                );

                CREATE TABLE IF NOT EXISTS wallet_behavior_profile (
                    wallet_address TEXT NOT NULL,
                    scope TEXT NOT NULL,
                    behavior_tags JSONB NOT NULL,
                    avg_hold_time_secs DOUBLE PRECISION NOT NULL,
                    flip_rate DOUBLE PRECISION NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL,
                    PRIMARY KEY (wallet_address, scope)
                );

                CREATE TABLE IF NOT EXISTS jobs (
                    id UUID PRIMARY KEY,
                    queue TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    payload JSONB NOT NULL,
                    wallet_address TEXT,
                    scope TEXT,
                    attempts INTEGER NOT NULL DEFAULT 0,
                    max_attempts INTEGER NOT NULL,
                    state TEXT NOT NULL,
                    progress INTEGER NOT NULL DEFAULT 0,
                    result JSONB,
                    error TEXT,
                    run_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    processed_at TIMESTAMPTZ,
                    finished_at TIMESTAMPTZ
                );
                CREATE INDEX IF NOT EXISTS idx_jobs_queue_state ON jobs(queue, state);
                CREATE INDEX IF NOT EXISTS idx_jobs_wallet_kind_state
                    ON jobs(wallet_address, kind, state);
                CREATE INDEX IF NOT EXISTS idx_jobs_wallet_scope_state
                    ON jobs(wallet_address, scope, state);
                ",
            )
            .await
            .map_err(|e| EngineError::Database(format!("schema init failed: {e}")))?;

        Ok(())
    }

    // ---- Wallets ----

    pub async fn upsert_wallet(&self, address: &str) -> EngineResult<()> {
        let t = timed("upsert_wallet");
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO wallets (address) VALUES ($1)
                 ON CONFLICT (address) DO NOTHING",
                &[&address],
            )
            .await?;
        observe("upsert_wallet", t);
        Ok(())
    }

    pub async fn get_wallet(&self, address: &str) -> EngineResult<Option<Wallet>> {
        let t = timed("get_wallet");
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT address, classification, last_analyzed_at, created_at
                 FROM wallets WHERE address = $1",
                &[&address],
            )
            .await?;
        observe("get_wallet", t);
        Ok(row.map(|r| Wallet {
            address: r.get(0),
            classification: r
                .get::<_, String>(1)
                .parse()
                .unwrap_or(WalletClassification::Unknown),
            last_analyzed_at: r.get(2),
            created_at: r.get(3),
        }))
    }

    pub async fn set_wallet_classification(
        &self,
        address: &str,
        classification: WalletClassification,
    ) -> EngineResult<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE wallets SET classification = $2 WHERE address = $1",
                &[&address, &classification.to_string()],
            )
            .await?;
        Ok(())
    }

    pub async fn is_restricted(&self, address: &str) -> EngineResult<bool> {
        Ok(matches!(
            self.get_wallet(address).await?.map(|w| w.classification),
            Some(WalletClassification::Restricted)
        ))
    }

    // ---- Raw transaction cache ----

    /// Insert-if-absent in a single batched statement. Returns rows actually inserted.
    pub async fn insert_transactions_if_absent(
        &self,
        batch: &[RawTransactionCacheEntry],
    ) -> EngineResult<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        let t = timed("insert_transactions_if_absent");
        let client = self.pool.get().await?;

        let signatures: Vec<&str> = batch.iter().map(|e| e.signature.as_str()).collect();
        let slots: Vec<i64> = batch.iter().map(|e| e.slot).collect();
        let block_times: Vec<Option<i64>> = batch.iter().map(|e| e.block_time).collect();
        let parsed: Vec<String> = batch
            .iter()
            .map(|e| e.parsed_detail.to_string())
            .collect();

        let rows = client
            .execute(
                "INSERT INTO raw_transaction_cache (signature, slot, block_time, parsed_detail)
                 SELECT * FROM UNNEST($1::text[], $2::bigint[], $3::bigint[], $4::text[])
                    AS t(signature, slot, block_time, parsed_detail_text)
                 CROSS JOIN LATERAL (SELECT parsed_detail_text::jsonb AS parsed_detail) AS j
                 ON CONFLICT (signature) DO NOTHING",
                &[&signatures, &slots, &block_times, &parsed],
            )
            .await?;
        observe("insert_transactions_if_absent", t);
        Ok(rows)
    }

    pub async fn get_cached_signatures(
        &self,
        signatures: &[String],
    ) -> EngineResult<Vec<RawTransactionCacheEntry>> {
        if signatures.is_empty() {
            return Ok(vec![]);
        }
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT signature, slot, block_time, parsed_detail
                 FROM raw_transaction_cache WHERE signature = ANY($1)",
                &[&signatures],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| RawTransactionCacheEntry {
                signature: r.get(0),
                slot: r.get(1),
                block_time: r.get(2),
                parsed_detail: r.get(3),
            })
            .collect())
    }

    // ---- Swap analysis inputs ----

    pub async fn insert_swap_inputs_if_absent(
        &self,
        batch: &[SwapAnalysisInput],
    ) -> EngineResult<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        let t = timed("insert_swap_inputs_if_absent");
        let client = self.pool.get().await?;

        let wallets: Vec<&str> = batch.iter().map(|s| s.wallet_address.as_str()).collect();
        let sigs: Vec<&str> = batch.iter().map(|s| s.signature.as_str()).collect();
        let dirs: Vec<String> = batch.iter().map(|s| s.direction.to_string()).collect();
        let mints: Vec<&str> = batch.iter().map(|s| s.mint.as_str()).collect();
        let sol_values: Vec<f64> = batch.iter().map(|s| s.sol_value).collect();
        let token_amounts: Vec<f64> = batch.iter().map(|s| s.token_amount).collect();
        let fees: Vec<i64> = batch.iter().map(|s| s.fee_lamports).collect();
        let interaction_types: Vec<&str> =
            batch.iter().map(|s| s.interaction_type.as_str()).collect();
        let timestamps: Vec<DateTime<Utc>> = batch.iter().map(|s| s.timestamp).collect();

        let rows = client
            .execute(
                "INSERT INTO swap_analysis_inputs
                    (wallet_address, signature, direction, mint, sol_value, token_amount,
                     fee_lamports, interaction_type, tx_timestamp)
                 SELECT * FROM UNNEST(
                    $1::text[], $2::text[], $3::text[], $4::text[], $5::float8[],
                    $6::float8[], $7::bigint[], $8::text[], $9::timestamptz[])
                 ON CONFLICT (wallet_address, signature, direction, mint) DO NOTHING",
                &[
                    &wallets,
                    &sigs,
                    &dirs,
                    &mints,
                    &sol_values,
                    &token_amounts,
                    &fees,
                    &interaction_types,
                    &timestamps,
                ],
            )
            .await?;
        observe("insert_swap_inputs_if_absent", t);
        Ok(rows)
    }

    pub async fn get_swap_inputs(
        &self,
        wallet: &str,
        since: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<SwapAnalysisInput>> {
        let client = self.pool.get().await?;
        let rows = if let Some(since) = since {
            client
                .query(
                    "SELECT wallet_address, signature, direction, mint, sol_value, token_amount,
                            fee_lamports, interaction_type, tx_timestamp
                     FROM swap_analysis_inputs
                     WHERE wallet_address = $1 AND tx_timestamp >= $2
                     ORDER BY tx_timestamp ASC",
                    &[&wallet, &since],
                )
                .await?
        } else {
            client
                .query(
                    "SELECT wallet_address, signature, direction, mint, sol_value, token_amount,
                            fee_lamports, interaction_type, tx_timestamp
                     FROM swap_analysis_inputs
                     WHERE wallet_address = $1
                     ORDER BY tx_timestamp ASC",
                    &[&wallet],
                )
                .await?
        };

        Ok(rows
            .into_iter()
            .map(|r| SwapAnalysisInput {
                wallet_address: r.get(0),
                signature: r.get(1),
                direction: r.get::<_, String>(2).parse().unwrap_or(SwapDirection::In),
                mint: r.get(3),
                sol_value: r.get(4),
                token_amount: r.get(5),
                fee_lamports: r.get(6),
                interaction_type: r.get(7),
                timestamp: r.get(8),
            })
            .collect())
    }

    /// Distinct signature count for a wallet — what Smart-Fetch compares against
    /// `effectiveTarget` to decide whether to keep paginating.
    pub async fn count_wallet_signatures(&self, wallet: &str) -> EngineResult<i64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT COUNT(DISTINCT signature) FROM swap_analysis_inputs WHERE wallet_address = $1",
                &[&wallet],
            )
            .await?;
        Ok(row.get(0))
    }

    /// (newest, oldest) timestamps stored for the wallet, used to bound the
    /// Smart-Fetch Controller's forward/backward pagination phases.
    pub async fn signature_time_bounds(
        &self,
        wallet: &str,
    ) -> EngineResult<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT MAX(tx_timestamp), MIN(tx_timestamp)
                 FROM swap_analysis_inputs WHERE wallet_address = $1",
                &[&wallet],
            )
            .await?;
        Ok(row.and_then(|r| {
            let newest: Option<DateTime<Utc>> = r.get(0);
            let oldest: Option<DateTime<Utc>> = r.get(1);
            newest.zip(oldest)
        }))
    }

    pub async fn observed_density_tx_per_day(&self, wallet: &str) -> EngineResult<f64> {
        match self.signature_time_bounds(wallet).await? {
            Some((newest, oldest)) => {
                let count = self.count_wallet_signatures(wallet).await?;
                let span_days = (newest - oldest).num_seconds() as f64 / 86_400.0;
                Ok(if span_days < 1.0 {
                    count as f64
                } else {
                    count as f64 / span_days
                })
            }
            None => Ok(0.0),
        }
    }

    // ---- Analysis runs / results (atomic per wallet) ----

    pub async fn start_analysis_run(&self, wallet: &str, scope: Scope) -> EngineResult<Uuid> {
        let client = self.pool.get().await?;
        let id = Uuid::new_v4();
        client
            .execute(
                "INSERT INTO analysis_runs (id, wallet_address, scope, state, started_at, input_record_count)
                 VALUES ($1, $2, $3, 'RUNNING', NOW(), 0)",
                &[&id, &wallet, &scope.to_string()],
            )
            .await?;
        Ok(id)
    }

    /// Commits run completion, result replacement, and summary upsert atomically
    /// so a crash mid-persist never leaves a RUNNING run with partial results.
    pub async fn complete_analysis_run(
        &self,
        run_id: Uuid,
        wallet: &str,
        scope: Scope,
        input_record_count: i32,
        results: &[AnalysisResult],
        summary: &WalletPnlSummary,
        behavior: &WalletBehaviorProfile,
    ) -> EngineResult<()> {
        let mut client = self.pool.get().await?;
        let txn = client.transaction().await?;

        txn.execute(
            "UPDATE analysis_runs SET state = 'COMPLETED', finished_at = NOW(), input_record_count = $2
             WHERE id = $1",
            &[&run_id, &input_record_count],
        )
        .await?;

        txn.execute(
            "DELETE FROM analysis_results WHERE wallet_address = $1 AND scope = $2",
            &[&wallet, &scope.to_string()],
        )
        .await?;

        for r in results {
            txn.execute(
                "INSERT INTO analysis_results
                    (wallet_address, scope, token_mint, realized_pnl_sol, total_bought,
                     total_sold, trade_count, win_rate)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                &[
                    &r.wallet_address,
                    &scope.to_string(),
                    &r.token_mint,
                    &r.realized_pnl_sol,
                    &r.total_bought,
                    &r.total_sold,
                    &r.trade_count,
                    &r.win_rate,
                ],
            )
            .await?;
        }

        txn.execute(
            "INSERT INTO wallet_pnl_summary
                (wallet_address, scope, total_realized_pnl_sol, total_trades, win_rate,
                 best_token, worst_token, last_analyzed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (wallet_address, scope) DO UPDATE SET
                total_realized_pnl_sol = EXCLUDED.total_realized_pnl_sol,
                total_trades = EXCLUDED.total_trades,
                win_rate = EXCLUDED.win_rate,
                best_token = EXCLUDED.best_token,
                worst_token = EXCLUDED.worst_token,
                last_analyzed_at = EXCLUDED.last_analyzed_at",
            &[
                &summary.wallet_address,
                &scope.to_string(),
                &summary.total_realized_pnl_sol,
                &summary.total_trades,
                &summary.win_rate,
                &summary.best_token,
                &summary.worst_token,
                &summary.last_analyzed_at,
            ],
        )
        .await?;

        txn.execute(
            "INSERT INTO wallet_behavior_profile
                (wallet_address, scope, behavior_tags, avg_hold_time_secs, flip_rate, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (wallet_address, scope) DO UPDATE SET
                behavior_tags = EXCLUDED.behavior_tags,
                avg_hold_time_secs = EXCLUDED.avg_hold_time_secs,
                flip_rate = EXCLUDED.flip_rate,
                updated_at = EXCLUDED.updated_at",
            &[
                &behavior.wallet_address,
                &scope.to_string(),
                &serde_json::to_value(&behavior.behavior_tags)?,
                &behavior.avg_hold_time_secs,
                &behavior.flip_rate,
                &behavior.updated_at,
            ],
        )
        .await?;

        txn.execute(
            "UPDATE wallets SET last_analyzed_at = $2 WHERE address = $1",
            &[wallet, &summary.last_analyzed_at],
        )
        .await?;

        txn.commit().await?;
        Ok(())
    }

    pub async fn fail_analysis_run(&self, run_id: Uuid) -> EngineResult<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE analysis_runs SET state = 'FAILED', finished_at = NOW() WHERE id = $1",
                &[&run_id],
            )
            .await?;
        Ok(())
    }

    pub async fn latest_successful_run(
        &self,
        wallet: &str,
        scope: Scope,
    ) -> EngineResult<Option<AnalysisRun>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, wallet_address, scope, state, started_at, finished_at, input_record_count
                 FROM analysis_runs
                 WHERE wallet_address = $1 AND scope = $2 AND state = 'COMPLETED'
                 ORDER BY finished_at DESC LIMIT 1",
                &[&wallet, &scope.to_string()],
            )
            .await?;
        Ok(row.map(row_to_run))
    }

    /// Maintenance: reclaim runs stuck in RUNNING past the threshold.
    pub async fn reclaim_stale_running_runs(
        &self,
        older_than_secs: i64,
    ) -> EngineResult<u64> {
        let client = self.pool.get().await?;
        let rows = client
            .execute(
                "UPDATE analysis_runs SET state = 'FAILED', finished_at = NOW()
                 WHERE state = 'RUNNING' AND started_at < NOW() - ($1 || ' seconds')::interval",
                &[&older_than_secs.to_string()],
            )
            .await?;
        Ok(rows)
    }

    pub async fn get_pnl_summary(
        &self,
        wallet: &str,
        scope: Scope,
    ) -> EngineResult<Option<WalletPnlSummary>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT wallet_address, scope, total_realized_pnl_sol, total_trades, win_rate,
                        best_token, worst_token, last_analyzed_at
                 FROM wallet_pnl_summary WHERE wallet_address = $1 AND scope = $2",
                &[&wallet, &scope.to_string()],
            )
            .await?;
        Ok(row.map(|r| WalletPnlSummary {
            wallet_address: r.get(0),
            scope: r.get::<_, String>(1).parse().unwrap_or(Scope::Flash),
            total_realized_pnl_sol: r.get(2),
            total_trades: r.get(3),
            win_rate: r.get(4),
            best_token: r.get(5),
            worst_token: r.get(6),
            last_analyzed_at: r.get(7),
        }))
    }

    pub async fn get_analysis_results(
        &self,
        wallet: &str,
        scope: Scope,
        limit: i64,
        offset: i64,
    ) -> EngineResult<Vec<AnalysisResult>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT wallet_address, scope, token_mint, realized_pnl_sol, total_bought,
                        total_sold, trade_count, win_rate
                 FROM analysis_results
                 WHERE wallet_address = $1 AND scope = $2
                 ORDER BY realized_pnl_sol DESC
                 LIMIT $3 OFFSET $4",
                &[&wallet, &scope.to_string(), &limit, &offset],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| AnalysisResult {
                wallet_address: r.get(0),
                scope: r.get::<_, String>(1).parse().unwrap_or(Scope::Flash),
                token_mint: r.get(2),
                realized_pnl_sol: r.get(3),
                total_bought: r.get(4),
                total_sold: r.get(5),
                trade_count: r.get(6),
                win_rate: r.get(7),
            })
            .collect())
    }

    pub async fn health_check(&self) -> EngineResult<bool> {
        let client = self.pool.get().await?;
        let row = client.query_one("SELECT 1", &[]).await?;
        Ok(row.get::<_, i32>(0) == 1)
    }

    // ---- Jobs ----

    #[allow(clippy::too_many_arguments)]
    pub async fn enqueue_job(
        &self,
        queue: QueueName,
        kind: &str,
        payload: serde_json::Value,
        wallet_address: Option<&str>,
        scope: Option<&str>,
        max_attempts: i32,
        run_at: DateTime<Utc>,
    ) -> EngineResult<Job> {
        let client = self.pool.get().await?;
        let id = Uuid::new_v4();
        let row = client
            .query_one(
                "INSERT INTO jobs (id, queue, kind, payload, wallet_address, scope, attempts,
                                   max_attempts, state, progress, run_at, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, 0, $7, 'waiting', 0, $8, NOW())
                 RETURNING id, queue, kind, payload, wallet_address, scope, attempts, max_attempts,
                           state, progress, result, error, run_at, created_at, processed_at, finished_at",
                &[
                    &id,
                    &queue.as_str(),
                    &kind,
                    &payload,
                    &wallet_address,
                    &scope,
                    &max_attempts,
                    &run_at,
                ],
            )
            .await?;
        Ok(row_to_job(row))
    }

    /// Whether a (wallet, kind) job is already queued or active — backs the
    /// scheduler's concurrency gate and `sync-wallet`'s idle-dedup check.
    pub async fn has_active_job(
        &self,
        wallet_address: &str,
        kind: &str,
        scope: Option<&str>,
    ) -> EngineResult<Option<Job>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, queue, kind, payload, wallet_address, scope, attempts, max_attempts,
                        state, progress, result, error, run_at, created_at, processed_at, finished_at
                 FROM jobs
                 WHERE wallet_address = $1 AND kind = $2
                   AND ($3::text IS NULL OR scope = $3)
                   AND state IN ('waiting', 'active', 'delayed')
                 ORDER BY created_at DESC LIMIT 1",
                &[&wallet_address, &kind, &scope],
            )
            .await?;
        Ok(row.map(row_to_job))
    }

    /// Atomically claims the oldest due job on a queue for exclusive processing.
    pub async fn claim_next_job(&self, queue: QueueName) -> EngineResult<Option<Job>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "UPDATE jobs SET state = 'active', processed_at = NOW()
                 WHERE id = (
                    SELECT id FROM jobs
                    WHERE queue = $1 AND state IN ('waiting', 'delayed') AND run_at <= NOW()
                    ORDER BY run_at ASC
                    FOR UPDATE SKIP LOCKED
                    LIMIT 1
                 )
                 RETURNING id, queue, kind, payload, wallet_address, scope, attempts, max_attempts,
                           state, progress, result, error, run_at, created_at, processed_at, finished_at",
                &[&queue.as_str()],
            )
            .await?;
        Ok(row.map(row_to_job))
    }

    pub async fn get_job(&self, id: Uuid) -> EngineResult<Option<Job>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, queue, kind, payload, wallet_address, scope, attempts, max_attempts,
                        state, progress, result, error, run_at, created_at, processed_at, finished_at
                 FROM jobs WHERE id = $1",
                &[&id],
            )
            .await?;
        Ok(row.map(row_to_job))
    }

    /// Progress must be monotonically non-decreasing within a run; callers
    /// enforce the bandwidth contract (no sub-5-point increments) upstream.
    pub async fn set_job_progress(&self, id: Uuid, progress: i32) -> EngineResult<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE jobs SET progress = $2 WHERE id = $1 AND progress < $2",
                &[&id, &progress],
            )
            .await?;
        Ok(())
    }

    pub async fn complete_job(&self, id: Uuid, result: serde_json::Value) -> EngineResult<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE jobs SET state = 'completed', progress = 100, result = $2, finished_at = NOW()
                 WHERE id = $1",
                &[&id, &result],
            )
            .await?;
        Ok(())
    }

    /// Increments attempts; reschedules as `delayed` with exponential backoff
    /// if attempts remain, otherwise moves the job to `failed`.
    pub async fn fail_or_retry_job(
        &self,
        id: Uuid,
        error: &str,
        base_backoff: std::time::Duration,
        max_backoff: std::time::Duration,
    ) -> EngineResult<JobState> {
        let mut client = self.pool.get().await?;
        let txn = client.transaction().await?;

        let row = txn
            .query_one(
                "UPDATE jobs SET attempts = attempts + 1, error = $2
                 WHERE id = $1
                 RETURNING attempts, max_attempts",
                &[&id, &error],
            )
            .await?;
        let attempts: i32 = row.get(0);
        let max_attempts: i32 = row.get(1);

        let next_state = if attempts < max_attempts {
            let backoff_secs = (base_backoff.as_secs() * 2u64.pow((attempts - 1).max(0) as u32))
                .min(max_backoff.as_secs());
            txn.execute(
                "UPDATE jobs SET state = 'delayed',
                    run_at = NOW() + ($2 || ' seconds')::interval
                 WHERE id = $1",
                &[&id, &backoff_secs.to_string()],
            )
            .await?;
            JobState::Delayed
        } else {
            txn.execute(
                "UPDATE jobs SET state = 'failed', finished_at = NOW() WHERE id = $1",
                &[&id],
            )
            .await?;
            JobState::Failed
        };

        txn.commit().await?;
        Ok(next_state)
    }

    /// Moves a job straight to `failed`, bypassing the retry loop entirely.
    /// Used for error classes that are never retried (bad input, timeout,
    /// restricted wallet, lookup misses, and exhausted internal errors).
    pub async fn fail_job(&self, id: Uuid, error: &str) -> EngineResult<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE jobs SET state = 'failed', error = $2, finished_at = NOW() WHERE id = $1",
                &[&id, &error],
            )
            .await?;
        Ok(())
    }

    /// Moves due `delayed` jobs back to `waiting` so workers pick them up;
    /// run periodically by the queue runtime's scheduler tick.
    pub async fn promote_delayed_jobs(&self, queue: QueueName) -> EngineResult<u64> {
        let client = self.pool.get().await?;
        let rows = client
            .execute(
                "UPDATE jobs SET state = 'waiting'
                 WHERE queue = $1 AND state = 'delayed' AND run_at <= NOW()",
                &[&queue.as_str()],
            )
            .await?;
        Ok(rows)
    }

    pub async fn queue_stats(&self, queue: QueueName) -> EngineResult<QueueStats> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT
                    COUNT(*) FILTER (WHERE state = 'waiting'),
                    COUNT(*) FILTER (WHERE state = 'active'),
                    COUNT(*) FILTER (WHERE state = 'completed'),
                    COUNT(*) FILTER (WHERE state = 'failed'),
                    COUNT(*) FILTER (WHERE state = 'delayed'),
                    COUNT(*) FILTER (WHERE state = 'paused')
                 FROM jobs WHERE queue = $1",
                &[&queue.as_str()],
            )
            .await?;
        Ok(QueueStats {
            waiting: row.get(0),
            active: row.get(1),
            completed: row.get(2),
            failed: row.get(3),
            delayed: row.get(4),
            paused: row.get(5),
        })
    }
}

fn row_to_job(r: tokio_postgres::Row) -> Job {
    Job {
        id: r.get(0),
        queue: r
            .get::<_, String>(1)
            .parse()
            .unwrap_or(QueueName::WalletOperations),
        kind: r.get(2),
        payload: r.get(3),
        wallet_address: r.get(4),
        scope: r.get(5),
        attempts: r.get(6),
        max_attempts: r.get(7),
        state: r.get::<_, String>(8).parse().unwrap_or(JobState::Failed),
        progress: r.get(9),
        result: r.get(10),
        error: r.get(11),
        run_at: r.get(12),
        created_at: r.get(13),
        processed_at: r.get(14),
        finished_at: r.get(15),
    }
}

fn row_to_run(r: tokio_postgres::Row) -> AnalysisRun {
    AnalysisRun {
        id: r.get(0),
        wallet_address: r.get(1),
        scope: r.get::<_, String>(2).parse().unwrap_or(Scope::Flash),
        state: r.get::<_, String>(3).parse().unwrap_or(RunState::Failed),
        started_at: r.get(4),
        finished_at: r.get(5),
        input_record_count: r.get(6),
    }
}
