use std::env;
use std::time::Duration;

/// Per-scope settings: history window, signature target, and freshness gate.
#[derive(Debug, Clone, Copy)]
pub struct ScopeConfig {
    pub window_days: Option<u32>,
    pub target_signature_count: u32,
    pub freshness_window: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub external_api_key: String,
    pub external_api_rps: u32,
    pub demo_wallets: Vec<String>,
    pub frontend_url: String,

    pub api_host: String,
    pub api_port: u16,

    /// Detail-fetch fan-out against the external provider (source measures 3).
    pub fetcher_detail_concurrency: usize,
    /// Hard ceiling on a single signatures page (excess is discarded).
    pub fetcher_page_limit: u32,
    pub fetcher_max_retries: usize,

    /// Wallets observed above this tx/day density are classified `high_frequency`.
    pub high_frequency_tx_per_day: f64,
    /// Effective target cap applied to `high_frequency` wallets.
    pub high_frequency_target_cap: u32,

    pub flash: ScopeConfig,
    pub working: ScopeConfig,
    pub deep: ScopeConfig,

    pub lock_ttl: Duration,
    pub similarity_timeout: Duration,

    pub queue_concurrency_wallet_operations: usize,
    pub queue_concurrency_analysis_operations: usize,
    pub queue_concurrency_similarity_operations: usize,
    pub queue_concurrency_enrichment_operations: usize,

    pub retry_max_attempts: u32,
    pub retry_base_backoff: Duration,
    pub retry_max_backoff: Duration,

    pub stale_run_reclaim_after: Duration,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let demo_wallets = env::var("DEMO_WALLETS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Config {
            database_url: env_or(
                "DATABASE_URL",
                "postgresql://postgres@localhost/wallet_analysis",
            ),
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            external_api_key: env_or("EXTERNAL_API_KEY", ""),
            external_api_rps: env_parse("EXTERNAL_API_RPS", 10),
            demo_wallets,
            frontend_url: env_or("FRONTEND_URL", "http://localhost:3000"),

            api_host: env_or("API_HOST", "127.0.0.1"),
            api_port: env_parse("API_PORT", 8080),

            fetcher_detail_concurrency: env_parse("FETCHER_DETAIL_CONCURRENCY", 3),
            fetcher_page_limit: env_parse("FETCHER_PAGE_LIMIT", 1000),
            fetcher_max_retries: env_parse("FETCHER_MAX_RETRIES", 5),

            high_frequency_tx_per_day: env_parse("HIGH_FREQUENCY_TX_PER_DAY", 50.0),
            high_frequency_target_cap: env_parse("HIGH_FREQUENCY_TARGET_CAP", 2000),

            flash: ScopeConfig {
                window_days: Some(7),
                target_signature_count: 250,
                freshness_window: Duration::from_secs(30 * 60),
                timeout: Duration::from_secs(5 * 60),
            },
            working: ScopeConfig {
                window_days: Some(30),
                target_signature_count: 1000,
                freshness_window: Duration::from_secs(6 * 60 * 60),
                timeout: Duration::from_secs(5 * 60),
            },
            deep: ScopeConfig {
                window_days: None,
                target_signature_count: env_parse("DEEP_TARGET_SIGNATURE_COUNT", 5000),
                freshness_window: Duration::from_secs(24 * 60 * 60),
                timeout: Duration::from_secs(15 * 60),
            },

            lock_ttl: Duration::from_secs(env_parse("LOCK_TTL_SECONDS", 20 * 60)),
            similarity_timeout: Duration::from_secs(env_parse("SIMILARITY_TIMEOUT_SECONDS", 30 * 60)),

            queue_concurrency_wallet_operations: env_parse("QUEUE_CONCURRENCY_WALLET_OPS", 5),
            queue_concurrency_analysis_operations: env_parse("QUEUE_CONCURRENCY_ANALYSIS_OPS", 5),
            queue_concurrency_similarity_operations: env_parse(
                "QUEUE_CONCURRENCY_SIMILARITY_OPS",
                3,
            ),
            queue_concurrency_enrichment_operations: env_parse(
                "QUEUE_CONCURRENCY_ENRICHMENT_OPS",
                5,
            ),

            retry_max_attempts: env_parse("RETRY_MAX_ATTEMPTS", 3),
            retry_base_backoff: Duration::from_secs(env_parse("RETRY_BASE_BACKOFF_SECONDS", 10)),
            retry_max_backoff: Duration::from_secs(env_parse("RETRY_MAX_BACKOFF_SECONDS", 300)),

            stale_run_reclaim_after: Duration::from_secs(env_parse(
                "STALE_RUN_RECLAIM_SECONDS",
                60 * 60,
            )),
        }
    }

    pub fn scope(&self, scope: crate::storage::models::Scope) -> ScopeConfig {
        use crate::storage::models::Scope::*;
        match scope {
            Flash => self.flash,
            Working => self.working,
            Deep => self.deep,
        }
    }
}
