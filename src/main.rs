use std::sync::Arc;

use tracing::info;

use wallet_analysis_engine::api::server::{start_server, AppState};
use wallet_analysis_engine::core::config::Config;
use wallet_analysis_engine::events::gateway::spawn_broker_bridge;
use wallet_analysis_engine::events::EventBus;
use wallet_analysis_engine::fetcher::RateLimitedFetcher;
use wallet_analysis_engine::lock::DistributedLock;
use wallet_analysis_engine::metrics;
use wallet_analysis_engine::queue::job::QueueName;
use wallet_analysis_engine::queue::worker::{Worker, WorkerContext};
use wallet_analysis_engine::queue::QueueHandle;
use wallet_analysis_engine::scheduler::DashboardScheduler;
use wallet_analysis_engine::smart_fetch::SmartFetchController;
use wallet_analysis_engine::storage::DatabaseManager;
use wallet_analysis_engine::{auth, redis_conn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    info!("wallet analysis engine starting");

    metrics::init_metrics();
    let config = Arc::new(Config::from_env());

    let db_manager = DatabaseManager::new(&config.database_url).await?;
    db_manager.init_schema().await?;
    let db = Arc::new(db_manager);
    info!("persistence store ready");

    let redis_conn_manager = redis_conn::connect(&config.redis_url).await?;
    info!("redis connection established");

    let queue = QueueHandle::new(Arc::clone(&db), redis_conn_manager.clone());
    let events = EventBus::new(redis_conn_manager.clone());
    let lock = DistributedLock::new(redis_conn_manager.clone());

    let fetcher = RateLimitedFetcher::new(
        "https://api.example-provider.invalid".to_string(),
        Some(config.external_api_key.clone()).filter(|k| !k.is_empty()),
        config.external_api_rps,
        config.fetcher_detail_concurrency,
        config.fetcher_max_retries,
    );

    let smart_fetch = Arc::new(SmartFetchController::new(fetcher.clone(), &config));

    let scheduler = Arc::new(DashboardScheduler::new(
        Arc::clone(&db),
        queue.clone(),
        Arc::clone(&config),
    ));

    let keys: Vec<String> = std::env::var("API_KEYS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if keys.is_empty() {
        tracing::warn!("no API_KEYS configured, authentication disabled");
    }
    auth::init_api_keys(keys);

    let worker_ctx = WorkerContext {
        db: Arc::clone(&db),
        queue: queue.clone(),
        events: events.clone(),
        lock: lock.clone(),
        fetcher: fetcher.clone(),
        smart_fetch: Arc::clone(&smart_fetch),
        scheduler: Arc::clone(&scheduler),
        config: Arc::clone(&config),
    };

    spawn_workers(&worker_ctx, &config);
    spawn_stale_run_reclaimer(Arc::clone(&db), config.stale_run_reclaim_after);

    let broker: wallet_analysis_engine::events::gateway::BrokerBridge =
        Arc::new(spawn_broker_bridge(config.redis_url.clone()));

    info!(host = %config.api_host, port = config.api_port, "starting control plane");

    start_server(AppState {
        db,
        queue,
        scheduler,
        config,
        redis: redis_conn_manager,
        broker,
    })
    .await?;

    Ok(())
}

fn spawn_workers(ctx: &WorkerContext, config: &Config) {
    let concurrencies = [
        (QueueName::WalletOperations, config.queue_concurrency_wallet_operations),
        (QueueName::AnalysisOperations, config.queue_concurrency_analysis_operations),
        (QueueName::SimilarityOperations, config.queue_concurrency_similarity_operations),
        (QueueName::EnrichmentOperations, config.queue_concurrency_enrichment_operations),
    ];

    for (queue_name, concurrency) in concurrencies {
        let worker = Worker::new(ctx.clone(), queue_name, concurrency);
        tokio::spawn(async move {
            worker.run().await;
        });
        info!(queue = %queue_name, concurrency, "worker started");
    }
}

fn spawn_stale_run_reclaimer(db: Arc<DatabaseManager>, after: std::time::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(after.max(std::time::Duration::from_secs(60)));
        loop {
            interval.tick().await;
            match db.reclaim_stale_running_runs(after.as_secs() as i64).await {
                Ok(n) if n > 0 => tracing::info!(count = n, "reclaimed stale analysis runs"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "stale run reclaim failed"),
            }
        }
    });
}
