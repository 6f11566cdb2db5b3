/// HTTP/WebSocket control plane — App factory wiring the REST routes, the
/// gateway WebSocket, and the three cross-cutting middleware layers.
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use redis::aio::ConnectionManager;

use crate::api::{dashboard_routes, job_routes, metrics_routes, wallet_routes, ws_routes};
use crate::core::config::Config;
use crate::events::gateway::BrokerBridge;
use crate::middleware::{ApiKeyAuth, RateLimiter, RequestId};
use crate::queue::QueueHandle;
use crate::scheduler::DashboardScheduler;
use crate::storage::DatabaseManager;

pub struct AppState {
    pub db: Arc<DatabaseManager>,
    pub queue: QueueHandle,
    pub scheduler: Arc<DashboardScheduler>,
    pub config: Arc<Config>,
    pub redis: ConnectionManager,
    pub broker: BrokerBridge,
}

pub async fn start_server(state: AppState) -> std::io::Result<()> {
    let db = web::Data::new(state.db);
    let queue = web::Data::new(state.queue);
    let scheduler = web::Data::new(state.scheduler);
    let config = web::Data::new(state.config);
    let redis = web::Data::new(state.redis);
    let broker = web::Data::new(state.broker);

    let host = config.api_host.clone();
    let port = config.api_port;

    let frontend_url = config.frontend_url.clone();

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_url)
            .allowed_methods(vec!["GET", "POST"])
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(db.clone())
            .app_data(queue.clone())
            .app_data(scheduler.clone())
            .app_data(config.clone())
            .app_data(redis.clone())
            .app_data(broker.clone())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(cors)
            .wrap(RateLimiter::new())
            .wrap(ApiKeyAuth::new())
            .wrap(RequestId::new())
            .configure(metrics_routes::configure)
            .configure(ws_routes::configure)
            .service(
                web::scope("/api/v1")
                    .configure(dashboard_routes::configure)
                    .configure(job_routes::configure)
                    .configure(wallet_routes::configure),
            )
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
