/// Metrics API routes — Prometheus scrape endpoint and a liveness probe
/// that reports store + broker health.
use actix_web::{web, HttpResponse};
use redis::aio::ConnectionManager;
use std::sync::Arc;

use crate::metrics;
use crate::storage::DatabaseManager;

/// GET /metrics - Prometheus metrics endpoint
pub async fn get_metrics() -> HttpResponse {
    let metrics_output = metrics::gather_metrics();
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics_output)
}

/// GET /metrics/health - liveness probe covering the Persistence Store and
/// the Redis-backed lock/queue/event-bus broker.
pub async fn health_check(
    db: web::Data<Arc<DatabaseManager>>,
    redis: web::Data<ConnectionManager>,
) -> HttpResponse {
    let mut status = serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    match db.health_check().await {
        Ok(true) => {
            status["database"] = serde_json::json!({"status": "healthy"});
        }
        Ok(false) | Err(_) => {
            status["database"] = serde_json::json!({"status": "unhealthy"});
            status["status"] = serde_json::json!("degraded");
        }
    }

    match crate::redis_conn::health_check(&redis).await {
        Ok(true) => {
            status["broker"] = serde_json::json!({"status": "healthy"});
        }
        Ok(false) | Err(_) => {
            status["broker"] = serde_json::json!({"status": "unhealthy"});
            status["status"] = serde_json::json!("degraded");
        }
    }

    HttpResponse::Ok().json(status)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(get_metrics))
        .route("/metrics/health", web::get().to(health_check))
        .route("/health", web::get().to(health_check));
}
