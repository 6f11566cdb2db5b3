/// Read-only wallet views consumed by the dashboard: latest P&L summary and
/// paginated per-token performance.
use actix_web::{web, HttpResponse};
use std::sync::Arc;

use crate::api::dto::PaginationQuery;
use crate::core::errors::EngineResult;
use crate::storage::models::WalletClassification;
use crate::storage::DatabaseManager;

pub async fn get_summary(
    db: web::Data<Arc<DatabaseManager>>,
    path: web::Path<String>,
    query: web::Query<PaginationQuery>,
) -> EngineResult<HttpResponse> {
    let address = path.into_inner();
    crate::core::ids::validate_wallet_address(&address)?;

    let wallet = db.get_wallet(&address).await?;
    if let Some(w) = &wallet {
        if w.classification == WalletClassification::Restricted {
            return Ok(HttpResponse::Ok().json(serde_json::json!({"status": "restricted"})));
        }
    }

    match db.get_pnl_summary(&address, query.scope).await? {
        Some(summary) => Ok(HttpResponse::Ok().json(summary)),
        None => Ok(HttpResponse::Ok().json(serde_json::json!({"status": "unanalyzed"}))),
    }
}

pub async fn get_token_performance(
    db: web::Data<Arc<DatabaseManager>>,
    path: web::Path<String>,
    query: web::Query<PaginationQuery>,
) -> EngineResult<HttpResponse> {
    let address = path.into_inner();
    crate::core::ids::validate_wallet_address(&address)?;

    let results = db
        .get_analysis_results(&address, query.scope, query.limit, query.offset)
        .await?;
    Ok(HttpResponse::Ok().json(results))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/wallets/{address}/summary", web::get().to(get_summary))
        .route(
            "/wallets/{address}/token-performance",
            web::get().to(get_token_performance),
        );
}
