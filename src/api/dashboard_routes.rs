/// `/analyses/wallets/dashboard-analysis` — the single entry point into the
/// scope ladder. Thin by design: all of the freshness/concurrency/enqueue
/// logic lives in `scheduler::DashboardScheduler`.
use actix_web::{web, HttpResponse};

use crate::core::errors::EngineResult;
use crate::scheduler::{AnalysisRequest, DashboardScheduler};

pub async fn schedule_dashboard_analysis(
    scheduler: web::Data<std::sync::Arc<DashboardScheduler>>,
    body: web::Json<AnalysisRequest>,
) -> EngineResult<HttpResponse> {
    let response = scheduler.schedule(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/analyses/wallets/dashboard-analysis",
        web::post().to(schedule_dashboard_analysis),
    );
}
