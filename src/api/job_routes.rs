/// Generic job routes — enqueue outside the dashboard scope ladder, and
/// read back status/progress/result/queue stats.
use actix_web::{web, HttpResponse};
use uuid::Uuid;

use crate::api::dto::{
    GenericAnalyzeRequest, JobProgressResponse, JobResponse, QueueStatsResponse,
    SimilarityJobRequest, SyncJobRequest,
};
use crate::core::config::Config;
use crate::core::errors::{EngineError, EngineResult};
use crate::queue::job::{JobState, QueueName};
use crate::queue::QueueHandle;

pub async fn enqueue_sync(
    queue: web::Data<QueueHandle>,
    config: web::Data<std::sync::Arc<Config>>,
    body: web::Json<SyncJobRequest>,
) -> EngineResult<HttpResponse> {
    crate::core::ids::validate_wallet_address(&body.wallet_address)?;

    let payload = serde_json::json!({
        "wallet_address": body.wallet_address,
        "force_refresh": body.force_refresh,
        "fetch_older": body.fetch_older,
        "fetch_all": body.fetch_all,
    });

    let job = queue
        .enqueue(
            QueueName::WalletOperations,
            "sync-wallet",
            payload,
            Some(&body.wallet_address),
            None,
            config.retry_max_attempts as i32,
        )
        .await?;

    Ok(HttpResponse::Accepted().json(JobResponse::from(job)))
}

/// Generic `analyze-wallet` enqueue: unlike the dashboard endpoint this skips
/// the freshness/concurrency gate entirely and always enqueues.
pub async fn enqueue_analyze(
    queue: web::Data<QueueHandle>,
    config: web::Data<std::sync::Arc<Config>>,
    body: web::Json<GenericAnalyzeRequest>,
) -> EngineResult<HttpResponse> {
    crate::core::ids::validate_wallet_address(&body.wallet_address)?;

    let req = body.into_inner();
    let payload = serde_json::json!({
        "walletAddress": req.wallet_address,
        "analysisScope": req.analysis_scope,
        "forceRefresh": req.force_refresh,
        "historyWindowDays": req.history_window_days,
        "targetSignatureCount": req.target_signature_count,
        "queueWorkingAfter": false,
        "queueDeepAfter": false,
        "enrichMetadata": req.enrich_metadata,
    });

    let job = queue
        .enqueue(
            QueueName::AnalysisOperations,
            "analyze-wallet",
            payload,
            Some(&req.wallet_address),
            Some(&req.analysis_scope.to_string()),
            config.retry_max_attempts as i32,
        )
        .await?;

    Ok(HttpResponse::Accepted().json(JobResponse::from(job)))
}

pub async fn enqueue_similarity(
    queue: web::Data<QueueHandle>,
    config: web::Data<std::sync::Arc<Config>>,
    body: web::Json<SimilarityJobRequest>,
) -> EngineResult<HttpResponse> {
    if body.wallet_addresses.len() < 2 {
        return Err(EngineError::InvalidInput(
            "similarity requires at least two wallet addresses".to_string(),
        ));
    }
    for addr in &body.wallet_addresses {
        crate::core::ids::validate_wallet_address(addr)?;
    }

    let payload = serde_json::json!({
        "walletAddresses": body.wallet_addresses,
        "vectorType": body.vector_type,
        "failureThreshold": body.failure_threshold,
        "timeoutMinutes": body.timeout_minutes,
    });

    let job = queue
        .enqueue(
            QueueName::SimilarityOperations,
            "similarity",
            payload,
            None,
            None,
            config.retry_max_attempts as i32,
        )
        .await?;

    Ok(HttpResponse::Accepted().json(JobResponse::from(job)))
}

pub async fn get_job(
    queue: web::Data<QueueHandle>,
    path: web::Path<Uuid>,
) -> EngineResult<HttpResponse> {
    let job = queue
        .get_job(path.into_inner())
        .await?
        .ok_or_else(|| EngineError::NotFound("job not found".to_string()))?;
    Ok(HttpResponse::Ok().json(JobResponse::from(job)))
}

pub async fn get_job_progress(
    queue: web::Data<QueueHandle>,
    path: web::Path<Uuid>,
) -> EngineResult<HttpResponse> {
    let job = queue
        .get_job(path.into_inner())
        .await?
        .ok_or_else(|| EngineError::NotFound("job not found".to_string()))?;
    Ok(HttpResponse::Ok().json(JobProgressResponse {
        id: job.id,
        status: job.state,
        progress: job.progress,
    }))
}

pub async fn get_job_result(
    queue: web::Data<QueueHandle>,
    path: web::Path<Uuid>,
) -> EngineResult<HttpResponse> {
    let job = queue
        .get_job(path.into_inner())
        .await?
        .ok_or_else(|| EngineError::NotFound("job not found".to_string()))?;

    match job.state {
        JobState::Completed => Ok(HttpResponse::Ok().json(job.result)),
        JobState::Failed => Err(EngineError::NotFound(format!(
            "job {} has no result: failed with {}",
            job.id,
            job.error.unwrap_or_else(|| "unknown error".to_string())
        ))),
        _ => Err(EngineError::AlreadyRunning {
            job_id: job.id.to_string(),
        }),
    }
}

pub async fn get_queue_stats(
    queue: web::Data<QueueHandle>,
    path: web::Path<String>,
) -> EngineResult<HttpResponse> {
    let queue_name: QueueName = path
        .into_inner()
        .parse()
        .map_err(|_| EngineError::InvalidInput("unknown queue name".to_string()))?;
    let stats = queue.queue_stats(queue_name).await?;
    Ok(HttpResponse::Ok().json(QueueStatsResponse::from(stats)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/jobs/wallets/sync", web::post().to(enqueue_sync))
        .route("/jobs/wallets/analyze", web::post().to(enqueue_analyze))
        .route("/jobs/similarity/analyze", web::post().to(enqueue_similarity))
        .route("/jobs/{jobId}", web::get().to(get_job))
        .route("/jobs/{jobId}/progress", web::get().to(get_job_progress))
        .route("/jobs/{jobId}/result", web::get().to(get_job_result))
        .route("/jobs/queue/{queueName}/stats", web::get().to(get_queue_stats));
}
