/// API key authentication middleware.
///
/// The core only checks that a principal is present (real session/API-key
/// issuance is out of scope); this validates the `X-API-Key` header against
/// the process-wide allow-list in `crate::auth` and stores the validated
/// `ApiKey` in request extensions so both downstream handlers (via the
/// `ApiKey`/`MaybeApiKey` extractors) and `RateLimiter` (which keys off the
/// authenticated principal) see the same value.
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};

use crate::auth::ApiKey;

fn is_public_endpoint(path: &str) -> bool {
    matches!(path, "/" | "/health" | "/status" | "/metrics" | "/metrics/health")
}

#[derive(Clone, Default)]
pub struct ApiKeyAuth;

impl ApiKeyAuth {
    pub fn new() -> Self {
        Self
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiKeyAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = ApiKeyAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiKeyAuthMiddleware { service }))
    }
}

pub struct ApiKeyAuthMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for ApiKeyAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if is_public_endpoint(req.path()) || !crate::auth::is_auth_enabled() {
            let fut = self.service.call(req);
            return Box::pin(async move {
                let res = fut.await?;
                Ok(res.map_into_boxed_body())
            });
        }

        let api_key = crate::auth::extract_credential(req.request());

        match api_key {
            Some(key) if crate::auth::is_valid_key(&key) => {
                req.extensions_mut().insert(ApiKey(key));
                let fut = self.service.call(req);
                Box::pin(async move {
                    let res = fut.await?;
                    Ok(res.map_into_boxed_body())
                })
            }
            Some(_) => {
                let (req, _pl) = req.into_parts();
                Box::pin(async move {
                    let response = HttpResponse::Unauthorized().json(serde_json::json!({
                        "error": {"kind": "invalid_input", "message": "invalid API key"}
                    }));
                    Ok(ServiceResponse::new(req, response.map_into_boxed_body()))
                })
            }
            None => {
                let (req, _pl) = req.into_parts();
                Box::pin(async move {
                    let response = HttpResponse::Unauthorized().json(serde_json::json!({
                        "error": {"kind": "invalid_input", "message": "missing X-API-Key or Authorization: Bearer header"}
                    }));
                    Ok(ServiceResponse::new(req, response.map_into_boxed_body()))
                })
            }
        }
    }
}
