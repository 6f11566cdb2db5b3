/// Middleware components for the control plane.
///
/// Authentication lives in `crate::auth` (an extractor, not a `Transform`);
/// this module holds the two `Transform`-based layers: request-id tagging
/// and rate limiting.

pub mod auth;
pub mod rate_limit;
pub mod request_id;

pub use auth::ApiKeyAuth;
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use request_id::RequestId;
