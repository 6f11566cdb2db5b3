/// REST + WebSocket control plane — thin entry points that validate,
/// authenticate (delegated), enqueue, or read cached results.
pub mod dashboard_routes;
pub mod dto;
pub mod job_routes;
pub mod metrics_routes;
pub mod server;
pub mod wallet_routes;
pub mod ws_routes;

pub use server::{start_server, AppState};
