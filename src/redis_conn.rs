/// Shared Redis connection factory.
///
/// The lock service, queue transport, and event bus each need a cheap-to-clone
/// async connection; `ConnectionManager` handles reconnects transparently so
/// none of the three have to implement their own retry-on-disconnect logic.
use redis::aio::ConnectionManager;
use redis::Client;

use crate::core::errors::{EngineError, EngineResult};

pub async fn connect(redis_url: &str) -> EngineResult<ConnectionManager> {
    let client = Client::open(redis_url)
        .map_err(|e| EngineError::Internal(format!("invalid REDIS_URL: {e}")))?;

    let conn = ConnectionManager::new(client)
        .await
        .map_err(|e| EngineError::Internal(format!("failed to connect to redis: {e}")))?;

    Ok(conn)
}

pub async fn health_check(conn: &ConnectionManager) -> EngineResult<bool> {
    let mut conn = conn.clone();
    let pong: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(|e| EngineError::Internal(format!("redis PING failed: {e}")))?;
    Ok(pong == "PONG")
}
