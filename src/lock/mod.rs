/// Distributed lock service backing the per-wallet concurrency gate.
///
/// One lock guards `(wallet_address, scope)` for the lifetime of an
/// analysis run. Acquisition is fail-fast: a caller that doesn't get the
/// lock immediately assumes the job is already running and returns
/// `AlreadyRunning` rather than queueing to wait for it.
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::core::errors::{EngineError, EngineResult};
use crate::metrics::LOCK_ACQUIRE_ATTEMPTS;

const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

#[derive(Clone)]
pub struct DistributedLock {
    conn: ConnectionManager,
}

/// A held lock. `release` is the normal exit path and reports whether the
/// key was actually ours to release; if the handle is instead dropped
/// without an explicit release (the job's timeout fired and cancelled the
/// handler mid-await), the compare-and-delete still runs in the background
/// so a cancelled job never leaks the wallet lock until TTL expiry.
pub struct LockHandle {
    key: String,
    token: String,
    conn: ConnectionManager,
    released: bool,
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let key = self.key.clone();
        let token = self.token.clone();
        let mut conn = self.conn.clone();
        tokio::spawn(async move {
            let script = redis::Script::new(RELEASE_SCRIPT);
            let result: Result<i32, redis::RedisError> =
                script.key(&key).arg(&token).invoke_async(&mut conn).await;
            if let Err(e) = result {
                tracing::warn!(error = %e, %key, "background lock release on drop failed");
            }
        });
    }
}

impl DistributedLock {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Key shape: `lock:wallet:<scope>:<addr>`, e.g. `lock:wallet:sync:<addr>`.
    fn lock_key(wallet_address: &str, scope: &str) -> String {
        format!("lock:wallet:{scope}:{wallet_address}")
    }

    /// Attempts to acquire the lock once; never waits or retries. Returns
    /// `Ok(None)` if another holder already owns the key.
    pub async fn try_acquire(
        &self,
        wallet_address: &str,
        scope: &str,
        ttl: std::time::Duration,
    ) -> EngineResult<Option<LockHandle>> {
        let key = Self::lock_key(wallet_address, scope);
        let token = Uuid::new_v4().to_string();
        let mut conn = self.conn.clone();

        let acquired: bool = conn
            .set_options(
                &key,
                &token,
                redis::SetOptions::default()
                    .with_expiration(redis::SetExpiry::PX(ttl.as_millis() as usize))
                    .conditional_set(redis::ExistenceCheck::NX),
            )
            .await
            .map_err(|e| EngineError::Lock(format!("lock acquire failed: {e}")))?;

        if acquired {
            LOCK_ACQUIRE_ATTEMPTS.with_label_values(&["acquired"]).inc();
            Ok(Some(LockHandle {
                key,
                token,
                conn: self.conn.clone(),
                released: false,
            }))
        } else {
            LOCK_ACQUIRE_ATTEMPTS.with_label_values(&["contended"]).inc();
            Ok(None)
        }
    }

    /// Releases the lock only if we still hold it (token match), so a lock
    /// that already expired and was re-acquired by someone else is untouched.
    pub async fn release(&self, mut handle: LockHandle) -> EngineResult<bool> {
        let mut conn = self.conn.clone();
        let script = redis::Script::new(RELEASE_SCRIPT);
        let released: i32 = script
            .key(&handle.key)
            .arg(&handle.token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| EngineError::Lock(format!("lock release failed: {e}")))?;
        handle.released = true;
        Ok(released == 1)
    }

    pub async fn is_held(&self, wallet_address: &str, scope: &str) -> EngineResult<bool> {
        let key = Self::lock_key(wallet_address, scope);
        let mut conn = self.conn.clone();
        let exists: bool = conn
            .exists(&key)
            .await
            .map_err(|e| EngineError::Lock(format!("lock check failed: {e}")))?;
        Ok(exists)
    }
}
