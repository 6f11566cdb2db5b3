/// Rate-limited external provider client.
///
/// Two-phase caching: `fetch_signatures` is cheap and always hits the
/// provider (signature lists are the pagination cursor); `fetch_parsed_details`
/// is expensive and checks `raw_transaction_cache` first, only calling the
/// provider for signatures not already cached.
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{sleep, Instant};

use crate::core::circuit_breaker::CircuitBreaker;
use crate::core::errors::{EngineError, EngineResult};
use crate::metrics::{FETCHER_CACHE_HITS, FETCHER_CACHE_MISSES, FETCHER_REQUESTS};
use crate::storage::models::RawTransactionCacheEntry;
use crate::storage::DatabaseManager;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: i64,
    pub block_time: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub mint: String,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub price_usd: Option<f64>,
}

struct IntervalGate {
    min_interval: Duration,
    next_allowed: Mutex<Instant>,
}

impl IntervalGate {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_allowed: Mutex::new(Instant::now()),
        }
    }

    async fn acquire(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut next = self.next_allowed.lock().await;
        let now = Instant::now();
        if *next > now {
            sleep(*next - now).await;
        }
        *next = Instant::now() + self.min_interval;
    }
}

#[derive(Clone)]
pub struct RateLimitedFetcher {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
    gate: Arc<IntervalGate>,
    detail_semaphore: Arc<Semaphore>,
    breaker: CircuitBreaker,
    max_retries: usize,
}

impl RateLimitedFetcher {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        requests_per_second: u32,
        detail_concurrency: usize,
        max_retries: usize,
    ) -> Self {
        let http = reqwest::Client::builder()
            .no_proxy()
            .connect_timeout(Duration::from_secs(8))
            .timeout(Duration::from_secs(25))
            .build()
            .expect("failed to build http client");

        let min_interval = if requests_per_second == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(1000 / requests_per_second.max(1) as u64)
        };

        Self {
            base_url,
            api_key,
            http,
            gate: Arc::new(IntervalGate::new(min_interval)),
            detail_semaphore: Arc::new(Semaphore::new(detail_concurrency.max(1))),
            breaker: CircuitBreaker::new("external-provider"),
            max_retries: max_retries.max(1),
        }
    }

    /// One page of signatures, newest-first, optionally bounded by `before`/`until`
    /// cursors for the Smart-Fetch Controller's Phase Newer / Phase Older walks.
    pub async fn fetch_signatures(
        &self,
        wallet_address: &str,
        before: Option<&str>,
        until: Option<&str>,
        limit: u32,
    ) -> EngineResult<Vec<SignatureInfo>> {
        let url = format!("{}/v0/addresses/{}/signatures", self.base_url, wallet_address);
        let mut query: Vec<(&str, String)> = vec![("limit", limit.to_string())];
        if let Some(b) = before {
            query.push(("before", b.to_string()));
        }
        if let Some(u) = until {
            query.push(("until", u.to_string()));
        }

        let fetcher = self.clone();
        let mut page: Vec<SignatureInfo> = self
            .breaker
            .call(|| async move { fetcher.get_json(&url, &query).await })
            .await?;

        // `limit` is a hard ceiling: a provider that pages loosely and
        // returns more than asked has its excess discarded, never surfaced.
        if page.len() > limit as usize {
            page.truncate(limit as usize);
        }
        Ok(page)
    }

    /// Resolves parsed transaction detail for each signature, consulting the
    /// cache before spending a provider call, and persisting new results back.
    pub async fn fetch_parsed_details(
        &self,
        signatures: &[String],
        db: &DatabaseManager,
    ) -> EngineResult<Vec<RawTransactionCacheEntry>> {
        if signatures.is_empty() {
            return Ok(vec![]);
        }

        let cached = db.get_cached_signatures(signatures).await?;
        let cached_sigs: std::collections::HashSet<&str> =
            cached.iter().map(|e| e.signature.as_str()).collect();

        let missing: Vec<String> = signatures
            .iter()
            .filter(|s| !cached_sigs.contains(s.as_str()))
            .cloned()
            .collect();

        FETCHER_CACHE_HITS.inc_by(cached.len() as f64);
        FETCHER_CACHE_MISSES.inc_by(missing.len() as f64);

        if missing.is_empty() {
            return Ok(cached);
        }

        let fetched = self.fetch_details_uncached(&missing).await?;
        if !fetched.is_empty() {
            db.insert_transactions_if_absent(&fetched).await?;
        }

        let mut all = cached;
        all.extend(fetched);
        Ok(all)
    }

    /// Token metadata/price lookup for the Enrichment job — the metadata
    /// provider itself is an out-of-scope external collaborator; this just
    /// shapes the request the way `fetch_signatures`/`fetch_parsed_details` do.
    pub async fn fetch_token_metadata(
        &self,
        mints: &[String],
    ) -> EngineResult<Vec<TokenMetadata>> {
        if mints.is_empty() {
            return Ok(vec![]);
        }
        let url = format!("{}/v0/token-metadata", self.base_url);
        let fetcher = self.clone();
        let mints = mints.to_vec();
        self.breaker
            .call(|| async move {
                let body = serde_json::json!({ "mints": mints });
                fetcher.post_json(&url, &body).await
            })
            .await
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> EngineResult<T> {
        for attempt in 0..self.max_retries {
            self.gate.acquire().await;

            let mut req = self.http.post(url).json(body);
            if let Some(key) = &self.api_key {
                req = req.query(&[("api-key", key.as_str())]);
            }

            let resp = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    FETCHER_REQUESTS.with_label_values(&["post", "transport_error"]).inc();
                    if attempt + 1 < self.max_retries {
                        sleep(backoff_for(attempt)).await;
                        continue;
                    }
                    return Err(EngineError::ExternalUnavailable(format!(
                        "provider request failed: {e}"
                    )));
                }
            };

            let status = resp.status();
            if status.as_u16() == 429 {
                FETCHER_REQUESTS.with_label_values(&["post", "429"]).inc();
                if attempt + 1 < self.max_retries {
                    sleep(backoff_for(attempt)).await;
                    continue;
                }
                return Err(EngineError::RateLimited);
            }

            if !status.is_success() {
                FETCHER_REQUESTS
                    .with_label_values(&["post", &status.as_u16().to_string()])
                    .inc();
                if status.is_server_error() && attempt + 1 < self.max_retries {
                    sleep(backoff_for(attempt)).await;
                    continue;
                }
                let body = resp.text().await.unwrap_or_default();
                return Err(EngineError::ExternalUnavailable(format!(
                    "provider HTTP {status}: {body}"
                )));
            }

            FETCHER_REQUESTS.with_label_values(&["post", "200"]).inc();
            return resp
                .json::<T>()
                .await
                .map_err(|e| EngineError::ExternalUnavailable(format!("bad provider payload: {e}")));
        }

        unreachable!("loop always returns before exhausting max_retries")
    }

    async fn fetch_details_uncached(
        &self,
        signatures: &[String],
    ) -> EngineResult<Vec<RawTransactionCacheEntry>> {
        let tasks = signatures.iter().cloned().map(|sig| {
            let fetcher = self.clone();
            async move {
                let _permit = fetcher
                    .detail_semaphore
                    .acquire()
                    .await
                    .map_err(|e| EngineError::Internal(format!("semaphore closed: {e}")))?;
                fetcher.fetch_one_detail(&sig).await
            }
        });

        let results = futures::future::join_all(tasks).await;
        let mut entries = Vec::with_capacity(results.len());
        for r in results {
            match r {
                Ok(entry) => entries.push(entry),
                Err(err) if err.is_transient() => return Err(err),
                Err(err) => tracing::warn!(error = %err, "skipping transaction detail"),
            }
        }
        Ok(entries)
    }

    async fn fetch_one_detail(&self, signature: &str) -> EngineResult<RawTransactionCacheEntry> {
        let url = format!("{}/v0/transactions/{}", self.base_url, signature);
        let fetcher = self.clone();
        let sig = signature.to_string();
        self.breaker
            .call(|| async move {
                let detail: serde_json::Value = fetcher.get_json(&url, &[]).await?;
                let slot = detail.get("slot").and_then(|v| v.as_i64()).unwrap_or(0);
                let block_time = detail.get("blockTime").and_then(|v| v.as_i64());
                Ok(RawTransactionCacheEntry {
                    signature: sig.clone(),
                    slot,
                    block_time,
                    parsed_detail: detail,
                })
            })
            .await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> EngineResult<T> {
        for attempt in 0..self.max_retries {
            self.gate.acquire().await;

            let mut req = self.http.get(url).query(query);
            if let Some(key) = &self.api_key {
                req = req.query(&[("api-key", key.as_str())]);
            }

            let resp = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    FETCHER_REQUESTS.with_label_values(&["get", "transport_error"]).inc();
                    if attempt + 1 < self.max_retries {
                        sleep(backoff_for(attempt)).await;
                        continue;
                    }
                    return Err(EngineError::ExternalUnavailable(format!(
                        "provider request failed: {e}"
                    )));
                }
            };

            let status = resp.status();
            if status.as_u16() == 429 {
                FETCHER_REQUESTS.with_label_values(&["get", "429"]).inc();
                if attempt + 1 < self.max_retries {
                    sleep(backoff_for(attempt)).await;
                    continue;
                }
                return Err(EngineError::RateLimited);
            }

            if !status.is_success() {
                FETCHER_REQUESTS
                    .with_label_values(&["get", &status.as_u16().to_string()])
                    .inc();
                if status.is_server_error() && attempt + 1 < self.max_retries {
                    sleep(backoff_for(attempt)).await;
                    continue;
                }
                let body = resp.text().await.unwrap_or_default();
                return Err(EngineError::ExternalUnavailable(format!(
                    "provider HTTP {status}: {body}"
                )));
            }

            FETCHER_REQUESTS.with_label_values(&["get", "200"]).inc();
            return resp
                .json::<T>()
                .await
                .map_err(|e| EngineError::ExternalUnavailable(format!("bad provider payload: {e}")));
        }

        unreachable!("loop always returns before exhausting max_retries")
    }
}

fn backoff_for(attempt: usize) -> Duration {
    Duration::from_millis((250_u64 << attempt.min(4)).min(3_000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn interval_gate_spaces_calls() {
        let gate = IntervalGate::new(Duration::from_millis(20));
        let start = Instant::now();
        gate.acquire().await;
        gate.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
