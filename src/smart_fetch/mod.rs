/// Smart-Fetch Controller — the forward+backward pagination algorithm that
/// drives the store toward a target signature count for one wallet.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::WalletClassifier;
use crate::core::config::Config;
use crate::core::errors::EngineResult;
use crate::fetcher::RateLimitedFetcher;
use crate::storage::models::{SwapAnalysisInput, SwapDirection, WalletClassification};
use crate::storage::DatabaseManager;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSummary {
    pub new_fetched: u32,
    pub older_fetched: u32,
    pub final_store_count: i64,
}

/// Statistics the mapper records per run, surfaced to the worker's logs.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MapperStats {
    pub swaps: u32,
    pub transfers: u32,
    pub skipped: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Both,
    OlderOnly,
}

pub struct SmartFetchController {
    fetcher: RateLimitedFetcher,
    classifier: WalletClassifier,
    high_frequency_target_cap: u32,
    page_limit: u32,
}

impl SmartFetchController {
    pub fn new(fetcher: RateLimitedFetcher, config: &Config) -> Self {
        Self {
            fetcher,
            classifier: WalletClassifier::new(config),
            high_frequency_target_cap: config.high_frequency_target_cap,
            page_limit: config.fetcher_page_limit,
        }
    }

    pub async fn run(
        &self,
        wallet_address: &str,
        target_count: u32,
        since: Option<DateTime<Utc>>,
        db: &DatabaseManager,
    ) -> EngineResult<FetchSummary> {
        self.run_with_direction(wallet_address, target_count, since, db, Direction::Both)
            .await
    }

    /// Runs Phase Older only, skipping the forward walk entirely. Honors a
    /// caller's explicit request for older-history pagination (e.g.
    /// `sync-wallet`'s `fetchOlder` flag) without touching recent signatures.
    pub async fn run_older_only(
        &self,
        wallet_address: &str,
        target_count: u32,
        db: &DatabaseManager,
    ) -> EngineResult<FetchSummary> {
        self.run_with_direction(wallet_address, target_count, None, db, Direction::OlderOnly)
            .await
    }

    async fn run_with_direction(
        &self,
        wallet_address: &str,
        target_count: u32,
        since: Option<DateTime<Utc>>,
        db: &DatabaseManager,
        direction: Direction,
    ) -> EngineResult<FetchSummary> {
        let classification = self.classifier.classify(wallet_address, db).await?;
        let effective_target = if classification == WalletClassification::HighFrequency {
            target_count.min(self.high_frequency_target_cap)
        } else {
            target_count
        };

        let mut new_fetched = 0u32;
        let mut older_fetched = 0u32;

        if direction == Direction::Both {
            new_fetched += self.phase_newer(wallet_address, db, since).await?;
        }

        let mut store_count = db.count_wallet_signatures(wallet_address).await?;
        if store_count < effective_target as i64 {
            older_fetched += self
                .phase_older(wallet_address, db, effective_target, store_count)
                .await?;
            store_count = db.count_wallet_signatures(wallet_address).await?;
        }

        Ok(FetchSummary {
            new_fetched,
            older_fetched,
            final_store_count: store_count,
        })
    }

    /// Walks forward from the newest stored signature until the provider
    /// runs dry or returns only signatures already seen.
    async fn phase_newer(
        &self,
        wallet_address: &str,
        db: &DatabaseManager,
        since: Option<DateTime<Utc>>,
    ) -> EngineResult<u32> {
        let bounds = db.signature_time_bounds(wallet_address).await?;
        let until = bounds.map(|(newest, _)| newest.timestamp().to_string());

        if until.is_none() && since.is_none() {
            // First-ever fetch for this wallet: Phase Newer has nothing to
            // anchor on, so the initial page is handled by Phase Older below.
            return Ok(0);
        }

        let mut fetched = 0u32;
        let mut before: Option<String> = None;

        loop {
            let page = self
                .fetcher
                .fetch_signatures(wallet_address, before.as_deref(), until.as_deref(), self.page_limit)
                .await?;

            if page.is_empty() {
                break;
            }

            let (inserted, stats) = self.map_and_store(wallet_address, &page, db).await?;
            fetched += inserted;
            tracing::debug!(?stats, wallet = wallet_address, phase = "newer", "mapper stats");

            before = page.last().map(|s| s.signature.clone());
            if page.len() < self.page_limit as usize {
                break;
            }
        }

        Ok(fetched)
    }

    /// Walks backward from the earliest stored signature until the target is
    /// met or the provider reports no more history.
    async fn phase_older(
        &self,
        wallet_address: &str,
        db: &DatabaseManager,
        effective_target: u32,
        mut store_count: i64,
    ) -> EngineResult<u32> {
        let bounds = db.signature_time_bounds(wallet_address).await?;
        let mut before = bounds.map(|(_, oldest)| oldest.timestamp().to_string());
        let mut fetched = 0u32;

        while store_count < effective_target as i64 {
            let remaining = (effective_target as i64 - store_count).min(self.page_limit as i64) as u32;

            let page = self
                .fetcher
                .fetch_signatures(wallet_address, before.as_deref(), None, remaining)
                .await?;

            if page.is_empty() {
                break;
            }

            let (inserted, stats) = self.map_and_store(wallet_address, &page, db).await?;
            fetched += inserted;
            tracing::debug!(?stats, wallet = wallet_address, phase = "older", "mapper stats");

            before = page.last().map(|s| s.signature.clone());
            store_count = db.count_wallet_signatures(wallet_address).await?;

            if page.len() < remaining as usize {
                break;
            }
        }

        Ok(fetched)
    }

    async fn map_and_store(
        &self,
        wallet_address: &str,
        page: &[crate::fetcher::SignatureInfo],
        db: &DatabaseManager,
    ) -> EngineResult<(u32, MapperStats)> {
        let signatures: Vec<String> = page.iter().map(|s| s.signature.clone()).collect();
        let details = self.fetcher.fetch_parsed_details(&signatures, db).await?;

        let mut stats = MapperStats::default();
        let mut inputs = Vec::new();
        for entry in &details {
            match map_transaction(wallet_address, entry) {
                Some(rows) => {
                    stats.swaps += 1;
                    inputs.extend(rows);
                }
                None => stats.skipped += 1,
            }
        }

        let inserted = db.insert_swap_inputs_if_absent(&inputs).await?;
        Ok((inserted as u32, stats))
    }
}

/// Pure mapper from a cached parsed transaction to zero or more swap inputs
/// for the given wallet. Transactions that don't touch the wallet as a swap
/// participant (plain transfers, failed txs) map to `None`.
fn map_transaction(
    wallet_address: &str,
    entry: &crate::storage::models::RawTransactionCacheEntry,
) -> Option<Vec<SwapAnalysisInput>> {
    let detail = &entry.parsed_detail;

    let involves_wallet = detail
        .get("accountData")
        .and_then(|v| v.as_array())
        .map(|accounts| {
            accounts.iter().any(|a| {
                a.get("account").and_then(|v| v.as_str()) == Some(wallet_address)
            })
        })
        .unwrap_or(false);

    if !involves_wallet {
        return None;
    }

    let block_time = entry.block_time?;
    let timestamp = DateTime::from_timestamp(block_time, 0)?;

    let token_transfers = detail.get("tokenTransfers")?.as_array()?;
    if token_transfers.is_empty() {
        return None;
    }

    let mut rows = Vec::new();
    for transfer in token_transfers {
        let mint = transfer.get("mint").and_then(|v| v.as_str())?.to_string();
        let token_amount = transfer.get("tokenAmount").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let from_wallet = transfer.get("fromUserAccount").and_then(|v| v.as_str());
        let to_wallet = transfer.get("toUserAccount").and_then(|v| v.as_str());

        let direction = if to_wallet == Some(wallet_address) {
            SwapDirection::In
        } else if from_wallet == Some(wallet_address) {
            SwapDirection::Out
        } else {
            continue;
        };

        let sol_value = detail
            .get("nativeTransfers")
            .and_then(|v| v.as_array())
            .map(|transfers| {
                transfers
                    .iter()
                    .filter(|t| {
                        t.get("fromUserAccount").and_then(|v| v.as_str()) == Some(wallet_address)
                            || t.get("toUserAccount").and_then(|v| v.as_str())
                                == Some(wallet_address)
                    })
                    .filter_map(|t| t.get("amount").and_then(|v| v.as_f64()))
                    .sum::<f64>()
                    / 1_000_000_000.0
            })
            .unwrap_or(0.0);

        let fee_lamports = detail.get("fee").and_then(|v| v.as_i64()).unwrap_or(0);
        let interaction_type = detail
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("UNKNOWN")
            .to_string();

        rows.push(SwapAnalysisInput {
            wallet_address: wallet_address.to_string(),
            signature: entry.signature.clone(),
            direction,
            mint,
            sol_value,
            token_amount,
            fee_lamports,
            interaction_type: interaction_type.clone(),
            timestamp,
        });
    }

    if rows.is_empty() {
        None
    } else {
        Some(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn skips_transactions_not_touching_wallet() {
        let entry = crate::storage::models::RawTransactionCacheEntry {
            signature: "sig1".to_string(),
            slot: 1,
            block_time: Some(1_700_000_000),
            parsed_detail: json!({
                "accountData": [{"account": "someone-else"}],
                "tokenTransfers": [],
            }),
        };
        assert!(map_transaction("my-wallet", &entry).is_none());
    }

    #[test]
    fn maps_inbound_token_transfer() {
        let entry = crate::storage::models::RawTransactionCacheEntry {
            signature: "sig2".to_string(),
            slot: 2,
            block_time: Some(1_700_000_000),
            parsed_detail: json!({
                "accountData": [{"account": "my-wallet"}],
                "type": "SWAP",
                "fee": 5000,
                "tokenTransfers": [{
                    "mint": "MintXYZ",
                    "tokenAmount": 42.0,
                    "toUserAccount": "my-wallet",
                    "fromUserAccount": "pool",
                }],
                "nativeTransfers": [{
                    "fromUserAccount": "my-wallet",
                    "toUserAccount": "pool",
                    "amount": 1_000_000_000u64,
                }],
            }),
        };
        let rows = map_transaction("my-wallet", &entry).expect("should map");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].direction, SwapDirection::In);
        assert_eq!(rows[0].mint, "MintXYZ");
    }
}
