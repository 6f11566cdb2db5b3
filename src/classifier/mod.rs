/// Wallet Classifier — decides whether a wallet is trading densely enough
/// to need the reduced high-frequency target cap before a scope is enqueued.
use crate::core::config::Config;
use crate::core::errors::EngineResult;
use crate::storage::models::WalletClassification;
use crate::storage::DatabaseManager;

pub struct WalletClassifier {
    high_frequency_tx_per_day: f64,
}

impl WalletClassifier {
    pub fn new(config: &Config) -> Self {
        Self {
            high_frequency_tx_per_day: config.high_frequency_tx_per_day,
        }
    }

    /// Classifies from the density of signatures already on file for the
    /// wallet. A wallet with no history yet classifies as `Normal` — the
    /// first analysis run establishes the density the next call will see.
    pub async fn classify(
        &self,
        wallet_address: &str,
        db: &DatabaseManager,
    ) -> EngineResult<WalletClassification> {
        if let Some(wallet) = db.get_wallet(wallet_address).await? {
            if wallet.classification == WalletClassification::Restricted {
                return Ok(WalletClassification::Restricted);
            }
        }

        let density = db.observed_density_tx_per_day(wallet_address).await?;
        let classification = if density >= self.high_frequency_tx_per_day {
            WalletClassification::HighFrequency
        } else {
            WalletClassification::Normal
        };

        db.set_wallet_classification(wallet_address, classification)
            .await?;
        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_read_from_config() {
        let config = Config::from_env();
        let classifier = WalletClassifier::new(&config);
        assert!(classifier.high_frequency_tx_per_day > 0.0);
    }
}
