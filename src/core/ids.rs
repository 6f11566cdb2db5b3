use crate::core::errors::EngineError;

/// Solana addresses are base-58 and 32-44 characters; this is a shape check,
/// not a curve-point validation (decoding raw transaction bytes is out of scope).
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

pub fn validate_wallet_address(address: &str) -> Result<(), EngineError> {
    if address.len() < 32 || address.len() > 44 {
        return Err(EngineError::InvalidInput(format!(
            "wallet address must be 32-44 characters, got {}",
            address.len()
        )));
    }
    if !address.chars().all(|c| BASE58_ALPHABET.contains(c)) {
        return Err(EngineError::InvalidInput(
            "wallet address contains non-base58 characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_address() {
        assert!(validate_wallet_address("DYw8jCTfwHNRJhhmFcbXvVDTqWMEVFBX6ZKUhxsh6P8i").is_ok());
    }

    #[test]
    fn rejects_short_address() {
        assert!(validate_wallet_address("short").is_err());
    }

    #[test]
    fn rejects_non_base58_characters() {
        let addr = "0".repeat(40) + "OIl0";
        assert!(validate_wallet_address(&addr).is_err());
    }
}
