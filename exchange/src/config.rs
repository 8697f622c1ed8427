//! Configuration for the exchange

use currency_network::{Address, MAX_VALUE};
use serde::{Deserialize, Serialize};

/// Exchange configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Address orders must name as their exchange; also the spender of token legs
    pub address: Address,

    /// Token in which maker and taker fees are paid
    pub fee_token: Option<Address>,

    /// Fee cap applied to network legs when the caller gives none
    pub default_max_network_fee: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "exchange".to_string(),
            address: Address::from_low_u64(0xe8c4),
            fee_token: None,
            default_max_network_fee: MAX_VALUE,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would make the exchange unusable
    pub fn validate(&self) -> crate::Result<()> {
        if self.address.is_zero() {
            return Err(crate::Error::Config(
                "exchange address must not be zero".to_string(),
            ));
        }
        if self.fee_token.map_or(false, |token| token.is_zero()) {
            return Err(crate::Error::Config("fee token must not be zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.fee_token.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
address = "0x00000000000000000000000000000000000000e1"
fee_token = "0x00000000000000000000000000000000000000f1"
"#
        )
        .unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.address, Address::from_low_u64(0xe1));
        assert_eq!(config.fee_token, Some(Address::from_low_u64(0xf1)));
        assert_eq!(config.default_max_network_fee, MAX_VALUE);
    }

    #[test]
    fn test_zero_address_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"address = "0x0000000000000000000000000000000000000000""#).unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(crate::Error::Config(_))
        ));
    }
}
