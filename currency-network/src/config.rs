//! Configuration for the currency network

use crate::types::Address;
use serde::{Deserialize, Serialize};

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Currency identity
    pub network: NetworkConfig,

    /// Fee configuration
    pub fees: FeeConfig,

    /// Transfer protocol configuration
    pub transfer: TransferConfig,

    /// Time marker configuration
    pub mtime: MtimeConfig,

    /// Actor configuration
    pub actor: ActorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "currency-network".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            network: NetworkConfig::default(),
            fees: FeeConfig::default(),
            transfer: TransferConfig::default(),
            mtime: MtimeConfig::default(),
            actor: ActorConfig::default(),
        }
    }
}

/// Currency identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Currency name
    pub name: String,

    /// Currency symbol
    pub symbol: String,

    /// Display decimals
    pub decimals: u8,

    /// Address identifying this network as an asset (used by the exchange)
    pub address: Address,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "Testcoin".to_string(),
            symbol: "T".to_string(),
            decimals: 6,
            address: Address::from_low_u64(0x7e57),
        }
    }
}

/// Fee configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Per-hop fee is `floor(forwarded / divisor)`; 0 disables fees
    pub divisor: u64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self { divisor: 0 }
    }
}

/// Transfer protocol configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Maximum accounts in a path (excluding the sender)
    pub max_hops: usize,

    /// Lifetime of a prepared transfer, in mtime units
    pub prepared_ttl: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_hops: 10,
            prepared_ttl: 60, // one hour at minute granularity
        }
    }
}

/// Time marker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MtimeConfig {
    /// Unix second at which mtime is zero
    pub epoch_unix: u64,

    /// Seconds per mtime unit
    pub granularity_secs: u64,
}

impl Default for MtimeConfig {
    fn default() -> Self {
        Self {
            epoch_unix: 1_483_228_800, // 2017-01-01T00:00:00Z
            granularity_secs: 60,
        }
    }
}

impl MtimeConfig {
    /// mtime at the given unix second
    pub fn mtime_at(&self, unix_seconds: u64) -> u64 {
        unix_seconds.saturating_sub(self.epoch_unix) / self.granularity_secs.max(1)
    }
}

/// Actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Bounded mailbox size
    pub mailbox_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
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

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(name) = std::env::var("NETWORK_NAME") {
            config.network.name = name;
        }

        if let Ok(symbol) = std::env::var("NETWORK_SYMBOL") {
            config.network.symbol = symbol;
        }

        if let Ok(address) = std::env::var("NETWORK_ADDRESS") {
            config.network.address = address
                .parse()
                .map_err(|e| crate::Error::Config(format!("NETWORK_ADDRESS: {}", e)))?;
        }

        if let Ok(divisor) = std::env::var("NETWORK_FEE_DIVISOR") {
            config.fees.divisor = divisor
                .parse()
                .map_err(|e| crate::Error::Config(format!("NETWORK_FEE_DIVISOR: {}", e)))?;
        }

        if let Ok(max_hops) = std::env::var("NETWORK_MAX_HOPS") {
            config.transfer.max_hops = max_hops
                .parse()
                .map_err(|e| crate::Error::Config(format!("NETWORK_MAX_HOPS: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check values that would make the network unusable
    pub fn validate(&self) -> crate::Result<()> {
        if self.transfer.max_hops == 0 {
            return Err(crate::Error::Config("max_hops must be at least 1".to_string()));
        }
        if self.mtime.granularity_secs == 0 {
            return Err(crate::Error::Config(
                "mtime granularity must be at least one second".to_string(),
            ));
        }
        if self.actor.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "actor mailbox capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
