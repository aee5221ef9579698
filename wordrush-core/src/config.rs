use crate::cache::CacheConfig;
use crate::error::{GameError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Simnet,
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
            Network::Simnet => write!(f, "simnet"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub network: Network,
    pub contract_address: String,
    pub contract_name: String,
    pub cache: CacheConfig,
    pub sync: SyncConfig,
}

/// How the controller confirms that an accepted write has landed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationPolicy {
    /// Wait before the first re-read.
    pub initial_delay: Duration,
    /// Further re-reads when the first one still shows the old state.
    pub max_rechecks: u32,
    pub backoff_base: Duration,
    pub max_backoff: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_rechecks: 3,
            backoff_base: Duration::from_secs(2),
            max_backoff: Duration::from_secs(15),
        }
    }
}

impl ConfirmationPolicy {
    /// Delay before re-check `attempt` (0-based): `backoff_base * 2^attempt`,
    /// capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub max_attempts: u32,
    pub confirmation: ConfirmationPolicy,
    /// Background refresh period while a game is active.
    pub refresh_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            confirmation: ConfirmationPolicy::default(),
            refresh_interval: Duration::from_secs(30),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(Network::Testnet)
    }
}

impl ClientConfig {
    pub fn new(network: Network) -> Self {
        let (contract_address, contract_name) = match network {
            Network::Testnet => ("ST264AMXKZA5Y4YVMDPA3CDGFGT7Q885W8R15FK7G", "wordleRush"),
            Network::Mainnet => ("SP264AMXKZA5Y4YVMDPA3CDGFGT7Q885W8R15FK7G", "wordleRush"),
            Network::Simnet => ("ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM", "wordleRush"),
        };

        let mut config = Self {
            network,
            contract_address: contract_address.to_string(),
            contract_name: contract_name.to_string(),
            cache: CacheConfig::default(),
            sync: SyncConfig::default(),
        };

        // Simulated writes land within a block.
        if network == Network::Simnet {
            config.sync.confirmation.initial_delay = Duration::from_millis(500);
            config.sync.confirmation.backoff_base = Duration::from_millis(500);
        }

        config
    }

    /// Fully qualified contract identifier, `address.name`.
    pub fn contract_id(&self) -> String {
        format!("{}.{}", self.contract_address, self.contract_name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.contract_address.is_empty() {
            return Err(GameError::config("Contract address cannot be empty"));
        }

        if self.contract_name.is_empty() {
            return Err(GameError::config("Contract name cannot be empty"));
        }

        self.cache.validate()?;

        if self.sync.max_attempts == 0 {
            return Err(GameError::config("Max attempts must be greater than 0"));
        }

        Ok(())
    }
}
