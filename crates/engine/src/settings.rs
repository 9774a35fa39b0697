//! Economy and cache settings consumed by the engine.
//!
//! All structs deserialize from the `[economy]` and `[cache]` tables of the
//! application settings. Missing keys fall back to the defaults below.

use std::time::Duration;

use serde::Deserialize;

use crate::{Coins, EngineError, ResultEngine};

/// Upper bounds of the two ledgers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountLimits {
    pub max_liquid: Coins,
    pub max_vault: Coins,
}

impl Default for AccountLimits {
    fn default() -> Self {
        Self {
            max_liquid: Coins::whole(999_999_999),
            max_vault: Coins::whole(999_999_999),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransferSettings {
    pub enabled: bool,
    pub min_amount: Coins,
    pub max_amount: Coins,
    /// Fee in percent of the transferred amount (`2.5` means 2.5%).
    pub fee_percentage: Coins,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_amount: Coins::whole(1),
            max_amount: Coins::whole(100_000),
            fee_percentage: Coins::ZERO,
        }
    }
}

impl TransferSettings {
    /// Fee charged to the sender on top of `amount`.
    #[must_use]
    pub fn fee(&self, amount: Coins) -> Coins {
        amount.percent(self.fee_percentage)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct EconomySettings {
    pub max_liquid: Coins,
    pub max_vault: Coins,
    pub starting_liquid: Coins,
    pub starting_vault: Coins,
    pub transfer: TransferSettings,
}

impl Default for EconomySettings {
    fn default() -> Self {
        let limits = AccountLimits::default();
        Self {
            max_liquid: limits.max_liquid,
            max_vault: limits.max_vault,
            starting_liquid: Coins::whole(100),
            starting_vault: Coins::ZERO,
            transfer: TransferSettings::default(),
        }
    }
}

impl EconomySettings {
    #[must_use]
    pub fn limits(&self) -> AccountLimits {
        AccountLimits {
            max_liquid: self.max_liquid,
            max_vault: self.max_vault,
        }
    }

    /// Rejects settings that would make the account invariants unreachable.
    pub fn validate(&self) -> ResultEngine<()> {
        if self.max_liquid.is_negative() || self.max_vault.is_negative() {
            return Err(EngineError::Config(
                "max_liquid and max_vault must be >= 0".to_string(),
            ));
        }
        if self.starting_liquid.is_negative() || self.starting_liquid > self.max_liquid {
            return Err(EngineError::Config(format!(
                "starting_liquid must be within [0, {}]",
                self.max_liquid
            )));
        }
        if self.starting_vault.is_negative() || self.starting_vault > self.max_vault {
            return Err(EngineError::Config(format!(
                "starting_vault must be within [0, {}]",
                self.max_vault
            )));
        }
        let transfer = &self.transfer;
        if transfer.min_amount > transfer.max_amount {
            return Err(EngineError::Config(
                "transfer.min_amount exceeds transfer.max_amount".to_string(),
            ));
        }
        if transfer.fee_percentage.is_negative() {
            return Err(EngineError::Config(
                "transfer.fee_percentage must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheSettings {
    pub flush_interval_seconds: u64,
    pub idle_ttl_seconds: u64,
    pub eviction_interval_seconds: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            flush_interval_seconds: 300,
            idle_ttl_seconds: 1800,
            eviction_interval_seconds: 600,
        }
    }
}

impl CacheSettings {
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_seconds.max(1))
    }

    #[must_use]
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_seconds)
    }

    #[must_use]
    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_seconds.max(1))
    }
}
