//! The module contains `Account` struct and its implementation.

use chrono::{DateTime, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AccountLimits, Coins, EngineError, ResultEngine};

/// Longest display name an account can carry.
pub const MAX_NAME_LEN: usize = 16;

/// One of the two balances of an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ledger {
    /// Spendable balance, the one transfers move.
    Liquid,
    /// Savings balance, reachable only through deposit/withdraw.
    Vault,
}

impl Ledger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Liquid => "liquid",
            Self::Vault => "vault",
        }
    }
}

impl TryFrom<&str> for Ledger {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "liquid" | "coins" => Ok(Self::Liquid),
            "vault" | "bank" => Ok(Self::Vault),
            other => Err(EngineError::InvalidAmount(format!("unknown ledger: {other}"))),
        }
    }
}

/// A balance record.
///
/// Balances are only reachable through the mutators below, which clamp every
/// write into `[0, max]` for the matching ledger. Any successful mutation
/// marks the account dirty and bumps its revision.
#[derive(Debug)]
pub struct Account {
    id: Uuid,
    name: String,
    liquid: Coins,
    vault: Coins,
    last_activity: DateTime<Utc>,
    limits: AccountLimits,
    dirty: bool,
    revision: u64,
    detached: bool,
}

impl Account {
    /// A fresh account holding the starting balances.
    pub fn new(
        id: Uuid,
        name: String,
        liquid: Coins,
        vault: Coins,
        limits: AccountLimits,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            liquid: liquid.clamp_to(limits.max_liquid),
            vault: vault.clamp_to(limits.max_vault),
            last_activity: now,
            limits,
            dirty: false,
            revision: 0,
            detached: false,
        }
    }

    /// Rebuild an account from its persisted state.
    ///
    /// Stored balances above the current caps (for example after the caps were
    /// lowered) are clamped and the account is flagged dirty so the clamped
    /// state gets written back.
    pub fn from_snapshot(snapshot: AccountSnapshot, limits: AccountLimits) -> Self {
        let mut account = Self::new(
            snapshot.id,
            snapshot.name,
            snapshot.liquid,
            snapshot.vault,
            limits,
            snapshot.last_activity,
        );
        if account.liquid != snapshot.liquid || account.vault != snapshot.vault {
            account.mark_dirty();
        }
        account
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn liquid(&self) -> Coins {
        self.liquid
    }

    pub fn vault(&self) -> Coins {
        self.vault
    }

    pub fn balance(&self, ledger: Ledger) -> Coins {
        match ledger {
            Ledger::Liquid => self.liquid,
            Ledger::Vault => self.vault,
        }
    }

    pub fn limits(&self) -> AccountLimits {
        self.limits
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Monotonic counter of mutations applied to this instance.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// `true` once the cache evicted this instance. A detached account must
    /// not be mutated: the cache no longer flushes it.
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn total_wealth(&self) -> Coins {
        self.liquid.saturating_add(self.vault)
    }

    pub fn set_liquid(&mut self, amount: Coins) {
        self.liquid = amount.clamp_to(self.limits.max_liquid);
        self.mark_dirty();
    }

    /// Adds `amount`, silently capping at `max_liquid`.
    pub fn add_liquid(&mut self, amount: Coins) {
        self.set_liquid(self.liquid.saturating_add(amount));
    }

    pub fn remove_liquid(&mut self, amount: Coins) -> ResultEngine<()> {
        if self.liquid < amount {
            return Err(EngineError::InsufficientFunds(format!(
                "liquid balance {} is below {amount}",
                self.liquid
            )));
        }
        self.set_liquid(self.liquid - amount);
        Ok(())
    }

    pub fn set_vault(&mut self, amount: Coins) {
        self.vault = amount.clamp_to(self.limits.max_vault);
        self.mark_dirty();
    }

    /// Adds `amount`, silently capping at `max_vault`.
    pub fn add_vault(&mut self, amount: Coins) {
        self.set_vault(self.vault.saturating_add(amount));
    }

    pub fn remove_vault(&mut self, amount: Coins) -> ResultEngine<()> {
        if self.vault < amount {
            return Err(EngineError::InsufficientFunds(format!(
                "vault balance {} is below {amount}",
                self.vault
            )));
        }
        self.set_vault(self.vault - amount);
        Ok(())
    }

    pub fn would_exceed_liquid(&self, extra: Coins) -> bool {
        self.liquid.saturating_add(extra) > self.limits.max_liquid
    }

    pub fn would_exceed_vault(&self, extra: Coins) -> bool {
        self.vault.saturating_add(extra) > self.limits.max_vault
    }

    /// Moves `amount` from liquid to vault, all or nothing.
    pub fn deposit_to_vault(&mut self, amount: Coins) -> ResultEngine<()> {
        if self.liquid < amount {
            return Err(EngineError::InsufficientFunds(format!(
                "liquid balance {} is below {amount}",
                self.liquid
            )));
        }
        if self.would_exceed_vault(amount) {
            return Err(EngineError::MaxBalanceReached(format!(
                "vault would exceed {}",
                self.limits.max_vault
            )));
        }
        self.remove_liquid(amount)?;
        self.add_vault(amount);
        Ok(())
    }

    /// Moves `amount` from vault to liquid, all or nothing.
    pub fn withdraw_from_vault(&mut self, amount: Coins) -> ResultEngine<()> {
        if self.vault < amount {
            return Err(EngineError::InsufficientFunds(format!(
                "vault balance {} is below {amount}",
                self.vault
            )));
        }
        if self.would_exceed_liquid(amount) {
            return Err(EngineError::MaxBalanceReached(format!(
                "liquid would exceed {}",
                self.limits.max_liquid
            )));
        }
        self.remove_vault(amount)?;
        self.add_liquid(amount);
        Ok(())
    }

    pub fn rename(&mut self, name: &str) -> ResultEngine<()> {
        let name = normalize_name(name)?;
        if name != self.name {
            self.name = name;
            self.mark_dirty();
        }
        Ok(())
    }

    /// Records activity without marking the account dirty.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    /// Forces the dirty flag, for collaborators that changed state the
    /// account cannot see.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }

    /// Clears the dirty flag if nothing changed since `revision` was read.
    /// Returns whether the flag was cleared.
    pub(crate) fn mark_saved(&mut self, revision: u64) -> bool {
        if self.revision == revision {
            self.dirty = false;
            true
        } else {
            false
        }
    }

    pub(crate) fn detach(&mut self) {
        self.detached = true;
    }

    /// Owned copy of the persistable state.
    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            id: self.id,
            name: self.name.clone(),
            liquid: self.liquid,
            vault: self.vault,
            last_activity: self.last_activity,
        }
    }
}

/// Validate a display name: trimmed, non-empty, at most [`MAX_NAME_LEN`]
/// characters.
pub fn normalize_name(value: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidName("name must not be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(EngineError::InvalidName(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Persistable state of an account, detached from any lock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub id: Uuid,
    pub name: String,
    pub liquid: Coins,
    pub vault: Coins,
    pub last_activity: DateTime<Utc>,
}

impl AccountSnapshot {
    pub fn balance(&self, ledger: Ledger) -> Coins {
        match ledger {
            Ledger::Liquid => self.liquid,
            Ledger::Vault => self.vault,
        }
    }

    pub fn total_wealth(&self) -> Coins {
        self.liquid.saturating_add(self.vault)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub liquid: i64,
    pub vault: i64,
    pub last_activity: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&AccountSnapshot> for ActiveModel {
    fn from(value: &AccountSnapshot) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            name: ActiveValue::Set(value.name.clone()),
            liquid: ActiveValue::Set(value.liquid.hundredths()),
            vault: ActiveValue::Set(value.vault.hundredths()),
            last_activity: ActiveValue::Set(value.last_activity),
        }
    }
}

impl TryFrom<Model> for AccountSnapshot {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::Storage(format!("invalid account id {}", model.id)))?,
            name: model.name,
            liquid: Coins::new(model.liquid),
            vault: Coins::new(model.vault),
            last_activity: model.last_activity,
        })
    }
}
