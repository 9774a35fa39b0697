use serde::Serialize;
use uuid::Uuid;

use crate::{Account, BalanceCause, BalanceEvent, Coins, Ledger, ResultEngine};

use super::{Engine, ensure_not_negative, ensure_positive};

/// Outcome of a single-ledger mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BalanceChange {
    pub account: Uuid,
    pub ledger: Ledger,
    pub old: Coins,
    pub new: Coins,
    /// Balance the caller asked for before the cap was applied.
    pub requested: Coins,
}

impl BalanceChange {
    /// `true` when the ledger cap cut the requested balance.
    pub fn capped(&self) -> bool {
        self.new < self.requested
    }

    pub fn difference(&self) -> Coins {
        self.new - self.old
    }

    pub(super) fn event(&self, cause: BalanceCause) -> BalanceEvent {
        BalanceEvent {
            account: self.account,
            ledger: self.ledger,
            old: self.old,
            new: self.new,
            cause,
        }
    }
}

/// Outcome of a move between the two ledgers of one account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LedgerMove {
    pub liquid: BalanceChange,
    pub vault: BalanceChange,
}

impl LedgerMove {
    fn events(&self, cause: BalanceCause) -> [BalanceEvent; 2] {
        [self.liquid.event(cause), self.vault.event(cause)]
    }
}

fn set(account: &mut Account, ledger: Ledger, amount: Coins) {
    match ledger {
        Ledger::Liquid => account.set_liquid(amount),
        Ledger::Vault => account.set_vault(amount),
    }
}

fn add(account: &mut Account, ledger: Ledger, amount: Coins) {
    match ledger {
        Ledger::Liquid => account.add_liquid(amount),
        Ledger::Vault => account.add_vault(amount),
    }
}

fn remove(account: &mut Account, ledger: Ledger, amount: Coins) -> ResultEngine<()> {
    match ledger {
        Ledger::Liquid => account.remove_liquid(amount),
        Ledger::Vault => account.remove_vault(amount),
    }
}

fn change_of(account: &Account, ledger: Ledger, old: Coins, requested: Coins) -> BalanceChange {
    BalanceChange {
        account: account.id(),
        ledger,
        old,
        new: account.balance(ledger),
        requested,
    }
}

impl Engine {
    async fn balance(&self, id: Uuid, ledger: Ledger) -> ResultEngine<Coins> {
        self.with_account(id, |account| Ok(account.balance(ledger)))
            .await
    }

    async fn set_balance(
        &self,
        id: Uuid,
        ledger: Ledger,
        amount: Coins,
    ) -> ResultEngine<BalanceChange> {
        ensure_not_negative(amount)?;
        self.with_account(id, |account| {
            let old = account.balance(ledger);
            set(account, ledger, amount);
            let change = change_of(account, ledger, old, amount);
            self.events.emit(change.event(BalanceCause::Set));
            Ok(change)
        })
        .await
    }

    async fn add_balance(
        &self,
        id: Uuid,
        ledger: Ledger,
        amount: Coins,
    ) -> ResultEngine<BalanceChange> {
        ensure_positive(amount)?;
        let change = self
            .with_account(id, |account| {
                let old = account.balance(ledger);
                add(account, ledger, amount);
                let change = change_of(account, ledger, old, old.saturating_add(amount));
                self.events.emit(change.event(BalanceCause::Add));
                Ok(change)
            })
            .await?;
        if change.capped() {
            tracing::debug!(
                "{} balance of {id} capped at {}",
                ledger.as_str(),
                change.new
            );
        }
        Ok(change)
    }

    async fn remove_balance(
        &self,
        id: Uuid,
        ledger: Ledger,
        amount: Coins,
    ) -> ResultEngine<BalanceChange> {
        ensure_positive(amount)?;
        self.with_account(id, |account| {
            let old = account.balance(ledger);
            remove(account, ledger, amount)?;
            let change = change_of(account, ledger, old, old - amount);
            self.events.emit(change.event(BalanceCause::Remove));
            Ok(change)
        })
        .await
    }

    pub async fn liquid(&self, id: Uuid) -> ResultEngine<Coins> {
        self.balance(id, Ledger::Liquid).await
    }

    /// Sets the liquid balance. Negative amounts are rejected, amounts above
    /// the cap are clamped.
    pub async fn set_liquid(&self, id: Uuid, amount: Coins) -> ResultEngine<BalanceChange> {
        self.set_balance(id, Ledger::Liquid, amount).await
    }

    /// Adds to the liquid balance, capping at `max_liquid`. Check
    /// [`BalanceChange::capped`] to know whether the cap was hit.
    pub async fn add_liquid(&self, id: Uuid, amount: Coins) -> ResultEngine<BalanceChange> {
        self.add_balance(id, Ledger::Liquid, amount).await
    }

    pub async fn remove_liquid(&self, id: Uuid, amount: Coins) -> ResultEngine<BalanceChange> {
        self.remove_balance(id, Ledger::Liquid, amount).await
    }

    pub async fn vault(&self, id: Uuid) -> ResultEngine<Coins> {
        self.balance(id, Ledger::Vault).await
    }

    pub async fn set_vault(&self, id: Uuid, amount: Coins) -> ResultEngine<BalanceChange> {
        self.set_balance(id, Ledger::Vault, amount).await
    }

    pub async fn add_vault(&self, id: Uuid, amount: Coins) -> ResultEngine<BalanceChange> {
        self.add_balance(id, Ledger::Vault, amount).await
    }

    pub async fn remove_vault(&self, id: Uuid, amount: Coins) -> ResultEngine<BalanceChange> {
        self.remove_balance(id, Ledger::Vault, amount).await
    }

    /// Moves `amount` from liquid to vault. Nothing changes on failure.
    pub async fn deposit(&self, id: Uuid, amount: Coins) -> ResultEngine<LedgerMove> {
        ensure_positive(amount)?;
        self.with_account(id, |account| {
            let (liquid, vault) = (account.liquid(), account.vault());
            account.deposit_to_vault(amount)?;
            let moved = LedgerMove {
                liquid: change_of(account, Ledger::Liquid, liquid, liquid - amount),
                vault: change_of(account, Ledger::Vault, vault, vault + amount),
            };
            self.events.emit_all(moved.events(BalanceCause::Deposit));
            Ok(moved)
        })
        .await
    }

    /// Moves `amount` from vault to liquid. Nothing changes on failure.
    pub async fn withdraw(&self, id: Uuid, amount: Coins) -> ResultEngine<LedgerMove> {
        ensure_positive(amount)?;
        self.with_account(id, |account| {
            let (liquid, vault) = (account.liquid(), account.vault());
            account.withdraw_from_vault(amount)?;
            let moved = LedgerMove {
                liquid: change_of(account, Ledger::Liquid, liquid, liquid + amount),
                vault: change_of(account, Ledger::Vault, vault, vault - amount),
            };
            self.events.emit_all(moved.events(BalanceCause::Withdraw));
            Ok(moved)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::{EconomySettings, EngineError};

    use super::*;

    fn engine(max_liquid: i64) -> Engine {
        Engine::builder()
            .settings(EconomySettings {
                max_liquid: Coins::whole(max_liquid),
                max_vault: Coins::whole(500),
                ..EconomySettings::default()
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn add_caps_and_reports_it() {
        let engine = engine(1000);
        let id = Uuid::new_v4();
        engine.set_liquid(id, Coins::whole(990)).await.unwrap();

        let change = engine.add_liquid(id, Coins::whole(50)).await.unwrap();

        assert!(change.capped());
        assert_eq!(change.new, Coins::whole(1000));
        assert_eq!(change.requested, Coins::whole(1040));
        assert_eq!(engine.liquid(id).await.unwrap(), Coins::whole(1000));
    }

    #[tokio::test]
    async fn remove_rejects_overdraft_without_mutation() {
        let engine = engine(1000);
        let id = Uuid::new_v4();

        let err = engine.remove_liquid(id, Coins::whole(101)).await.unwrap_err();

        assert!(matches!(err, EngineError::InsufficientFunds(_)));
        assert_eq!(engine.liquid(id).await.unwrap(), Coins::whole(100));
        let change = engine.remove_liquid(id, Coins::whole(100)).await.unwrap();
        assert_eq!(change.new, Coins::ZERO);
    }

    #[tokio::test]
    async fn non_positive_amounts_are_rejected() {
        let engine = engine(1000);
        let id = Uuid::new_v4();
        let mut events = engine.subscribe();

        for amount in [Coins::ZERO, Coins::whole(-5)] {
            assert!(matches!(
                engine.add_vault(id, amount).await,
                Err(EngineError::InvalidAmount(_))
            ));
            assert!(matches!(
                engine.deposit(id, amount).await,
                Err(EngineError::InvalidAmount(_))
            ));
        }
        assert!(matches!(
            engine.set_vault(id, Coins::new(-1)).await,
            Err(EngineError::InvalidAmount(_))
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn set_clamps_to_cap() {
        let engine = engine(1000);
        let id = Uuid::new_v4();

        let change = engine.set_vault(id, Coins::whole(9000)).await.unwrap();

        assert_eq!(change.new, Coins::whole(500));
        assert!(change.capped());
    }

    #[tokio::test]
    async fn deposit_moves_both_ledgers_and_emits_two_events() {
        let engine = engine(1000);
        let id = Uuid::new_v4();
        let mut events = engine.subscribe();

        let moved = engine.deposit(id, Coins::whole(40)).await.unwrap();

        assert_eq!(moved.liquid.new, Coins::whole(60));
        assert_eq!(moved.vault.new, Coins::whole(40));
        let first = events.recv().await.unwrap();
        let second = events.recv().await.unwrap();
        assert_eq!(first.ledger, Ledger::Liquid);
        assert_eq!(first.difference(), Coins::whole(-40));
        assert_eq!(second.ledger, Ledger::Vault);
        assert_eq!(second.cause, BalanceCause::Deposit);
    }

    #[tokio::test]
    async fn deposit_over_vault_cap_changes_nothing() {
        let engine = engine(1000);
        let id = Uuid::new_v4();
        engine.set_vault(id, Coins::whole(480)).await.unwrap();

        let err = engine.deposit(id, Coins::whole(50)).await.unwrap_err();

        assert!(matches!(err, EngineError::MaxBalanceReached(_)));
        assert_eq!(engine.liquid(id).await.unwrap(), Coins::whole(100));
        assert_eq!(engine.vault(id).await.unwrap(), Coins::whole(480));
    }

    #[tokio::test]
    async fn withdraw_needs_vault_funds() {
        let engine = engine(1000);
        let id = Uuid::new_v4();
        engine.set_vault(id, Coins::whole(30)).await.unwrap();

        assert!(matches!(
            engine.withdraw(id, Coins::whole(31)).await,
            Err(EngineError::InsufficientFunds(_))
        ));
        let moved = engine.withdraw(id, Coins::whole(30)).await.unwrap();
        assert_eq!(moved.liquid.new, Coins::whole(130));
        assert_eq!(moved.vault.new, Coins::ZERO);
    }
}
