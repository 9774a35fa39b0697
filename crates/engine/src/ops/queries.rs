use uuid::Uuid;

use crate::{AccountSnapshot, Coins, Ledger, ResultEngine};

use super::Engine;

impl Engine {
    /// Current state of an account, loading it (or starting it) if needed.
    pub async fn account(&self, id: Uuid) -> ResultEngine<AccountSnapshot> {
        self.with_account(id, |account| Ok(account.snapshot())).await
    }

    /// Case-insensitive lookup by display name.
    pub async fn account_by_name(&self, name: &str) -> ResultEngine<Option<AccountSnapshot>> {
        Ok(self
            .cache
            .find_by_name(name)
            .await?
            .map(|handle| handle.snapshot()))
    }

    pub async fn total_wealth(&self, id: Uuid) -> ResultEngine<Coins> {
        self.with_account(id, |account| Ok(account.total_wealth()))
            .await
    }

    /// Richest accounts by `metric`, unsaved balances included.
    pub async fn top(&self, limit: usize, metric: Ledger) -> ResultEngine<Vec<AccountSnapshot>> {
        self.cache.top(limit, metric).await
    }
}
