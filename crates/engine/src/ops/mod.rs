use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    Account, AccountCache, BalanceEvent, Coins, EconomySettings, EngineError, ResultEngine,
    TransferHook,
    events::{EventBus, TransferHooks},
    store::{AccountStore, MemoryStore},
};

mod balances;
mod queries;
mod transfers;

pub use balances::{BalanceChange, LedgerMove};
pub use transfers::{TransferQuote, TransferReceipt};

/// Validated, atomic balance operations over the [`AccountCache`].
///
/// Every mutation runs inside the critical section of the account it touches
/// and emits one [`BalanceEvent`] per changed ledger once the section is left.
#[derive(Debug)]
pub struct Engine {
    cache: Arc<AccountCache>,
    settings: EconomySettings,
    events: EventBus,
    hooks: TransferHooks,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn cache(&self) -> &Arc<AccountCache> {
        &self.cache
    }

    pub fn settings(&self) -> &EconomySettings {
        &self.settings
    }

    /// New stream of balance events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<BalanceEvent> {
        self.events.subscribe()
    }

    /// Registers a hook consulted before every transfer commits.
    pub fn add_transfer_hook(&self, hook: Arc<dyn TransferHook>) {
        self.hooks.add(hook);
    }

    /// Runs `f` inside the critical section of account `id`, loading it if
    /// needed. An instance evicted between lookup and lock is re-resolved.
    async fn with_account<T, F>(&self, id: Uuid, f: F) -> ResultEngine<T>
    where
        F: FnOnce(&mut Account) -> ResultEngine<T>,
    {
        loop {
            let handle = self.cache.load(id).await;
            let mut account = handle.lock();
            if account.is_detached() {
                continue;
            }
            return f(&mut account);
        }
    }
}

fn ensure_positive(amount: Coins) -> ResultEngine<()> {
    if !amount.is_positive() {
        return Err(EngineError::InvalidAmount(format!(
            "amount must be > 0, got {amount}"
        )));
    }
    Ok(())
}

fn ensure_not_negative(amount: Coins) -> ResultEngine<()> {
    if amount.is_negative() {
        return Err(EngineError::InvalidAmount(format!(
            "amount must be >= 0, got {amount}"
        )));
    }
    Ok(())
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    store: Option<Arc<dyn AccountStore>>,
    cache: Option<Arc<AccountCache>>,
    settings: Option<EconomySettings>,
}

impl EngineBuilder {
    /// Pass the store backing the cache. Defaults to a [`MemoryStore`].
    pub fn store(mut self, store: Arc<dyn AccountStore>) -> EngineBuilder {
        self.store = Some(store);
        self
    }

    /// Reuse an existing cache instead of building one from the store.
    pub fn cache(mut self, cache: Arc<AccountCache>) -> EngineBuilder {
        self.cache = Some(cache);
        self
    }

    /// Pass the economy settings. Ignored when a cache is given: the engine
    /// then follows the cache's settings.
    pub fn settings(mut self, settings: EconomySettings) -> EngineBuilder {
        self.settings = Some(settings);
        self
    }

    /// Construct `Engine`
    pub fn build(self) -> ResultEngine<Engine> {
        let cache = match self.cache {
            Some(cache) => cache,
            None => {
                let settings = self.settings.unwrap_or_default();
                settings.validate()?;
                let store: Arc<dyn AccountStore> = match self.store {
                    Some(store) => store,
                    None => Arc::new(MemoryStore::new()),
                };
                Arc::new(AccountCache::new(store, settings))
            }
        };
        let settings = cache.settings().clone();
        settings.validate()?;

        Ok(Engine {
            cache,
            settings,
            events: EventBus::new(),
            hooks: TransferHooks::default(),
        })
    }
}
