#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use engine::{
    AccountCache, AccountSnapshot, EconomySettings, EngineError, Ledger, ResultEngine,
    store::{AccountStore, MemoryStore},
};
use uuid::Uuid;

/// Memory store with knobs: slow loads, slow saves, failing loads and saves.
#[derive(Debug, Default)]
pub struct ScriptedStore {
    pub inner: MemoryStore,
    load_delay: Duration,
    save_delay: Duration,
    fail_loads: AtomicBool,
    failed_loads: AtomicU64,
    fail_saves: AtomicBool,
    failed_saves: AtomicU64,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = delay;
        self
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn loads(&self) -> u64 {
        self.inner.loads()
    }

    pub fn saves(&self) -> u64 {
        self.inner.saves()
    }

    pub fn failed_loads(&self) -> u64 {
        self.failed_loads.load(Ordering::SeqCst)
    }

    pub fn failed_saves(&self) -> u64 {
        self.failed_saves.load(Ordering::SeqCst)
    }

    pub fn get(&self, id: Uuid) -> Option<AccountSnapshot> {
        self.inner.get(id)
    }
}

#[async_trait]
impl AccountStore for ScriptedStore {
    async fn load_by_id(&self, id: Uuid) -> ResultEngine<Option<AccountSnapshot>> {
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        if self.fail_loads.load(Ordering::SeqCst) {
            self.failed_loads.fetch_add(1, Ordering::SeqCst);
            return Err(EngineError::Storage("connection reset".to_string()));
        }
        self.inner.load_by_id(id).await
    }

    async fn find_by_name(&self, name: &str) -> ResultEngine<Option<AccountSnapshot>> {
        self.inner.find_by_name(name).await
    }

    async fn save(&self, snapshot: &AccountSnapshot) -> ResultEngine<()> {
        if !self.save_delay.is_zero() {
            tokio::time::sleep(self.save_delay).await;
        }
        if self.fail_saves.load(Ordering::SeqCst) {
            self.failed_saves.fetch_add(1, Ordering::SeqCst);
            return Err(EngineError::Storage("disk on fire".to_string()));
        }
        self.inner.save(snapshot).await
    }

    async fn list_top(&self, limit: usize, metric: Ledger) -> ResultEngine<Vec<AccountSnapshot>> {
        self.inner.list_top(limit, metric).await
    }

    async fn count(&self) -> ResultEngine<u64> {
        self.inner.count().await
    }

    async fn list_all(&self) -> ResultEngine<Vec<AccountSnapshot>> {
        self.inner.list_all().await
    }
}

pub fn cache_over(store: Arc<ScriptedStore>) -> Arc<AccountCache> {
    Arc::new(AccountCache::new(store, EconomySettings::default()))
}
