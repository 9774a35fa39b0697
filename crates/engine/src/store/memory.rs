use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::AccountStore;
use crate::{AccountSnapshot, Ledger, ResultEngine};

/// Process-local store. Records vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, AccountSnapshot>>,
    stats: MemoryStoreStats,
}

/// Call counters, handy to observe cache behavior.
#[derive(Debug, Default)]
pub struct MemoryStoreStats {
    pub loads: AtomicU64,
    pub saves: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `records`.
    pub fn with_records(records: impl IntoIterator<Item = AccountSnapshot>) -> Self {
        let store = Self::new();
        store
            .records
            .write()
            .extend(records.into_iter().map(|r| (r.id, r)));
        store
    }

    pub fn get(&self, id: Uuid) -> Option<AccountSnapshot> {
        self.records.read().get(&id).cloned()
    }

    pub fn loads(&self) -> u64 {
        self.stats.loads.load(Ordering::Relaxed)
    }

    pub fn saves(&self) -> u64 {
        self.stats.saves.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn load_by_id(&self, id: Uuid) -> ResultEngine<Option<AccountSnapshot>> {
        self.stats.loads.fetch_add(1, Ordering::Relaxed);
        Ok(self.get(id))
    }

    async fn find_by_name(&self, name: &str) -> ResultEngine<Option<AccountSnapshot>> {
        self.stats.loads.fetch_add(1, Ordering::Relaxed);
        let needle = name.to_lowercase();
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.name.to_lowercase() == needle)
            .max_by_key(|r| r.last_activity)
            .cloned())
    }

    async fn save(&self, snapshot: &AccountSnapshot) -> ResultEngine<()> {
        self.stats.saves.fetch_add(1, Ordering::Relaxed);
        self.records.write().insert(snapshot.id, snapshot.clone());
        Ok(())
    }

    async fn list_top(&self, limit: usize, metric: Ledger) -> ResultEngine<Vec<AccountSnapshot>> {
        let mut all: Vec<AccountSnapshot> = self.records.read().values().cloned().collect();
        all.sort_by(|a, b| {
            b.balance(metric)
                .cmp(&a.balance(metric))
                .then_with(|| a.name.cmp(&b.name))
        });
        all.truncate(limit);
        Ok(all)
    }

    async fn count(&self) -> ResultEngine<u64> {
        Ok(self.records.read().len() as u64)
    }

    async fn list_all(&self) -> ResultEngine<Vec<AccountSnapshot>> {
        Ok(self.records.read().values().cloned().collect())
    }
}
