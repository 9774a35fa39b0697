//! Write-back cache of accounts.
//!
//! The cache keeps a single in-memory [`Account`] per id and is the only
//! component that talks to the [`AccountStore`]. It:
//!
//! - loads accounts lazily, collapsing concurrent loads of the same id into a
//!   single store read;
//! - keeps a lowercased `name -> id` index for name lookups;
//! - flushes dirty accounts, clearing the dirty flag only when no mutation
//!   happened while the save was in flight;
//! - evicts idle accounts after a final flush.
//!
//! Each account lives behind its own lock (see [`AccountHandle`]). That lock
//! is the per-account critical section: every read-modify-write of balances
//! happens while holding it and it is never held across an `.await`.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::{DashMap, DashSet};
use futures::future::join_all;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::{
    Account, AccountSnapshot, EconomySettings, Ledger, ResultEngine, store::AccountStore,
};

/// Shared reference to a cached account.
///
/// Cloning is cheap; clones point to the same account. Lock it with
/// [`AccountHandle::lock`] to read or mutate balances.
#[derive(Clone, Debug)]
pub struct AccountHandle {
    inner: Arc<Entry>,
}

#[derive(Debug)]
struct Entry {
    account: Mutex<Account>,
    /// Serializes saves of this account so an older snapshot never lands in
    /// the store after a newer one.
    flush: tokio::sync::Mutex<()>,
}

impl AccountHandle {
    fn new(account: Account) -> Self {
        Self {
            inner: Arc::new(Entry {
                account: Mutex::new(account),
                flush: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Enters the account's critical section.
    pub fn lock(&self) -> MutexGuard<'_, Account> {
        self.inner.account.lock()
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        self.lock().snapshot()
    }

    /// `true` if both handles point to the same in-memory account.
    pub fn ptr_eq(&self, other: &AccountHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

type Slot = Arc<OnceCell<AccountHandle>>;

/// Tells whether an account is in use and must not be evicted.
pub trait Presence: Send + Sync {
    fn is_active(&self, id: Uuid) -> bool;
}

impl<F> Presence for F
where
    F: Fn(Uuid) -> bool + Send + Sync,
{
    fn is_active(&self, id: Uuid) -> bool {
        self(id)
    }
}

/// Presence source for processes without sessions: nobody is ever active.
#[derive(Clone, Copy, Debug, Default)]
pub struct NobodyActive;

impl Presence for NobodyActive {
    fn is_active(&self, _id: Uuid) -> bool {
        false
    }
}

/// Outcome of a flush pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Saves that cleared the dirty flag.
    pub saved: usize,
    /// Saves that completed while a newer mutation arrived; still dirty.
    pub superseded: usize,
    /// Saves that failed; still dirty, retried on the next pass.
    pub failed: usize,
}

impl FlushReport {
    fn record(&mut self, outcome: FlushOutcome) {
        match outcome {
            FlushOutcome::Clean => {}
            FlushOutcome::Saved => self.saved += 1,
            FlushOutcome::Superseded => self.superseded += 1,
            FlushOutcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FlushOutcome {
    Clean,
    Saved,
    Superseded,
    Failed,
}

pub struct AccountCache {
    store: Arc<dyn AccountStore>,
    settings: EconomySettings,
    accounts: DashMap<Uuid, Slot>,
    names: DashMap<String, Uuid>,
    pending_release: DashSet<Uuid>,
}

impl std::fmt::Debug for AccountCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountCache")
            .field("accounts", &self.accounts.len())
            .field("names", &self.names.len())
            .finish()
    }
}

impl AccountCache {
    pub fn new(store: Arc<dyn AccountStore>, settings: EconomySettings) -> Self {
        Self {
            store,
            settings,
            accounts: DashMap::new(),
            names: DashMap::new(),
            pending_release: DashSet::new(),
        }
    }

    pub fn settings(&self) -> &EconomySettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn AccountStore> {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.peek(id).is_some()
    }

    fn slot(&self, id: Uuid) -> Slot {
        self.accounts.entry(id).or_default().clone()
    }

    /// Cached handles, without waiting on in-flight loads.
    fn entries(&self) -> Vec<(Uuid, AccountHandle)> {
        self.accounts
            .iter()
            .filter_map(|entry| entry.value().get().map(|h| (*entry.key(), h.clone())))
            .collect()
    }

    fn index(&self, account: &Account) {
        if !account.name().is_empty() {
            self.names.insert(account.name().to_lowercase(), account.id());
        }
    }

    fn unindex(&self, id: Uuid, name: &str) {
        self.names.remove_if(&name.to_lowercase(), |_, indexed| *indexed == id);
    }

    fn default_account(&self, id: Uuid) -> Account {
        Account::new(
            id,
            String::new(),
            self.settings.starting_liquid,
            self.settings.starting_vault,
            self.settings.limits(),
            Utc::now(),
        )
    }

    async fn fetch(&self, id: Uuid) -> AccountHandle {
        let account = match self.store.load_by_id(id).await {
            Ok(Some(snapshot)) => {
                tracing::debug!("loaded account {id} from store");
                Account::from_snapshot(snapshot, self.settings.limits())
            }
            Ok(None) => {
                tracing::debug!("account {id} not stored yet, using starting balances");
                self.default_account(id)
            }
            Err(err) => {
                // A transient failure here means a later save may overwrite
                // the stored record with starting balances.
                tracing::error!("failed to load account {id}, using starting balances: {err}");
                self.default_account(id)
            }
        };
        self.index(&account);
        AccountHandle::new(account)
    }

    /// Returns the cached account, loading it on a miss.
    ///
    /// Concurrent calls for the same uncached id share one store read and
    /// resolve to the same handle. A missing record yields an account with the
    /// starting balances; so does a failed read, which is logged.
    pub async fn load(&self, id: Uuid) -> AccountHandle {
        self.pending_release.remove(&id);
        loop {
            let slot = self.slot(id);
            let handle = slot.get_or_init(|| self.fetch(id)).await.clone();
            let live = {
                let mut account = handle.lock();
                if !account.is_detached() {
                    account.touch(Utc::now());
                    true
                } else {
                    false
                }
            };
            if live {
                return handle;
            }
            // Evicted between lookup and lock; the slot is gone, retry.
            tracing::debug!("account {id} was evicted during load, retrying");
        }
    }

    /// Like [`load`](Self::load), then adopts `name` as the display name.
    pub async fn load_named(&self, id: Uuid, name: &str) -> AccountHandle {
        let handle = self.load(id).await;
        if let Err(err) = self.rename_handle(&handle, name) {
            tracing::warn!("ignoring name {name:?} for account {id}: {err}");
        }
        handle
    }

    /// Cached handle, if any. Never suspends and never hits the store.
    pub fn peek(&self, id: Uuid) -> Option<AccountHandle> {
        let handle = self.accounts.get(&id)?.get()?.clone();
        let live = !handle.lock().is_detached();
        live.then_some(handle)
    }

    /// Looks an account up by display name, case-insensitively.
    ///
    /// The name index is checked first; on a miss the store is queried and
    /// the result is cached. An already cached instance always wins over the
    /// stored copy.
    pub async fn find_by_name(&self, name: &str) -> ResultEngine<Option<AccountHandle>> {
        let key = name.trim().to_lowercase();
        if key.is_empty() {
            return Ok(None);
        }

        let indexed = self.names.get(&key).map(|entry| *entry.value());
        if let Some(handle) = indexed.and_then(|id| self.peek(id)) {
            let matches = handle.lock().name().to_lowercase() == key;
            if matches {
                return Ok(Some(handle));
            }
        }

        let Some(snapshot) = self.store.find_by_name(&key).await? else {
            return Ok(None);
        };
        let id = snapshot.id;
        let limits = self.settings.limits();
        let slot = self.slot(id);
        let handle = slot
            .get_or_init(|| async move {
                let account = Account::from_snapshot(snapshot, limits);
                self.index(&account);
                AccountHandle::new(account)
            })
            .await
            .clone();

        let mut account = handle.lock();
        if account.is_detached() || account.name().to_lowercase() != key {
            // Evicted meanwhile, or the cached copy was renamed since the
            // stored record was written.
            return Ok(None);
        }
        account.touch(Utc::now());
        drop(account);
        Ok(Some(handle))
    }

    fn rename_handle(&self, handle: &AccountHandle, name: &str) -> ResultEngine<()> {
        let mut account = handle.lock();
        let old = account.name().to_string();
        account.rename(name)?;
        if old != account.name() {
            self.unindex(account.id(), &old);
        }
        self.index(&account);
        Ok(())
    }

    /// Changes the display name of an account and updates the name index.
    pub async fn rename(&self, id: Uuid, name: &str) -> ResultEngine<()> {
        let handle = self.load(id).await;
        self.rename_handle(&handle, name)
    }

    /// Flags a cached account dirty. Returns `false` if it is not cached.
    pub fn mark_dirty(&self, id: Uuid) -> bool {
        match self.peek(id) {
            Some(handle) => {
                handle.lock().mark_dirty();
                true
            }
            None => false,
        }
    }

    async fn flush_handle(&self, handle: &AccountHandle) -> FlushOutcome {
        let _flushing = handle.inner.flush.lock().await;

        let (snapshot, revision) = {
            let account = handle.lock();
            if !account.is_dirty() || account.is_detached() {
                return FlushOutcome::Clean;
            }
            (account.snapshot(), account.revision())
        };

        match self.store.save(&snapshot).await {
            Ok(()) => {
                if handle.lock().mark_saved(revision) {
                    FlushOutcome::Saved
                } else {
                    FlushOutcome::Superseded
                }
            }
            Err(err) => {
                tracing::warn!("failed to save account {}: {err}", snapshot.id);
                FlushOutcome::Failed
            }
        }
    }

    /// Saves every dirty account.
    pub async fn flush_dirty(&self) -> FlushReport {
        let handles: Vec<AccountHandle> = self
            .entries()
            .into_iter()
            .map(|(_, handle)| handle)
            .filter(|handle| handle.lock().is_dirty())
            .collect();

        let mut report = FlushReport::default();
        for outcome in join_all(handles.iter().map(|h| self.flush_handle(h))).await {
            report.record(outcome);
        }

        if report != FlushReport::default() {
            tracing::info!(
                saved = report.saved,
                superseded = report.superseded,
                failed = report.failed,
                "flushed dirty accounts"
            );
        }
        report
    }

    /// Saves one account if it is cached and dirty. Returns whether the
    /// account is clean afterwards.
    pub async fn save(&self, id: Uuid) -> bool {
        match self.peek(id) {
            Some(handle) => matches!(
                self.flush_handle(&handle).await,
                FlushOutcome::Clean | FlushOutcome::Saved
            ),
            None => true,
        }
    }

    /// Flushes and removes one account if `evictable` still holds after the
    /// flush. An account mutated during the flush, or whose save failed,
    /// stays cached.
    async fn evict_one<F>(&self, id: Uuid, handle: &AccountHandle, evictable: F) -> bool
    where
        F: Fn(&Account) -> bool,
    {
        let _flushing = handle.inner.flush.lock().await;

        let (pending, seen_revision) = {
            let account = handle.lock();
            if account.is_detached() || !evictable(&account) {
                return false;
            }
            let pending = account.is_dirty().then(|| account.snapshot());
            (pending, account.revision())
        };

        if let Some(snapshot) = pending
            && let Err(err) = self.store.save(&snapshot).await
        {
            tracing::warn!("keeping account {id} cached, final save failed: {err}");
            return false;
        }

        let mut account = handle.lock();
        if account.revision() != seen_revision || !evictable(&account) {
            return false;
        }
        account.mark_saved(seen_revision);
        account.detach();
        self.accounts
            .remove_if(&id, |_, slot| slot.get().is_some_and(|h| h.ptr_eq(handle)));
        self.unindex(id, account.name());
        self.pending_release.remove(&id);
        true
    }

    /// Evicts accounts idle for longer than `ttl` that `presence` reports as
    /// inactive. Returns the number of evicted accounts.
    pub async fn evict_idle(&self, ttl: Duration, presence: &dyn Presence) -> usize {
        self.evict_idle_at(Utc::now(), ttl, presence).await
    }

    /// [`evict_idle`](Self::evict_idle) against an explicit clock reading.
    pub async fn evict_idle_at(
        &self,
        now: DateTime<Utc>,
        ttl: Duration,
        presence: &dyn Presence,
    ) -> usize {
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        let is_idle = |account: &Account| now.signed_duration_since(account.last_activity()) > ttl;

        let mut evicted = 0;
        for (id, handle) in self.entries() {
            if presence.is_active(id) || !is_idle(&handle.lock()) {
                continue;
            }
            if self.evict_one(id, &handle, is_idle).await {
                evicted += 1;
            }
        }

        if evicted > 0 {
            tracing::info!("evicted {evicted} idle accounts, {} cached", self.len());
        }
        evicted
    }

    /// Marks an account for removal once its session ends.
    pub fn schedule_release(&self, id: Uuid) {
        self.pending_release.insert(id);
    }

    /// Keeps the account cached after all, e.g. when the session resumes.
    pub fn cancel_release(&self, id: Uuid) {
        self.pending_release.remove(&id);
    }

    pub fn is_release_pending(&self, id: Uuid) -> bool {
        self.pending_release.contains(&id)
    }

    /// Flushes and removes an account previously passed to
    /// [`schedule_release`](Self::schedule_release). Does nothing if the
    /// release was cancelled meanwhile.
    pub async fn release(&self, id: Uuid) -> bool {
        if !self.pending_release.contains(&id) {
            return false;
        }
        let Some(handle) = self.peek(id) else {
            self.pending_release.remove(&id);
            return false;
        };
        self.evict_one(id, &handle, |_| self.pending_release.contains(&id))
            .await
    }

    /// Flushes everything, then empties the cache. Accounts whose save fails
    /// stay cached.
    pub async fn clear(&self) -> usize {
        let mut removed = 0;
        for (id, handle) in self.entries() {
            if self.evict_one(id, &handle, |_| true).await {
                removed += 1;
            }
        }
        removed
    }

    /// Leaderboard straight from the store, after flushing pending writes so
    /// the ordering reflects in-memory balances.
    pub async fn top(&self, limit: usize, metric: Ledger) -> ResultEngine<Vec<AccountSnapshot>> {
        self.flush_dirty().await;
        self.store.list_top(limit, metric).await
    }
}
