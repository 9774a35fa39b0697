//! Durable storage behind the account cache.
//!
//! [`AccountStore`] is the only way the cache talks to persistence. Two
//! backends exist: [`SqlStore`] over a sea-orm connection and [`MemoryStore`]
//! for ephemeral setups. [`copy_accounts`] moves every record from one
//! backend to another and is meant to run once, outside the request path.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{AccountSnapshot, Ledger, ResultEngine};

mod memory;
mod sql;

pub use memory::MemoryStore;
pub use sql::SqlStore;

/// Batch size used by [`copy_accounts`] when the caller has no preference.
pub const DEFAULT_COPY_BATCH: usize = 1000;

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn load_by_id(&self, id: Uuid) -> ResultEngine<Option<AccountSnapshot>>;

    /// Case-insensitive lookup. When several records share a name, the most
    /// recently active one wins.
    async fn find_by_name(&self, name: &str) -> ResultEngine<Option<AccountSnapshot>>;

    /// Insert or update the record keyed by `snapshot.id`.
    async fn save(&self, snapshot: &AccountSnapshot) -> ResultEngine<()>;

    /// Up to `limit` records ordered by `metric`, highest first.
    async fn list_top(&self, limit: usize, metric: Ledger) -> ResultEngine<Vec<AccountSnapshot>>;

    async fn count(&self) -> ResultEngine<u64>;

    async fn list_all(&self) -> ResultEngine<Vec<AccountSnapshot>>;

    /// Saves many records at once. Backends with transactions override this
    /// to make the batch atomic.
    async fn save_batch(&self, snapshots: &[AccountSnapshot]) -> ResultEngine<()> {
        for snapshot in snapshots {
            self.save(snapshot).await?;
        }
        Ok(())
    }
}

/// Copies every account from `source` into `target`.
///
/// Nothing is copied when `target` already holds records, so running this at
/// every start is harmless. Returns the number of copied accounts.
pub async fn copy_accounts(
    source: &dyn AccountStore,
    target: &dyn AccountStore,
    batch: usize,
) -> ResultEngine<u64> {
    let existing = target.count().await?;
    if existing > 0 {
        tracing::info!("target store already holds {existing} accounts, skipping copy");
        return Ok(0);
    }

    let records = source.list_all().await?;
    let mut copied = 0u64;
    for chunk in records.chunks(batch.max(1)) {
        target.save_batch(chunk).await?;
        copied += chunk.len() as u64;
        tracing::debug!("copied {copied}/{} accounts", records.len());
    }

    tracing::info!("account copy completed, {copied} accounts moved");
    Ok(copied)
}
