//! Two-ledger account engine.
//!
//! Every account holds a spendable **liquid** balance and a **vault**
//! balance. The [`AccountCache`] keeps accounts in memory on top of an
//! [`AccountStore`](store::AccountStore), and the [`Engine`] applies validated,
//! atomic mutations to them. A [`Scheduler`] flushes and evicts in the
//! background.

pub use account::{Account, AccountSnapshot, Ledger, MAX_NAME_LEN, normalize_name};
pub use cache::{AccountCache, AccountHandle, FlushReport, NobodyActive, Presence};
pub use error::EngineError;
pub use events::{
    BalanceCause, BalanceEvent, EventBus, TransferDecision, TransferHook, TransferRequest,
};
pub use money::Coins;
pub use ops::{
    BalanceChange, Engine, EngineBuilder, LedgerMove, TransferQuote, TransferReceipt,
};
pub use scheduler::Scheduler;
pub use settings::{AccountLimits, CacheSettings, EconomySettings, TransferSettings};

mod account;
mod cache;
mod error;
mod events;
mod money;
mod ops;
mod scheduler;
mod settings;
pub mod store;

pub type ResultEngine<T> = Result<T, EngineError>;
