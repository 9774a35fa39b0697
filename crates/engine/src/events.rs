//! Balance notifications and transfer review hooks.
//!
//! Every successful mutation produces one [`BalanceEvent`] per touched
//! ledger. Events are pushed to per-subscriber unbounded channels, so a slow
//! or dropped subscriber can neither block nor undo the mutation that
//! produced them.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{Coins, Ledger};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceCause {
    Set,
    Add,
    Remove,
    Deposit,
    Withdraw,
    Transfer,
}

/// Emitted before the account lock is released, so the events of one
/// account reach every subscriber in the order the changes were applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BalanceEvent {
    pub account: Uuid,
    pub ledger: Ledger,
    pub old: Coins,
    pub new: Coins,
    pub cause: BalanceCause,
}

impl BalanceEvent {
    /// Signed change, `new - old`.
    pub fn difference(&self) -> Coins {
        self.new - self.old
    }
}

/// Fan-out of [`BalanceEvent`]s to any number of subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<BalanceEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<BalanceEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn emit(&self, event: BalanceEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn emit_all(&self, events: impl IntoIterator<Item = BalanceEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}

/// A transfer about to be committed, as seen by [`TransferHook`]s.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransferRequest {
    pub from: Uuid,
    pub to: Uuid,
    pub amount: Coins,
    pub fee: Coins,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferDecision {
    Allow,
    Deny(String),
}

/// Reviews transfers before they commit.
///
/// Hooks run while both accounts are locked: they must be quick and must not
/// call back into the engine.
pub trait TransferHook: Send + Sync {
    fn review(&self, request: &TransferRequest) -> TransferDecision;
}

impl<F> TransferHook for F
where
    F: Fn(&TransferRequest) -> TransferDecision + Send + Sync,
{
    fn review(&self, request: &TransferRequest) -> TransferDecision {
        self(request)
    }
}

#[derive(Default)]
pub(crate) struct TransferHooks {
    hooks: RwLock<Vec<Arc<dyn TransferHook>>>,
}

impl TransferHooks {
    pub(crate) fn add(&self, hook: Arc<dyn TransferHook>) {
        self.hooks.write().push(hook);
    }

    /// First denial wins.
    pub(crate) fn review(&self, request: &TransferRequest) -> TransferDecision {
        for hook in self.hooks.read().iter() {
            if let TransferDecision::Deny(reason) = hook.review(request) {
                return TransferDecision::Deny(reason);
            }
        }
        TransferDecision::Allow
    }
}

impl std::fmt::Debug for TransferHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferHooks")
            .field("count", &self.hooks.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(cause: BalanceCause) -> BalanceEvent {
        BalanceEvent {
            account: Uuid::new_v4(),
            ledger: Ledger::Liquid,
            old: Coins::whole(1),
            new: Coins::whole(3),
            cause,
        }
    }

    #[tokio::test]
    async fn every_subscriber_receives_events() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.emit(event(BalanceCause::Add));

        assert_eq!(first.recv().await.unwrap().cause, BalanceCause::Add);
        assert_eq!(second.recv().await.unwrap().difference(), Coins::whole(2));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        bus.emit(event(BalanceCause::Set));

        assert_eq!(bus.subscriber_count(), 1);
        drop(kept);
    }

    #[test]
    fn first_denial_wins() {
        let hooks = TransferHooks::default();
        hooks.add(Arc::new(|_: &TransferRequest| TransferDecision::Allow));
        hooks.add(Arc::new(|r: &TransferRequest| {
            if r.amount > Coins::whole(10) {
                TransferDecision::Deny("too much".to_string())
            } else {
                TransferDecision::Allow
            }
        }));

        let mut request = TransferRequest {
            from: Uuid::new_v4(),
            to: Uuid::new_v4(),
            amount: Coins::whole(5),
            fee: Coins::ZERO,
        };
        assert_eq!(hooks.review(&request), TransferDecision::Allow);
        request.amount = Coins::whole(50);
        assert_eq!(
            hooks.review(&request),
            TransferDecision::Deny("too much".to_string())
        );
    }
}
