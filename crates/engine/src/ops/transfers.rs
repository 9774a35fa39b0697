use serde::Serialize;
use uuid::Uuid;

use crate::{
    Account, AccountHandle, BalanceCause, Coins, EngineError, Ledger, ResultEngine,
    TransferDecision, TransferRequest,
};

use super::{BalanceChange, Engine, ensure_positive};

/// What a transfer of `amount` costs the sender.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TransferQuote {
    pub amount: Coins,
    pub fee: Coins,
    pub total: Coins,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    pub sender: BalanceChange,
    pub receiver: BalanceChange,
    pub fee: Coins,
}

impl Engine {
    /// Validates `amount` against the transfer settings and prices it.
    pub fn transfer_quote(&self, amount: Coins) -> ResultEngine<TransferQuote> {
        let transfer = &self.settings.transfer;
        if !transfer.enabled {
            return Err(EngineError::TransfersDisabled);
        }
        ensure_positive(amount)?;
        if amount < transfer.min_amount || amount > transfer.max_amount {
            return Err(EngineError::TransferOutOfRange(format!(
                "{amount} is outside [{}, {}]",
                transfer.min_amount, transfer.max_amount
            )));
        }
        let fee = transfer.fee(amount);
        Ok(TransferQuote {
            amount,
            fee,
            total: amount.saturating_add(fee),
        })
    }

    /// Moves `amount` of liquid from `from` to `to`; the sender also pays the
    /// fee, which leaves the economy.
    ///
    /// Both accounts stay locked from the balance checks to the commit, so
    /// either both sides change or neither does.
    pub async fn transfer(
        &self,
        from: Uuid,
        to: Uuid,
        amount: Coins,
    ) -> ResultEngine<TransferReceipt> {
        let quote = self.transfer_quote(amount)?;
        if from == to {
            return Err(EngineError::SelfTransfer);
        }

        let receipt = loop {
            let sender = self.cache.load(from).await;
            let receiver = self.cache.load(to).await;
            if let Some(result) = self.commit_transfer(from < to, &sender, &receiver, quote) {
                break result?;
            }
            tracing::debug!("transfer {from} -> {to} hit an evicted account, retrying");
        };

        tracing::debug!(
            "transferred {} from {from} to {to}, fee {}",
            quote.amount,
            quote.fee
        );
        Ok(receipt)
    }

    /// Runs the locked part of a transfer. `None` means one of the handles
    /// was evicted before it could be locked.
    fn commit_transfer(
        &self,
        sender_first: bool,
        sender: &AccountHandle,
        receiver: &AccountHandle,
        quote: TransferQuote,
    ) -> Option<ResultEngine<TransferReceipt>> {
        // Locks are always taken in ascending id order.
        let (mut sender, mut receiver) = if sender_first {
            let s = sender.lock();
            (s, receiver.lock())
        } else {
            let r = receiver.lock();
            (sender.lock(), r)
        };
        if sender.is_detached() || receiver.is_detached() {
            return None;
        }
        Some(self.apply_transfer(&mut sender, &mut receiver, quote))
    }

    fn apply_transfer(
        &self,
        sender: &mut Account,
        receiver: &mut Account,
        quote: TransferQuote,
    ) -> ResultEngine<TransferReceipt> {
        if sender.liquid() < quote.total {
            return Err(EngineError::InsufficientFunds(format!(
                "liquid balance {} is below {} (fee {})",
                sender.liquid(),
                quote.total,
                quote.fee
            )));
        }
        if receiver.would_exceed_liquid(quote.amount) {
            return Err(EngineError::MaxBalanceReached(format!(
                "receiver liquid would exceed {}",
                receiver.limits().max_liquid
            )));
        }

        let request = TransferRequest {
            from: sender.id(),
            to: receiver.id(),
            amount: quote.amount,
            fee: quote.fee,
        };
        if let TransferDecision::Deny(reason) = self.hooks.review(&request) {
            tracing::info!("transfer {} -> {} vetoed: {reason}", request.from, request.to);
            return Err(EngineError::TransferVetoed(reason));
        }

        let (sender_old, receiver_old) = (sender.liquid(), receiver.liquid());
        sender.remove_liquid(quote.total)?;
        receiver.add_liquid(quote.amount);

        let receipt = TransferReceipt {
            sender: BalanceChange {
                account: sender.id(),
                ledger: Ledger::Liquid,
                old: sender_old,
                new: sender.liquid(),
                requested: sender_old - quote.total,
            },
            receiver: BalanceChange {
                account: receiver.id(),
                ledger: Ledger::Liquid,
                old: receiver_old,
                new: receiver.liquid(),
                requested: receiver_old + quote.amount,
            },
            fee: quote.fee,
        };
        self.events.emit_all([
            receipt.sender.event(BalanceCause::Transfer),
            receipt.receiver.event(BalanceCause::Transfer),
        ]);
        Ok(receipt)
    }
}
