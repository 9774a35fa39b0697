//! The module contains the errors the engine can return.
//!
//! Business-rule violations never panic: every operation reports them as an
//! [`EngineError`] value. The variants fall in five groups:
//!
//! - validation: [`InvalidAmount`], [`InvalidName`], [`TransfersDisabled`],
//!   [`SelfTransfer`], [`TransferOutOfRange`];
//! - balance rules: [`InsufficientFunds`], [`MaxBalanceReached`];
//! - collaborators: [`TransferVetoed`];
//! - lookup: [`KeyNotFound`];
//! - infrastructure: [`Database`], [`Storage`], [`Config`].
//!
//!  [`InvalidAmount`]: EngineError::InvalidAmount
//!  [`InvalidName`]: EngineError::InvalidName
//!  [`TransfersDisabled`]: EngineError::TransfersDisabled
//!  [`SelfTransfer`]: EngineError::SelfTransfer
//!  [`TransferOutOfRange`]: EngineError::TransferOutOfRange
//!  [`InsufficientFunds`]: EngineError::InsufficientFunds
//!  [`MaxBalanceReached`]: EngineError::MaxBalanceReached
//!  [`TransferVetoed`]: EngineError::TransferVetoed
//!  [`KeyNotFound`]: EngineError::KeyNotFound
//!  [`Database`]: EngineError::Database
//!  [`Storage`]: EngineError::Storage
//!  [`Config`]: EngineError::Config
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Max balance reached: {0}")]
    MaxBalanceReached(String),
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("Transfers are disabled")]
    TransfersDisabled,
    #[error("Cannot transfer to the same account")]
    SelfTransfer,
    #[error("Transfer amount out of range: {0}")]
    TransferOutOfRange(String),
    #[error("Transfer vetoed: {0}")]
    TransferVetoed(String),
    #[error("Invalid settings: {0}")]
    Config(String),
    #[error("Storage failure: {0}")]
    Storage(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl EngineError {
    /// `true` for errors coming from the persistence layer rather than from a
    /// business rule.
    #[must_use]
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Storage(_))
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::MaxBalanceReached(a), Self::MaxBalanceReached(b)) => a == b,
            (Self::InsufficientFunds(a), Self::InsufficientFunds(b)) => a == b,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidName(a), Self::InvalidName(b)) => a == b,
            (Self::TransfersDisabled, Self::TransfersDisabled) => true,
            (Self::SelfTransfer, Self::SelfTransfer) => true,
            (Self::TransferOutOfRange(a), Self::TransferOutOfRange(b)) => a == b,
            (Self::TransferVetoed(a), Self::TransferVetoed(b)) => a == b,
            (Self::Config(a), Self::Config(b)) => a == b,
            (Self::Storage(a), Self::Storage(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
