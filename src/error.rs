use crate::domain::account::{AccountKind, TargetKind, TxAction};
use crate::domain::confirmation::ConfirmationTag;
use crate::domain::money::Currency;
use crate::domain::pending::FeeLevel;
use crate::domain::validation::TxValidation;
use thiserror::Error;

pub type Result<T, E = TransferError> = std::result::Result<T, E>;

/// Backend failure taxonomy.
///
/// Every backend-specific error shape (HTTP status bodies, chain RPC
/// errors) is translated into one of these variants at the engine
/// boundary; the orchestrator and its consumers never see backend-native
/// error shapes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    #[error("order limit reached")]
    OrderLimitReached,
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("invalid currency: {0}")]
    InvalidCurrency(String),
    #[error("currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: Currency, actual: Currency },
    #[error("quote is no longer valid")]
    QuoteInvalid,
    #[error("quote expired")]
    QuoteExpired,
    #[error("feature unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("internal server error")]
    InternalError,
    #[error("network connection error: {0}")]
    Network(String),
    #[error("{message}")]
    Api { message: String },
}

/// Terminal, processor-level failures.
///
/// Recoverable causes stay inside the transaction as a [`TxValidation`]
/// value; anything surfacing here ends the transaction, and the consumer
/// must construct a new processor to start over.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessorError {
    #[error("processor is not initialised")]
    NotInitialised,
    #[error("processor is already initialised")]
    AlreadyInitialised,
    #[error("processor has been reset")]
    Closed,
    #[error("transaction has already been executed")]
    AlreadyExecuted,
    #[error("no engine registered for {account_kind:?} -> {target:?} ({action:?})")]
    UnsupportedTransfer {
        account_kind: AccountKind,
        target: TargetKind,
        action: TxAction,
    },
    #[error("engine does not accept fiat amounts")]
    FiatInputUnsupported,
    #[error("fee level {0:?} is not available for this transaction")]
    FeeLevelUnsupported(FeeLevel),
    #[error("option {0:?} was never offered for this transaction")]
    UnknownOption(ConfirmationTag),
    #[error("cannot execute: {}", .0.user_message())]
    NotExecutable(TxValidation),
    #[error(transparent)]
    Engine(#[from] TransferError),
}
