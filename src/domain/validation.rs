use serde::{Deserialize, Serialize};

/// Outcome of checking a snapshot's correctness and eligibility.
///
/// A flat enumeration: validity is always recomputed against the complete
/// current snapshot, never cached incrementally. `CanExecute` is the only
/// state from which execution proceeds, and it is not sticky: any
/// mutation sends the snapshot back through validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TxValidation {
    #[default]
    Uninitialised,
    CanExecute,
    HasTxInFlight,
    InvalidAmount,
    InsufficientFunds,
    InsufficientGas,
    InvalidAddress,
    InvalidDomain,
    AddressIsContract,
    OptionInvalid,
    MemoInvalid,
    UnderMinLimit,
    OverSilverTierLimit,
    OverGoldTierLimit,
    AbovePaymentMethodLimit,
    PendingOrdersLimitReached,
    InvoiceExpired,
}

impl TxValidation {
    pub fn can_execute(self) -> bool {
        self == TxValidation::CanExecute
    }

    /// Whether the orchestrator should attach an error notice to the
    /// confirmation list for this state.
    pub fn is_blocking(self) -> bool {
        !matches!(self, TxValidation::CanExecute | TxValidation::Uninitialised)
    }

    /// One human-readable message per state. The match is exhaustive on
    /// purpose: a state without a message is a bug, not an "unknown
    /// error" catch-all.
    pub fn user_message(self) -> &'static str {
        match self {
            TxValidation::Uninitialised => "Enter an amount to continue",
            TxValidation::CanExecute => "Ready to confirm",
            TxValidation::HasTxInFlight => "Another transaction is still in progress",
            TxValidation::InvalidAmount => "The entered amount is not valid",
            TxValidation::InsufficientFunds => "Not enough funds to cover this transaction",
            TxValidation::InsufficientGas => "Not enough funds to cover the network fee",
            TxValidation::InvalidAddress => "The destination address is not valid",
            TxValidation::InvalidDomain => "The domain could not be resolved to an address",
            TxValidation::AddressIsContract => "Sending to a contract address is not supported",
            TxValidation::OptionInvalid => "One of the entered options is not valid",
            TxValidation::MemoInvalid => "A valid memo is required for this destination",
            TxValidation::UnderMinLimit => "The amount is below the minimum for this transaction",
            TxValidation::OverSilverTierLimit => {
                "The amount is over your current limit; upgrade to Gold to raise it"
            }
            TxValidation::OverGoldTierLimit => "The amount is over your annual limit",
            TxValidation::AbovePaymentMethodLimit => {
                "The amount is over the limit for this payment method"
            }
            TxValidation::PendingOrdersLimitReached => {
                "Too many open orders; wait for one to complete"
            }
            TxValidation::InvoiceExpired => "This payment request has expired",
        }
    }
}
