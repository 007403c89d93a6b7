use crate::domain::money::{ExchangeRate, Money};
use crate::domain::pending::FeeLevel;
use crate::domain::validation::TxValidation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies the kind of a confirmation line item; used for
/// replace-by-tag de-duplication when confirmations are rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfirmationTag {
    From,
    To,
    NetworkFee,
    ProcessingFee,
    Rate,
    Total,
    Memo,
    Description,
    WithdrawalTerms,
    Deadline,
    ErrorNotice,
}

/// A typed, user-visible line item summarising one aspect of the pending
/// transfer. The consumer renders these in order before execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Confirmation {
    From {
        label: String,
    },
    To {
        label: String,
    },
    NetworkFee {
        fee: Money,
        level: FeeLevel,
    },
    ProcessingFee {
        fee: Money,
    },
    Rate {
        rate: ExchangeRate,
    },
    Total {
        amount: Money,
        fee: Money,
    },
    /// User-editable memo; `required` reflects the destination's rules.
    Memo {
        value: Option<String>,
        required: bool,
    },
    /// User-editable free-text note attached to the transfer.
    Description {
        value: String,
    },
    WithdrawalTerms {
        lock_days: u32,
    },
    /// Deadline after which the transfer must be re-priced or abandoned.
    /// Expiry is data; crossing it surfaces as `InvoiceExpired`.
    Deadline {
        expires_at: DateTime<Utc>,
    },
    /// Attached or replaced by the orchestrator purely as a function of
    /// the validation state, never by option updates.
    ErrorNotice {
        state: TxValidation,
        limit: Option<Money>,
    },
}

impl Confirmation {
    pub fn tag(&self) -> ConfirmationTag {
        match self {
            Confirmation::From { .. } => ConfirmationTag::From,
            Confirmation::To { .. } => ConfirmationTag::To,
            Confirmation::NetworkFee { .. } => ConfirmationTag::NetworkFee,
            Confirmation::ProcessingFee { .. } => ConfirmationTag::ProcessingFee,
            Confirmation::Rate { .. } => ConfirmationTag::Rate,
            Confirmation::Total { .. } => ConfirmationTag::Total,
            Confirmation::Memo { .. } => ConfirmationTag::Memo,
            Confirmation::Description { .. } => ConfirmationTag::Description,
            Confirmation::WithdrawalTerms { .. } => ConfirmationTag::WithdrawalTerms,
            Confirmation::Deadline { .. } => ConfirmationTag::Deadline,
            Confirmation::ErrorNotice { .. } => ConfirmationTag::ErrorNotice,
        }
    }

    /// Whether the item is a user-editable option.
    pub fn is_option(&self) -> bool {
        matches!(
            self,
            Confirmation::Memo { .. } | Confirmation::Description { .. }
        )
    }
}
