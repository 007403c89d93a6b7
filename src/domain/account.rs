use crate::domain::money::{Currency, Money};
use crate::domain::ports::{AccountArc};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Capability tags carried by an account.
///
/// Tags are orthogonal: a single account may satisfy several (an exchange
/// custodial account is both `Trading` and `Exchange`). They drive both
/// target filtering and engine selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountKind {
    NonCustodial,
    Trading,
    Interest,
    Staking,
    Fiat,
    Exchange,
}

/// A point-in-time balance emitted by an account's balance stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub total: Money,
    pub available: Money,
    pub pending: Money,
}

impl AccountBalance {
    pub fn settled(total: Money) -> Self {
        let pending = Money::zero(total.currency.clone());
        Self {
            available: total.clone(),
            total,
            pending,
        }
    }
}

/// Where an account can receive funds, including the memo some rails
/// require to credit the right sub-account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveAddress {
    pub address: String,
    pub memo: Option<String>,
}

/// A linked bank account used by the fiat rails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankAccountRef {
    pub id: String,
    pub label: String,
    pub currency: Currency,
}

/// The transfer semantics requested by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxAction {
    Send,
    Swap,
    Sell,
    Deposit,
    Withdraw,
    Sign,
}

/// The destination of a transfer.
///
/// Raw address and domain inputs stay unparsed here: parsing happens
/// during validation so a bad destination is a validation state, not an
/// up-front failure.
#[derive(Clone)]
pub enum TxTarget {
    Address {
        currency: Currency,
        raw: String,
    },
    Domain {
        currency: Currency,
        name: String,
    },
    Account(AccountArc),
    Bank(BankAccountRef),
    Invoice {
        currency: Currency,
        address: String,
        amount: Money,
        expires_at: DateTime<Utc>,
    },
    Payload {
        currency: Currency,
        data: Vec<u8>,
        amount: Option<Money>,
    },
}

/// Shape of a [`TxTarget`], used as the target component of an engine
/// selection key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    Address,
    Domain,
    Account(AccountKind),
    Bank,
    Invoice,
    Payload,
}

impl TxTarget {
    pub fn kind(&self) -> TargetKind {
        match self {
            TxTarget::Address { .. } => TargetKind::Address,
            TxTarget::Domain { .. } => TargetKind::Domain,
            TxTarget::Account(account) => TargetKind::Account(
                account
                    .kinds()
                    .first()
                    .copied()
                    .unwrap_or(AccountKind::NonCustodial),
            ),
            TxTarget::Bank(_) => TargetKind::Bank,
            TxTarget::Invoice { .. } => TargetKind::Invoice,
            TxTarget::Payload { .. } => TargetKind::Payload,
        }
    }

    pub fn currency(&self) -> Currency {
        match self {
            TxTarget::Address { currency, .. }
            | TxTarget::Domain { currency, .. }
            | TxTarget::Invoice { currency, .. }
            | TxTarget::Payload { currency, .. } => currency.clone(),
            TxTarget::Account(account) => account.currency(),
            TxTarget::Bank(bank) => bank.currency.clone(),
        }
    }

    /// What the consumer sees on the "to" confirmation line.
    pub fn display_label(&self) -> String {
        match self {
            TxTarget::Address { raw, .. } => raw.clone(),
            TxTarget::Domain { name, .. } => name.clone(),
            TxTarget::Account(account) => account.label().to_string(),
            TxTarget::Bank(bank) => bank.label.clone(),
            TxTarget::Invoice { address, .. } => address.clone(),
            TxTarget::Payload { .. } => "Signature request".to_string(),
        }
    }
}

impl fmt::Debug for TxTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxTarget::Address { currency, raw } => f
                .debug_struct("Address")
                .field("currency", currency)
                .field("raw", raw)
                .finish(),
            TxTarget::Domain { currency, name } => f
                .debug_struct("Domain")
                .field("currency", currency)
                .field("name", name)
                .finish(),
            TxTarget::Account(account) => {
                f.debug_struct("Account").field("id", &account.id()).finish()
            }
            TxTarget::Bank(bank) => f.debug_struct("Bank").field("id", &bank.id).finish(),
            TxTarget::Invoice {
                address, expires_at, ..
            } => f
                .debug_struct("Invoice")
                .field("address", address)
                .field("expires_at", expires_at)
                .finish(),
            TxTarget::Payload { data, .. } => f
                .debug_struct("Payload")
                .field("bytes", &data.len())
                .finish(),
        }
    }
}
