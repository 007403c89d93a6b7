use crate::domain::confirmation::{Confirmation, ConfirmationTag};
use crate::domain::money::{Currency, Money};
use crate::domain::ports::{Quote, WithdrawalTerms};
use crate::domain::validation::TxValidation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named fee-priority option with an engine-resolved magnitude.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum FeeLevel {
    None,
    Regular,
    Priority,
    Custom,
}

/// The chosen fee tier, the tiers the engine supports, and the resolved
/// fee magnitude per tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSelection {
    pub selected: FeeLevel,
    pub available: Vec<FeeLevel>,
    pub resolved: BTreeMap<FeeLevel, Money>,
    pub custom: Option<Money>,
    /// The fee-bearing asset; may differ from the transfer amount's
    /// currency (token sends pay gas in the chain's native asset).
    pub asset: Currency,
}

impl FeeSelection {
    /// Custodial rails with no user-selectable fee.
    pub fn fixed_none(asset: Currency) -> Self {
        let mut resolved = BTreeMap::new();
        resolved.insert(FeeLevel::None, Money::zero(asset.clone()));
        Self {
            selected: FeeLevel::None,
            available: vec![FeeLevel::None],
            resolved,
            custom: None,
            asset,
        }
    }

    pub fn supports(&self, level: FeeLevel) -> bool {
        self.available.contains(&level)
    }

    pub fn fee_for(&self, level: FeeLevel) -> Option<&Money> {
        if level == FeeLevel::Custom {
            return self.custom.as_ref();
        }
        self.resolved.get(&level)
    }
}

/// Why a maximum limit applies; selects the over-limit validation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxReason {
    SilverTier,
    GoldTier,
    PaymentMethod,
}

impl MaxReason {
    pub fn over_limit_state(self) -> TxValidation {
        match self {
            MaxReason::SilverTier => TxValidation::OverSilverTierLimit,
            MaxReason::GoldTier => TxValidation::OverGoldTierLimit,
            MaxReason::PaymentMethod => TxValidation::AbovePaymentMethodLimit,
        }
    }
}

/// Min/max transferable amounts plus the tier-upgrade hint. Absent on a
/// snapshot only before the first validation pass resolves them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxLimits {
    pub min: Option<Money>,
    pub max: Option<Money>,
    pub max_reason: MaxReason,
    pub upgrade_available: bool,
}

impl TxLimits {
    pub fn unbounded() -> Self {
        Self {
            min: None,
            max: None,
            max_reason: MaxReason::GoldTier,
            upgrade_available: false,
        }
    }
}

/// A step in the consumer's navigation flow; history is an immutable
/// sequence appended and popped functionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStep {
    EnterAmount,
    Confirmation,
    InProgress,
}

/// Engine-private computed facts carried on the snapshot for
/// confirmation rendering. One small typed payload per engine family
/// instead of a stringly-typed bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineData {
    Interest { lock_days: u32 },
    Swap { quote: Quote },
    FiatWithdraw { terms: WithdrawalTerms },
    Sign { payload_bytes: usize },
}

/// The immutable snapshot of a transaction under construction.
///
/// Created by an engine's `initialise`; every subsequent change produces
/// a new, fully formed copy through the `with_*`/`put_*` methods. The
/// orchestrator owns the only live instance and serialises its updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTx {
    pub amount: Money,
    pub total_balance: Money,
    pub available_balance: Money,
    pub fee_amount: Money,
    pub fee_for_full_available: Money,
    pub fee_selection: FeeSelection,
    pub limits: Option<TxLimits>,
    pub validation: TxValidation,
    pub confirmations: Vec<Confirmation>,
    pub engine_data: Option<EngineData>,
    /// Whether a real validation pass has run for this transaction.
    /// Keeps the zero-amount case from surfacing "insufficient funds"
    /// before the user has entered anything.
    pub validation_attempted: bool,
    pub steps: Vec<TxStep>,
}

impl PendingTx {
    /// A zeroed snapshot for a fresh transaction in `amount_currency`,
    /// positioned at the amount-entry step.
    pub fn initial(amount_currency: Currency, fee_selection: FeeSelection) -> Self {
        let fee_currency = fee_selection.asset.clone();
        Self {
            amount: Money::zero(amount_currency.clone()),
            total_balance: Money::zero(amount_currency.clone()),
            available_balance: Money::zero(amount_currency),
            fee_amount: Money::zero(fee_currency.clone()),
            fee_for_full_available: Money::zero(fee_currency),
            fee_selection,
            limits: None,
            validation: TxValidation::Uninitialised,
            confirmations: Vec::new(),
            engine_data: None,
            validation_attempted: false,
            steps: vec![TxStep::EnterAmount],
        }
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_balances(mut self, total: Money, available: Money) -> Self {
        self.total_balance = total;
        self.available_balance = available;
        self
    }

    pub fn with_fees(mut self, fee_amount: Money, fee_for_full_available: Money) -> Self {
        self.fee_amount = fee_amount;
        self.fee_for_full_available = fee_for_full_available;
        self
    }

    pub fn with_fee_selection(mut self, fee_selection: FeeSelection) -> Self {
        self.fee_selection = fee_selection;
        self
    }

    pub fn with_limits(mut self, limits: TxLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn with_validation(mut self, validation: TxValidation) -> Self {
        self.validation = validation;
        self
    }

    pub fn mark_validated(mut self) -> Self {
        self.validation_attempted = true;
        self
    }

    pub fn with_engine_data(mut self, data: EngineData) -> Self {
        self.engine_data = Some(data);
        self
    }

    /// Replaces an existing item of the same tag in place (stable order)
    /// or appends a new one.
    pub fn put_confirmation(mut self, item: Confirmation) -> Self {
        let tag = item.tag();
        match self.confirmations.iter_mut().find(|c| c.tag() == tag) {
            Some(slot) => *slot = item,
            None => self.confirmations.push(item),
        }
        self
    }

    pub fn remove_confirmation(mut self, tag: ConfirmationTag) -> Self {
        self.confirmations.retain(|c| c.tag() != tag);
        self
    }

    pub fn confirmation(&self, tag: ConfirmationTag) -> Option<&Confirmation> {
        self.confirmations.iter().find(|c| c.tag() == tag)
    }

    pub fn has_confirmation(&self, tag: ConfirmationTag) -> bool {
        self.confirmation(tag).is_some()
    }

    pub fn push_step(mut self, step: TxStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn pop_step(mut self) -> Self {
        self.steps.pop();
        self
    }

    pub fn current_step(&self) -> Option<TxStep> {
        self.steps.last().copied()
    }
}
