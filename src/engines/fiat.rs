use crate::application::engine::{TxEngine, TxResult, check_amount_bounds};
use crate::domain::account::{AccountBalance, BankAccountRef, TxAction, TxTarget};
use crate::domain::confirmation::Confirmation;
use crate::domain::money::Money;
use crate::domain::pending::{EngineData, FeeLevel, FeeSelection, MaxReason, PendingTx, TxLimits};
use crate::domain::ports::{
    AccountArc, BankRail, BankTransferTicket, CacheTag, EligibilityProvider, Feature,
    FeatureAccess,
};
use crate::domain::validation::TxValidation;
use crate::error::{Result, TransferError};
use async_trait::async_trait;
use futures::StreamExt;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Tightens eligibility limits with the per-payment-method maximum, so
/// an over-limit amount reports the reason that actually binds.
fn merge_payment_limit(mut limits: TxLimits, method_max: Money) -> TxLimits {
    let tighter = match &limits.max {
        Some(max) => matches!(method_max.partial_cmp(max), Some(Ordering::Less)),
        None => true,
    };
    if tighter {
        limits.max = Some(method_max);
        limits.max_reason = MaxReason::PaymentMethod;
    }
    limits
}

fn ticket_result(ticket: BankTransferTicket) -> TxResult {
    match ticket.requires_approval {
        Some(payload) => TxResult::PendingApproval { payload },
        None => TxResult::Unhashed {
            order_id: Some(ticket.id),
        },
    }
}

/// Funds a custodial fiat balance from a linked bank account.
///
/// The bank side has no observable balance, so amount validation is
/// purely limit-driven. Rails that need the user to approve the payment
/// in their banking app surface a `PendingApproval` outcome.
pub struct FiatDepositEngine {
    source: AccountArc,
    target: TxTarget,
    bank: Arc<dyn BankRail>,
    eligibility: Arc<dyn EligibilityProvider>,
}

impl FiatDepositEngine {
    pub fn new(
        source: AccountArc,
        target: TxTarget,
        bank: Arc<dyn BankRail>,
        eligibility: Arc<dyn EligibilityProvider>,
    ) -> Self {
        Self {
            source,
            target,
            bank,
            eligibility,
        }
    }
}

#[async_trait]
impl TxEngine for FiatDepositEngine {
    fn source(&self) -> &AccountArc {
        &self.source
    }

    fn target(&self) -> &TxTarget {
        &self.target
    }

    fn action(&self) -> TxAction {
        TxAction::Deposit
    }

    fn affected_caches(&self) -> Vec<CacheTag> {
        let mut tags = vec![CacheTag::LinkedBanks];
        if let TxTarget::Account(account) = &self.target {
            tags.push(CacheTag::Balance(account.id().to_string()));
        }
        tags
    }

    async fn initialise(&self) -> Result<PendingTx> {
        if let FeatureAccess::Blocked { reason } =
            self.eligibility.access(Feature::FiatDeposit).await?
        {
            return Err(TransferError::Unavailable { reason });
        }
        let currency = self.source.currency();
        let limits = self.eligibility.limits(TxAction::Deposit, &currency).await?;
        let method_max = self
            .bank
            .payment_method_limit(self.source.id(), &currency)
            .await?;
        let limits = merge_payment_limit(limits, method_max);
        Ok(
            PendingTx::initial(currency.clone(), FeeSelection::fixed_none(currency))
                .with_limits(limits),
        )
    }

    async fn update_amount(&self, amount: Money, current: PendingTx) -> Result<PendingTx> {
        if amount.currency != self.source.currency() {
            return Err(TransferError::CurrencyMismatch {
                expected: self.source.currency(),
                actual: amount.currency,
            });
        }
        Ok(current.with_amount(amount))
    }

    async fn update_fee_level(
        &self,
        current: PendingTx,
        level: FeeLevel,
        _custom: Option<Money>,
    ) -> Result<PendingTx> {
        if current.fee_selection.supports(level) {
            return Ok(current);
        }
        Err(TransferError::InternalError)
    }

    async fn validate_amount(&self, current: PendingTx) -> Result<PendingTx> {
        // No spendable-balance rule: the bank balance is not observable.
        let amount = &current.amount;
        let mut state = TxValidation::CanExecute;
        if !amount.is_positive() {
            state = TxValidation::InvalidAmount;
        } else if let Some(limits) = &current.limits {
            if let Some(min) = &limits.min {
                if matches!(amount.partial_cmp(min), Some(Ordering::Less)) {
                    state = TxValidation::UnderMinLimit;
                }
            }
            if state.can_execute() {
                if let Some(max) = &limits.max {
                    if matches!(amount.partial_cmp(max), Some(Ordering::Greater)) {
                        state = limits.max_reason.over_limit_state();
                    }
                }
            }
        }
        Ok(current.with_validation(state))
    }

    async fn validate_all(&self, current: PendingTx) -> Result<PendingTx> {
        self.validate_amount(current).await
    }

    async fn build_confirmations(&self, current: PendingTx) -> Result<PendingTx> {
        let amount = current.amount.clone();
        let fee = current.fee_amount.clone();
        Ok(current
            .put_confirmation(Confirmation::From {
                label: self.source.label().to_string(),
            })
            .put_confirmation(Confirmation::To {
                label: self.target.display_label(),
            })
            .put_confirmation(Confirmation::Total { amount, fee }))
    }

    async fn execute(&self, current: PendingTx, _credential: Option<String>) -> Result<TxResult> {
        if !current.validation.can_execute() {
            return Err(TransferError::InternalError);
        }
        debug!(bank = self.source.id(), "creating bank deposit");
        let ticket = self
            .bank
            .create_deposit(self.source.id(), &current.amount)
            .await?;
        Ok(ticket_result(ticket))
    }
}

/// Withdraws a custodial fiat balance to a linked bank account, subject
/// to eligibility and payment-method limits and the rail's settlement
/// terms.
pub struct FiatWithdrawEngine {
    source: AccountArc,
    target: TxTarget,
    bank: Arc<dyn BankRail>,
    eligibility: Arc<dyn EligibilityProvider>,
}

impl FiatWithdrawEngine {
    pub fn new(
        source: AccountArc,
        target: TxTarget,
        bank: Arc<dyn BankRail>,
        eligibility: Arc<dyn EligibilityProvider>,
    ) -> Self {
        Self {
            source,
            target,
            bank,
            eligibility,
        }
    }

    fn bank_ref(&self) -> Result<&BankAccountRef> {
        match &self.target {
            TxTarget::Bank(bank) => Ok(bank),
            _ => Err(TransferError::InternalError),
        }
    }

    async fn latest_balance(&self) -> Result<AccountBalance> {
        self.source
            .balance()
            .next()
            .await
            .ok_or_else(|| TransferError::Network("balance stream ended".into()))
    }
}

#[async_trait]
impl TxEngine for FiatWithdrawEngine {
    fn source(&self) -> &AccountArc {
        &self.source
    }

    fn target(&self) -> &TxTarget {
        &self.target
    }

    fn action(&self) -> TxAction {
        TxAction::Withdraw
    }

    fn affected_caches(&self) -> Vec<CacheTag> {
        vec![
            CacheTag::Balance(self.source.id().to_string()),
            CacheTag::LinkedBanks,
        ]
    }

    async fn initialise(&self) -> Result<PendingTx> {
        if let FeatureAccess::Blocked { reason } =
            self.eligibility.access(Feature::FiatWithdraw).await?
        {
            return Err(TransferError::Unavailable { reason });
        }
        let currency = self.source.currency();
        let bank = self.bank_ref()?;
        let balance = self.latest_balance().await?;
        let limits = self
            .eligibility
            .limits(TxAction::Withdraw, &currency)
            .await?;
        let method_max = self.bank.payment_method_limit(&bank.id, &currency).await?;
        let limits = merge_payment_limit(limits, method_max);
        let terms = self.bank.withdrawal_terms(&currency).await?;

        Ok(
            PendingTx::initial(currency.clone(), FeeSelection::fixed_none(currency))
                .with_balances(balance.total, balance.available)
                .with_limits(limits)
                .with_engine_data(EngineData::FiatWithdraw { terms }),
        )
    }

    async fn update_amount(&self, amount: Money, current: PendingTx) -> Result<PendingTx> {
        if amount.currency != self.source.currency() {
            return Err(TransferError::CurrencyMismatch {
                expected: self.source.currency(),
                actual: amount.currency,
            });
        }
        Ok(current.with_amount(amount))
    }

    async fn update_fee_level(
        &self,
        current: PendingTx,
        level: FeeLevel,
        _custom: Option<Money>,
    ) -> Result<PendingTx> {
        if current.fee_selection.supports(level) {
            return Ok(current);
        }
        Err(TransferError::InternalError)
    }

    async fn validate_amount(&self, current: PendingTx) -> Result<PendingTx> {
        let state = check_amount_bounds(
            &current.amount,
            &current.available_balance,
            current.limits.as_ref(),
        );
        Ok(current.with_validation(state))
    }

    async fn validate_all(&self, current: PendingTx) -> Result<PendingTx> {
        let tx = self.validate_amount(current).await?;
        if !tx.validation.can_execute() {
            return Ok(tx);
        }
        if self.source.pending_activity().await? {
            return Ok(tx.with_validation(TxValidation::HasTxInFlight));
        }
        Ok(tx.with_validation(TxValidation::CanExecute))
    }

    async fn build_confirmations(&self, current: PendingTx) -> Result<PendingTx> {
        let amount = current.amount.clone();
        let fee = current.fee_amount.clone();
        let lock_days = match &current.engine_data {
            Some(EngineData::FiatWithdraw { terms }) => terms.lock_days,
            _ => 0,
        };
        Ok(current
            .put_confirmation(Confirmation::From {
                label: self.source.label().to_string(),
            })
            .put_confirmation(Confirmation::To {
                label: self.target.display_label(),
            })
            .put_confirmation(Confirmation::WithdrawalTerms { lock_days })
            .put_confirmation(Confirmation::Total { amount, fee }))
    }

    async fn execute(&self, current: PendingTx, _credential: Option<String>) -> Result<TxResult> {
        if !current.validation.can_execute() {
            return Err(TransferError::InternalError);
        }
        let bank = self.bank_ref()?;
        debug!(bank = bank.id, "creating bank withdrawal");
        let ticket = self
            .bank
            .create_withdrawal(&bank.id, &current.amount)
            .await?;
        Ok(ticket_result(ticket))
    }
}
