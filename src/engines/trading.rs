use crate::application::engine::{TxEngine, TxResult, check_amount_bounds, check_fee_coverage};
use crate::domain::account::{AccountBalance, TxAction, TxTarget};
use crate::domain::confirmation::{Confirmation, ConfirmationTag};
use crate::domain::money::Money;
use crate::domain::pending::{FeeLevel, FeeSelection, PendingTx};
use crate::domain::ports::{
    AccountArc, AddressResolver, CacheTag, CustodialRail, EligibilityProvider,
};
use crate::domain::validation::TxValidation;
use crate::error::{Result, TransferError};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tracing::debug;

/// Withdraws a custodial trading balance to an external chain address.
///
/// The rail charges a flat processing fee and batches the actual
/// broadcast, so execution acknowledges without a chain hash. There is
/// no user-selectable fee tier.
pub struct TradingSendEngine {
    source: AccountArc,
    target: TxTarget,
    resolver: Arc<dyn AddressResolver>,
    eligibility: Arc<dyn EligibilityProvider>,
    custodial: Arc<dyn CustodialRail>,
}

impl TradingSendEngine {
    pub fn new(
        source: AccountArc,
        target: TxTarget,
        resolver: Arc<dyn AddressResolver>,
        eligibility: Arc<dyn EligibilityProvider>,
        custodial: Arc<dyn CustodialRail>,
    ) -> Self {
        Self {
            source,
            target,
            resolver,
            eligibility,
            custodial,
        }
    }

    async fn latest_balance(&self) -> Result<AccountBalance> {
        self.source
            .balance()
            .next()
            .await
            .ok_or_else(|| TransferError::Network("balance stream ended".into()))
    }

    fn raw_destination(&self) -> Result<&str> {
        match &self.target {
            TxTarget::Address { raw, .. } => Ok(raw),
            _ => Err(TransferError::InternalError),
        }
    }
}

#[async_trait]
impl TxEngine for TradingSendEngine {
    fn source(&self) -> &AccountArc {
        &self.source
    }

    fn target(&self) -> &TxTarget {
        &self.target
    }

    fn action(&self) -> TxAction {
        TxAction::Send
    }

    fn affected_caches(&self) -> Vec<CacheTag> {
        vec![CacheTag::Balance(self.source.id().to_string())]
    }

    async fn initialise(&self) -> Result<PendingTx> {
        let currency = self.source.currency();
        let balance = self.latest_balance().await?;
        let fee = self.custodial.withdrawal_fee(&currency).await?;
        let limits = self.eligibility.limits(TxAction::Send, &currency).await?;

        let mut selection = FeeSelection::fixed_none(currency.clone());
        selection.resolved.insert(FeeLevel::None, fee.clone());

        let available = balance.total.saturating_sub(&fee)?;
        let fee_for_full = fee.clone();
        Ok(PendingTx::initial(currency, selection)
            .with_balances(balance.total, available)
            .with_fees(fee, fee_for_full)
            .with_limits(limits))
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
        // Single fixed tier; the processor rejects everything else.
        if current.fee_selection.supports(level) {
            return Ok(current);
        }
        Err(TransferError::InternalError)
    }

    async fn validate_amount(&self, current: PendingTx) -> Result<PendingTx> {
        let mut state = check_amount_bounds(
            &current.amount,
            &current.available_balance,
            current.limits.as_ref(),
        );
        if state.can_execute() {
            if let Some(failure) = check_fee_coverage(
                &current.amount,
                &current.fee_amount,
                &current.total_balance,
            ) {
                state = failure;
            }
        }
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
        let raw = self.raw_destination()?;
        if self
            .resolver
            .parse(&self.source.currency(), raw)
            .await
            .is_err()
        {
            return Ok(tx.with_validation(TxValidation::InvalidAddress));
        }
        Ok(tx.with_validation(TxValidation::CanExecute))
    }

    async fn build_confirmations(&self, current: PendingTx) -> Result<PendingTx> {
        let fee = current.fee_amount.clone();
        let amount = current.amount.clone();
        Ok(current
            .put_confirmation(Confirmation::From {
                label: self.source.label().to_string(),
            })
            .put_confirmation(Confirmation::To {
                label: self.target.display_label(),
            })
            .put_confirmation(Confirmation::ProcessingFee { fee: fee.clone() })
            .put_confirmation(Confirmation::Total { amount, fee }))
    }

    async fn execute(&self, current: PendingTx, _credential: Option<String>) -> Result<TxResult> {
        if !current.validation.can_execute() {
            return Err(TransferError::InternalError);
        }
        let raw = self.raw_destination()?;
        let resolved = self.resolver.parse(&self.source.currency(), raw).await?;
        let memo = match current.confirmation(ConfirmationTag::Memo) {
            Some(Confirmation::Memo { value, .. }) => value.clone(),
            _ => None,
        };
        debug!(source = self.source.id(), "requesting custodial withdrawal");
        let order_id = self
            .custodial
            .withdraw(
                self.source.id(),
                &resolved.address,
                &current.amount,
                memo.as_deref(),
            )
            .await?;
        Ok(TxResult::Unhashed {
            order_id: Some(order_id),
        })
    }
}
