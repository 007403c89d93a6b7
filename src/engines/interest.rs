use crate::application::engine::{TxEngine, TxResult, check_amount_bounds, check_fee_coverage};
use crate::domain::account::{AccountBalance, AccountKind, TxAction, TxTarget};
use crate::domain::confirmation::Confirmation;
use crate::domain::money::Money;
use crate::domain::pending::{EngineData, FeeLevel, FeeSelection, PendingTx};
use crate::domain::ports::{
    AccountArc, CacheTag, CustodialRail, EligibilityProvider, Feature, FeatureAccess,
    FeeOracle, TxBroadcaster, TxSpec,
};
use crate::domain::validation::TxValidation;
use crate::error::{Result, TransferError};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

async fn latest_balance(account: &AccountArc) -> Result<AccountBalance> {
    account
        .balance()
        .next()
        .await
        .ok_or_else(|| TransferError::Network("balance stream ended".into()))
}

/// Moves funds into an interest-bearing position, either from a
/// custodial trading balance (internal transfer, no fee) or from a
/// non-custodial account (an on-chain send to the product's receive
/// address, paying a regular network fee).
///
/// Deposits are gated on eligibility and carry the product's withdrawal
/// lock so the consumer can surface it before committing.
pub struct InterestDepositEngine {
    source: AccountArc,
    target: TxTarget,
    eligibility: Arc<dyn EligibilityProvider>,
    custodial: Arc<dyn CustodialRail>,
    fees: Arc<dyn FeeOracle>,
    broadcaster: Arc<dyn TxBroadcaster>,
}

impl InterestDepositEngine {
    pub fn new(
        source: AccountArc,
        target: TxTarget,
        eligibility: Arc<dyn EligibilityProvider>,
        custodial: Arc<dyn CustodialRail>,
        fees: Arc<dyn FeeOracle>,
        broadcaster: Arc<dyn TxBroadcaster>,
    ) -> Self {
        Self {
            source,
            target,
            eligibility,
            custodial,
            fees,
            broadcaster,
        }
    }

    fn custodial_funded(&self) -> bool {
        self.source.kinds().contains(&AccountKind::Trading)
    }

    fn target_account(&self) -> Result<&AccountArc> {
        match &self.target {
            TxTarget::Account(account) => Ok(account),
            _ => Err(TransferError::InternalError),
        }
    }

    async fn network_fee(&self, amount: &Money) -> Result<Money> {
        if self.custodial_funded() {
            return Ok(Money::zero(self.source.currency()));
        }
        self.fees
            .estimate(&self.source.currency(), FeeLevel::Regular, amount)
            .await
    }
}

#[async_trait]
impl TxEngine for InterestDepositEngine {
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
        let mut tags = vec![CacheTag::Balance(self.source.id().to_string())];
        if let Ok(account) = self.target_account() {
            tags.push(CacheTag::Balance(account.id().to_string()));
        }
        tags
    }

    async fn initialise(&self) -> Result<PendingTx> {
        if let FeatureAccess::Blocked { reason } =
            self.eligibility.access(Feature::InterestDeposit).await?
        {
            return Err(TransferError::Unavailable { reason });
        }
        let currency = self.source.currency();
        let balance = latest_balance(&self.source).await?;
        let limits = self.eligibility.limits(TxAction::Deposit, &currency).await?;
        let terms = self.custodial.product_terms(&currency).await?;

        let selection = if self.custodial_funded() {
            FeeSelection::fixed_none(currency.clone())
        } else {
            let fee = self.network_fee(&balance.total).await?;
            let mut resolved = BTreeMap::new();
            resolved.insert(FeeLevel::Regular, fee);
            FeeSelection {
                selected: FeeLevel::Regular,
                available: vec![FeeLevel::Regular],
                resolved,
                custom: None,
                asset: currency.clone(),
            }
        };

        let fee = selection
            .fee_for(selection.selected)
            .cloned()
            .unwrap_or_else(|| Money::zero(currency.clone()));
        let available = balance.total.saturating_sub(&fee)?;
        Ok(PendingTx::initial(currency, selection)
            .with_balances(balance.total, available)
            .with_fees(fee.clone(), fee)
            .with_limits(limits)
            .with_engine_data(EngineData::Interest {
                lock_days: terms.lock_days,
            }))
    }

    async fn update_amount(&self, amount: Money, current: PendingTx) -> Result<PendingTx> {
        if amount.currency != self.source.currency() {
            return Err(TransferError::CurrencyMismatch {
                expected: self.source.currency(),
                actual: amount.currency,
            });
        }
        let fee = self.network_fee(&amount).await?;
        let fee_for_full = self.network_fee(&current.total_balance).await?;
        let available = current.total_balance.saturating_sub(&fee_for_full)?;
        let total = current.total_balance.clone();
        Ok(current
            .with_amount(amount)
            .with_fees(fee, fee_for_full)
            .with_balances(total, available))
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
        Ok(tx.with_validation(TxValidation::CanExecute))
    }

    async fn build_confirmations(&self, current: PendingTx) -> Result<PendingTx> {
        let fee = current.fee_amount.clone();
        let amount = current.amount.clone();
        let level = current.fee_selection.selected;
        let lock_days = match &current.engine_data {
            Some(EngineData::Interest { lock_days }) => *lock_days,
            _ => 0,
        };

        let mut tx = current
            .put_confirmation(Confirmation::From {
                label: self.source.label().to_string(),
            })
            .put_confirmation(Confirmation::To {
                label: self.target.display_label(),
            })
            .put_confirmation(Confirmation::WithdrawalTerms { lock_days })
            .put_confirmation(Confirmation::Total {
                amount,
                fee: fee.clone(),
            });
        if !self.custodial_funded() {
            tx = tx.put_confirmation(Confirmation::NetworkFee { fee, level });
        }
        Ok(tx)
    }

    async fn execute(&self, current: PendingTx, _credential: Option<String>) -> Result<TxResult> {
        if !current.validation.can_execute() {
            return Err(TransferError::InternalError);
        }
        let target = self.target_account()?;
        if self.custodial_funded() {
            debug!(source = self.source.id(), "interest deposit via internal transfer");
            let order_id = self
                .custodial
                .internal_transfer(self.source.id(), target.id(), &current.amount)
                .await?;
            return Ok(TxResult::Unhashed {
                order_id: Some(order_id),
            });
        }
        let receive = target.receive_address().await?;
        let spec = TxSpec {
            source_id: self.source.id().to_string(),
            destination: receive.address,
            amount: current.amount.clone(),
            fee: current.fee_amount.clone(),
            memo: receive.memo,
        };
        let tx_id = self.broadcaster.broadcast(&spec).await?;
        Ok(TxResult::Hashed { tx_id })
    }
}

/// Releases funds from an interest position back into a trading or
/// non-custodial account. Locked rewards stay pending; only the
/// account-reported available balance is spendable.
pub struct InterestWithdrawEngine {
    source: AccountArc,
    target: TxTarget,
    eligibility: Arc<dyn EligibilityProvider>,
    custodial: Arc<dyn CustodialRail>,
}

impl InterestWithdrawEngine {
    pub fn new(
        source: AccountArc,
        target: TxTarget,
        eligibility: Arc<dyn EligibilityProvider>,
        custodial: Arc<dyn CustodialRail>,
    ) -> Self {
        Self {
            source,
            target,
            eligibility,
            custodial,
        }
    }

    fn target_account(&self) -> Result<&AccountArc> {
        match &self.target {
            TxTarget::Account(account) => Ok(account),
            _ => Err(TransferError::InternalError),
        }
    }
}

#[async_trait]
impl TxEngine for InterestWithdrawEngine {
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
        let mut tags = vec![CacheTag::Balance(self.source.id().to_string())];
        if let Ok(account) = self.target_account() {
            tags.push(CacheTag::Balance(account.id().to_string()));
        }
        tags
    }

    async fn initialise(&self) -> Result<PendingTx> {
        let currency = self.source.currency();
        let balance = latest_balance(&self.source).await?;
        let limits = self
            .eligibility
            .limits(TxAction::Withdraw, &currency)
            .await?;
        let terms = self.custodial.product_terms(&currency).await?;
        Ok(
            PendingTx::initial(currency.clone(), FeeSelection::fixed_none(currency))
                .with_balances(balance.total, balance.available)
                .with_limits(limits)
                .with_engine_data(EngineData::Interest {
                    lock_days: terms.lock_days,
                }),
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
            Some(EngineData::Interest { lock_days }) => *lock_days,
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
        let target = self.target_account()?;
        let order_id = self
            .custodial
            .internal_transfer(self.source.id(), target.id(), &current.amount)
            .await?;
        Ok(TxResult::Unhashed {
            order_id: Some(order_id),
        })
    }
}
