use crate::application::engine::{TxEngine, TxResult, check_amount_bounds, check_fee_coverage};
use crate::domain::account::{AccountBalance, TxAction, TxTarget};
use crate::domain::confirmation::Confirmation;
use crate::domain::money::Money;
use crate::domain::pending::{EngineData, FeeLevel, FeeSelection, PendingTx};
use crate::domain::ports::{AccountArc, FeeOracle, TxBroadcaster};
use crate::domain::validation::TxValidation;
use crate::error::{Result, TransferError};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Signs a connected-app payload with the source account's key.
///
/// The amount, if any, is fixed by the payload and not user-editable;
/// a value-free payload is a plain message signature and validates with
/// a zero amount. The signed payload is returned to the caller; the
/// requesting app relays it, so no broadcast happens here.
pub struct OnChainSignEngine {
    source: AccountArc,
    target: TxTarget,
    fees: Arc<dyn FeeOracle>,
    broadcaster: Arc<dyn TxBroadcaster>,
}

impl OnChainSignEngine {
    pub fn new(
        source: AccountArc,
        target: TxTarget,
        fees: Arc<dyn FeeOracle>,
        broadcaster: Arc<dyn TxBroadcaster>,
    ) -> Self {
        Self {
            source,
            target,
            fees,
            broadcaster,
        }
    }

    fn payload(&self) -> Result<(&[u8], Option<&Money>)> {
        match &self.target {
            TxTarget::Payload { data, amount, .. } => Ok((data, amount.as_ref())),
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
impl TxEngine for OnChainSignEngine {
    fn source(&self) -> &AccountArc {
        &self.source
    }

    fn target(&self) -> &TxTarget {
        &self.target
    }

    fn action(&self) -> TxAction {
        TxAction::Sign
    }

    async fn initialise(&self) -> Result<PendingTx> {
        let currency = self.source.currency();
        let (data, payload_amount) = self.payload()?;
        let payload_bytes = data.len();
        let balance = self.latest_balance().await?;

        let (selection, amount, fee) = match payload_amount {
            Some(amount) => {
                let fee = self
                    .fees
                    .estimate(&currency, FeeLevel::Regular, amount)
                    .await?;
                let mut resolved = BTreeMap::new();
                resolved.insert(FeeLevel::Regular, fee.clone());
                let selection = FeeSelection {
                    selected: FeeLevel::Regular,
                    available: vec![FeeLevel::Regular],
                    resolved,
                    custom: None,
                    asset: currency.clone(),
                };
                (selection, amount.clone(), fee)
            }
            None => (
                FeeSelection::fixed_none(currency.clone()),
                Money::zero(currency.clone()),
                Money::zero(currency.clone()),
            ),
        };

        let available = balance.total.saturating_sub(&fee)?;
        Ok(PendingTx::initial(currency, selection)
            .with_amount(amount)
            .with_balances(balance.total, available)
            .with_fees(fee.clone(), fee)
            .with_engine_data(EngineData::Sign { payload_bytes }))
    }

    /// The payload fixes the amount; consumer edits are ignored.
    async fn update_amount(&self, _amount: Money, current: PendingTx) -> Result<PendingTx> {
        Ok(current)
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
        // A value-free signature request has nothing to fund.
        if current.amount.is_zero() {
            return Ok(current.with_validation(TxValidation::CanExecute));
        }
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
        self.validate_amount(current).await
    }

    async fn build_confirmations(&self, current: PendingTx) -> Result<PendingTx> {
        let amount = current.amount.clone();
        let fee = current.fee_amount.clone();
        let level = current.fee_selection.selected;
        let mut tx = current
            .put_confirmation(Confirmation::From {
                label: self.source.label().to_string(),
            })
            .put_confirmation(Confirmation::To {
                label: self.target.display_label(),
            });
        if amount.is_positive() {
            tx = tx
                .put_confirmation(Confirmation::NetworkFee {
                    fee: fee.clone(),
                    level,
                })
                .put_confirmation(Confirmation::Total { amount, fee });
        }
        Ok(tx)
    }

    async fn execute(&self, current: PendingTx, _credential: Option<String>) -> Result<TxResult> {
        if !current.validation.can_execute() {
            return Err(TransferError::InternalError);
        }
        let (data, _) = self.payload()?;
        let signature = self.broadcaster.sign(self.source.id(), data).await?;
        Ok(TxResult::Signed { signature })
    }
}
