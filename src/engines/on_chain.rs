use crate::application::engine::{TxEngine, TxResult, check_amount_bounds, check_fee_coverage};
use crate::domain::account::{AccountBalance, TxAction, TxTarget};
use crate::domain::confirmation::{Confirmation, ConfirmationTag};
use crate::domain::money::Money;
use crate::domain::pending::{FeeLevel, FeeSelection, PendingTx};
use crate::domain::ports::{
    AccountArc, AddressResolver, AssetCatalogue, AssetInfo, CacheTag,
    EligibilityProvider, FeeOracle, ResolvedAddress, TxBroadcaster, TxSpec,
};
use crate::domain::validation::TxValidation;
use crate::error::{Result, TransferError};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Longest memo accepted by the memo-capable chains we route to.
const MAX_MEMO_LEN: usize = 28;

/// Cap on the free-text note stored alongside a transfer.
const MAX_DESCRIPTION_LEN: usize = 140;

/// Sends from a non-custodial account to an external address, a resolved
/// domain, another account's receive address, or a payment invoice.
///
/// Network fees are estimated per tier through the fee oracle. Token
/// sends pay the fee in the chain's native asset from a separate gas
/// account; when no gas account is wired the engine can only verify
/// same-asset affordability.
pub struct OnChainSendEngine {
    source: AccountArc,
    target: TxTarget,
    catalogue: Arc<dyn AssetCatalogue>,
    resolver: Arc<dyn AddressResolver>,
    fees: Arc<dyn FeeOracle>,
    eligibility: Arc<dyn EligibilityProvider>,
    broadcaster: Arc<dyn TxBroadcaster>,
    gas_funds: Option<AccountArc>,
}

impl OnChainSendEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: AccountArc,
        target: TxTarget,
        catalogue: Arc<dyn AssetCatalogue>,
        resolver: Arc<dyn AddressResolver>,
        fees: Arc<dyn FeeOracle>,
        eligibility: Arc<dyn EligibilityProvider>,
        broadcaster: Arc<dyn TxBroadcaster>,
    ) -> Self {
        Self {
            source,
            target,
            catalogue,
            resolver,
            fees,
            eligibility,
            broadcaster,
            gas_funds: None,
        }
    }

    /// Wires the native-asset account that pays gas for token sends.
    pub fn with_gas_funds(mut self, gas_funds: AccountArc) -> Self {
        self.gas_funds = Some(gas_funds);
        self
    }

    fn asset_info(&self) -> Result<AssetInfo> {
        let currency = self.source.currency();
        self.catalogue
            .asset(&currency)
            .ok_or_else(|| TransferError::InvalidCurrency(currency.code.clone()))
    }

    async fn latest_balance(account: &AccountArc) -> Result<AccountBalance> {
        account
            .balance()
            .next()
            .await
            .ok_or_else(|| TransferError::Network("balance stream ended".into()))
    }

    async fn resolve_tiers(
        &self,
        info: &AssetInfo,
        amount: &Money,
    ) -> Result<BTreeMap<FeeLevel, Money>> {
        let mut resolved = BTreeMap::new();
        for level in [FeeLevel::Regular, FeeLevel::Priority] {
            let fee = self.fees.estimate(&info.fee_currency, level, amount).await?;
            resolved.insert(level, fee);
        }
        Ok(resolved)
    }

    /// Re-derives fee, fee-for-full-available and spendable balance for
    /// the given amount and the currently selected tier.
    async fn reprice(&self, current: PendingTx, amount: Money) -> Result<PendingTx> {
        let info = self.asset_info()?;
        let mut selection = current.fee_selection.clone();
        selection.resolved = self.resolve_tiers(&info, &amount).await?;

        let fee = selection
            .fee_for(selection.selected)
            .cloned()
            .ok_or(TransferError::InternalError)?;
        // Custom fees are flat; estimated tiers re-quote for a full sweep.
        let fee_for_full = if selection.selected == FeeLevel::Custom {
            fee.clone()
        } else {
            self.fees
                .estimate(&info.fee_currency, selection.selected, &current.total_balance)
                .await?
        };

        let available = if info.fee_currency == info.currency {
            current.total_balance.saturating_sub(&fee_for_full)?
        } else {
            current.total_balance.clone()
        };

        let total = current.total_balance.clone();
        Ok(current
            .with_amount(amount)
            .with_fee_selection(selection)
            .with_fees(fee, fee_for_full)
            .with_balances(total, available))
    }

    async fn check_destination(&self) -> Result<Option<TxValidation>> {
        let currency = self.source.currency();
        match &self.target {
            TxTarget::Address { raw, .. } => match self.resolver.parse(&currency, raw).await {
                Ok(ResolvedAddress {
                    is_contract: true, ..
                }) => Ok(Some(TxValidation::AddressIsContract)),
                Ok(_) => Ok(None),
                Err(_) => Ok(Some(TxValidation::InvalidAddress)),
            },
            TxTarget::Domain { name, .. } => {
                match self.resolver.resolve_domain(&currency, name).await {
                    Ok(ResolvedAddress {
                        is_contract: true, ..
                    }) => Ok(Some(TxValidation::AddressIsContract)),
                    Ok(_) => Ok(None),
                    Err(_) => Ok(Some(TxValidation::InvalidDomain)),
                }
            }
            TxTarget::Account(_) | TxTarget::Invoice { .. } => Ok(None),
            TxTarget::Bank(_) | TxTarget::Payload { .. } => Err(TransferError::InternalError),
        }
    }

    async fn memo_requirement(&self) -> Result<bool> {
        match &self.target {
            TxTarget::Account(account) => Ok(account.receive_address().await?.memo.is_some()),
            _ => Ok(false),
        }
    }

    fn check_memo(tx: &PendingTx, required: bool) -> Option<TxValidation> {
        let value = match tx.confirmation(ConfirmationTag::Memo) {
            Some(Confirmation::Memo { value, .. }) => value.clone(),
            _ => None,
        };
        match value {
            Some(memo) if memo.is_empty() || memo.len() > MAX_MEMO_LEN => {
                Some(TxValidation::MemoInvalid)
            }
            Some(_) => None,
            None if required => Some(TxValidation::MemoInvalid),
            None => None,
        }
    }

    async fn destination_address(&self) -> Result<String> {
        let currency = self.source.currency();
        match &self.target {
            TxTarget::Address { raw, .. } => {
                Ok(self.resolver.parse(&currency, raw).await?.address)
            }
            TxTarget::Domain { name, .. } => {
                Ok(self.resolver.resolve_domain(&currency, name).await?.address)
            }
            TxTarget::Account(account) => Ok(account.receive_address().await?.address),
            TxTarget::Invoice { address, .. } => Ok(address.clone()),
            TxTarget::Bank(_) | TxTarget::Payload { .. } => Err(TransferError::InternalError),
        }
    }
}

#[async_trait]
impl TxEngine for OnChainSendEngine {
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
        let mut tags = vec![CacheTag::Balance(self.source.id().to_string())];
        if let TxTarget::Account(account) = &self.target {
            tags.push(CacheTag::Balance(account.id().to_string()));
        }
        tags
    }

    async fn initialise(&self) -> Result<PendingTx> {
        let info = self.asset_info()?;
        let currency = self.source.currency();
        let balance = Self::latest_balance(&self.source).await?;
        let limits = self
            .eligibility
            .limits(TxAction::Send, &currency)
            .await?;

        let selection = FeeSelection {
            selected: FeeLevel::Regular,
            available: vec![FeeLevel::Regular, FeeLevel::Priority, FeeLevel::Custom],
            resolved: BTreeMap::new(),
            custom: None,
            asset: info.fee_currency.clone(),
        };

        let tx = PendingTx::initial(currency, selection)
            .with_balances(balance.total.clone(), balance.available)
            .with_limits(limits);

        // Invoices arrive pre-priced; the amount is not user-editable in
        // any meaningful sense but still flows through validation.
        let amount = match &self.target {
            TxTarget::Invoice { amount, .. } => amount.clone(),
            _ => tx.amount.clone(),
        };
        self.reprice(tx, amount).await
    }

    async fn update_amount(&self, amount: Money, current: PendingTx) -> Result<PendingTx> {
        if amount.currency != self.source.currency() {
            return Err(TransferError::CurrencyMismatch {
                expected: self.source.currency(),
                actual: amount.currency,
            });
        }
        self.reprice(current, amount).await
    }

    async fn update_fee_level(
        &self,
        current: PendingTx,
        level: FeeLevel,
        custom: Option<Money>,
    ) -> Result<PendingTx> {
        if !current.fee_selection.supports(level) {
            // The processor gates levels; reaching this is a logic bug.
            return Err(TransferError::InternalError);
        }
        let mut selection = current.fee_selection.clone();
        selection.selected = level;
        if level == FeeLevel::Custom {
            selection.custom = Some(custom.ok_or(TransferError::InternalError)?);
        }
        let amount = current.amount.clone();
        self.reprice(current.with_fee_selection(selection), amount)
            .await
    }

    async fn validate_amount(&self, current: PendingTx) -> Result<PendingTx> {
        let mut state = check_amount_bounds(
            &current.amount,
            &current.available_balance,
            current.limits.as_ref(),
        );
        if state.can_execute() {
            if current.fee_amount.currency == current.amount.currency {
                if let Some(failure) = check_fee_coverage(
                    &current.amount,
                    &current.fee_amount,
                    &current.total_balance,
                ) {
                    state = failure;
                }
            } else if let Some(gas_funds) = &self.gas_funds {
                let gas = Self::latest_balance(gas_funds).await?;
                if matches!(
                    gas.available.partial_cmp(&current.fee_amount),
                    Some(std::cmp::Ordering::Less) | None
                ) {
                    state = TxValidation::InsufficientGas;
                }
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

        if let TxTarget::Invoice { expires_at, .. } = &self.target {
            if Utc::now() >= *expires_at {
                return Ok(tx.with_validation(TxValidation::InvoiceExpired));
            }
        }

        if let Some(state) = self.check_destination().await? {
            return Ok(tx.with_validation(state));
        }

        if let Some(Confirmation::Description { value }) =
            tx.confirmation(ConfirmationTag::Description)
        {
            if value.chars().count() > MAX_DESCRIPTION_LEN {
                return Ok(tx.with_validation(TxValidation::OptionInvalid));
            }
        }

        let info = self.asset_info()?;
        if info.supports_memo {
            let required = self.memo_requirement().await?;
            if let Some(state) = Self::check_memo(&tx, required) {
                return Ok(tx.with_validation(state));
            }
        }

        Ok(tx.with_validation(TxValidation::CanExecute))
    }

    async fn build_confirmations(&self, current: PendingTx) -> Result<PendingTx> {
        let info = self.asset_info()?;
        let fee = current.fee_amount.clone();
        let level = current.fee_selection.selected;
        let amount = current.amount.clone();

        let mut tx = current
            .put_confirmation(Confirmation::From {
                label: self.source.label().to_string(),
            })
            .put_confirmation(Confirmation::To {
                label: self.target.display_label(),
            })
            .put_confirmation(Confirmation::NetworkFee {
                fee: fee.clone(),
                level,
            })
            .put_confirmation(Confirmation::Total { amount, fee });

        if info.supports_memo {
            let existing = match tx.confirmation(ConfirmationTag::Memo) {
                Some(Confirmation::Memo { value, .. }) => value.clone(),
                _ => None,
            };
            let required = self.memo_requirement().await?;
            tx = tx.put_confirmation(Confirmation::Memo {
                value: existing,
                required,
            });
        }

        let description = match tx.confirmation(ConfirmationTag::Description) {
            Some(Confirmation::Description { value }) => value.clone(),
            _ => String::new(),
        };
        tx = tx.put_confirmation(Confirmation::Description { value: description });

        if let TxTarget::Invoice { expires_at, .. } = &self.target {
            tx = tx.put_confirmation(Confirmation::Deadline {
                expires_at: *expires_at,
            });
        }
        Ok(tx)
    }

    async fn execute(&self, current: PendingTx, _credential: Option<String>) -> Result<TxResult> {
        if !current.validation.can_execute() {
            return Err(TransferError::InternalError);
        }
        let destination = self.destination_address().await?;
        let memo = match current.confirmation(ConfirmationTag::Memo) {
            Some(Confirmation::Memo { value, .. }) => value.clone(),
            _ => None,
        };
        let spec = TxSpec {
            source_id: self.source.id().to_string(),
            destination,
            amount: current.amount.clone(),
            fee: current.fee_amount.clone(),
            memo,
        };
        debug!(source = spec.source_id, "broadcasting on-chain transfer");
        let tx_id = self.broadcaster.broadcast(&spec).await?;
        Ok(TxResult::Hashed { tx_id })
    }
}
