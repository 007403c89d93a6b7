use crate::application::engine::{TxEngine, TxResult, check_amount_bounds, check_fee_coverage};
use crate::domain::account::{AccountBalance, TxAction, TxTarget};
use crate::domain::confirmation::Confirmation;
use crate::domain::money::{ExchangeRate, Money};
use crate::domain::pending::{EngineData, FeeLevel, FeeSelection, PendingTx};
use crate::domain::ports::{
    AccountArc, AssetCatalogue, CacheTag, EligibilityProvider, Feature, FeatureAccess,
    Quote, QuoteService,
};
use crate::domain::validation::TxValidation;
use crate::error::{Result, TransferError};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use tracing::debug;

/// Exchanges one custodial balance for another against a locked,
/// time-limited quote. Covers both crypto-to-crypto swaps and sells into
/// a fiat balance; the two differ only in action, feature gate, and
/// target currency.
///
/// Amounts may be entered in fiat: they are converted to the source
/// asset through the catalogue's exchange rate before pricing.
pub struct SwapEngine {
    source: AccountArc,
    target: TxTarget,
    action: TxAction,
    feature: Feature,
    catalogue: Arc<dyn AssetCatalogue>,
    quotes: Arc<dyn QuoteService>,
    eligibility: Arc<dyn EligibilityProvider>,
}

impl SwapEngine {
    pub fn swap(
        source: AccountArc,
        target: TxTarget,
        catalogue: Arc<dyn AssetCatalogue>,
        quotes: Arc<dyn QuoteService>,
        eligibility: Arc<dyn EligibilityProvider>,
    ) -> Self {
        Self {
            source,
            target,
            action: TxAction::Swap,
            feature: Feature::Swap,
            catalogue,
            quotes,
            eligibility,
        }
    }

    pub fn sell(
        source: AccountArc,
        target: TxTarget,
        catalogue: Arc<dyn AssetCatalogue>,
        quotes: Arc<dyn QuoteService>,
        eligibility: Arc<dyn EligibilityProvider>,
    ) -> Self {
        Self {
            source,
            target,
            action: TxAction::Sell,
            feature: Feature::Sell,
            catalogue,
            quotes,
            eligibility,
        }
    }

    async fn latest_balance(&self) -> Result<AccountBalance> {
        self.source
            .balance()
            .next()
            .await
            .ok_or_else(|| TransferError::Network("balance stream ended".into()))
    }

    /// Converts fiat-entered amounts into the source asset.
    async fn normalise_amount(&self, amount: Money) -> Result<Money> {
        let source_currency = self.source.currency();
        if amount.currency == source_currency {
            return Ok(amount);
        }
        if !amount.currency.is_fiat() {
            return Err(TransferError::CurrencyMismatch {
                expected: source_currency,
                actual: amount.currency,
            });
        }
        let rate = self
            .catalogue
            .exchange_rate(&amount.currency, &source_currency)
            .await?;
        rate.convert(&amount)
    }

    fn quote_of(tx: &PendingTx) -> Option<&Quote> {
        match &tx.engine_data {
            Some(EngineData::Swap { quote }) => Some(quote),
            _ => None,
        }
    }
}

#[async_trait]
impl TxEngine for SwapEngine {
    fn source(&self) -> &AccountArc {
        &self.source
    }

    fn target(&self) -> &TxTarget {
        &self.target
    }

    fn action(&self) -> TxAction {
        self.action
    }

    fn accepts_fiat_input(&self) -> bool {
        true
    }

    fn affected_caches(&self) -> Vec<CacheTag> {
        let mut tags = vec![
            CacheTag::Balance(self.source.id().to_string()),
            CacheTag::OpenOrders,
        ];
        if let TxTarget::Account(account) = &self.target {
            tags.push(CacheTag::Balance(account.id().to_string()));
        }
        tags
    }

    async fn initialise(&self) -> Result<PendingTx> {
        if let FeatureAccess::Blocked { reason } = self.eligibility.access(self.feature).await? {
            return Err(TransferError::Unavailable { reason });
        }
        let currency = self.source.currency();
        let balance = self.latest_balance().await?;
        let limits = self.eligibility.limits(self.action, &currency).await?;
        let available = balance.available.clone();
        Ok(
            PendingTx::initial(currency.clone(), FeeSelection::fixed_none(currency))
                .with_balances(balance.total, available)
                .with_limits(limits),
        )
    }

    async fn update_amount(&self, amount: Money, current: PendingTx) -> Result<PendingTx> {
        let amount = self.normalise_amount(amount).await?;
        let currency = self.source.currency();

        if !amount.is_positive() {
            let zero = Money::zero(currency);
            let fee_for_full = zero.clone();
            return Ok(current.with_amount(amount).with_fees(zero, fee_for_full));
        }

        let quote = self
            .quotes
            .quote(&currency, &self.target.currency(), &amount)
            .await?;
        debug!(quote = quote.id, "locked exchange quote");

        let fee = quote.fee.clone();
        let mut selection = current.fee_selection.clone();
        selection.resolved.insert(FeeLevel::None, fee.clone());

        let fee_for_full = fee.clone();
        Ok(current
            .with_amount(amount)
            .with_fee_selection(selection)
            .with_fees(fee, fee_for_full)
            .with_engine_data(EngineData::Swap { quote }))
    }

    async fn update_fee_level(
        &self,
        current: PendingTx,
        level: FeeLevel,
        _custom: Option<Money>,
    ) -> Result<PendingTx> {
        // Quote-driven rails have no user-selectable fee tier.
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
        let orders = self.quotes.open_orders().await?;
        if orders.at_limit() {
            return Ok(tx.with_validation(TxValidation::PendingOrdersLimitReached));
        }
        let quote_state = match Self::quote_of(&tx) {
            Some(quote) if Utc::now() >= quote.expires_at => TxValidation::InvoiceExpired,
            Some(_) => TxValidation::CanExecute,
            None => TxValidation::InvalidAmount,
        };
        Ok(tx.with_validation(quote_state))
    }

    async fn build_confirmations(&self, current: PendingTx) -> Result<PendingTx> {
        let fee = current.fee_amount.clone();
        let amount = current.amount.clone();
        let quote = Self::quote_of(&current).cloned();

        let mut tx = current
            .put_confirmation(Confirmation::From {
                label: self.source.label().to_string(),
            })
            .put_confirmation(Confirmation::To {
                label: self.target.display_label(),
            })
            .put_confirmation(Confirmation::ProcessingFee { fee: fee.clone() })
            .put_confirmation(Confirmation::Total { amount, fee });

        if let Some(quote) = quote {
            tx = tx
                .put_confirmation(Confirmation::Rate {
                    rate: ExchangeRate::new(
                        self.source.currency(),
                        self.target.currency(),
                        quote.rate,
                    ),
                })
                .put_confirmation(Confirmation::Deadline {
                    expires_at: quote.expires_at,
                });
        }
        Ok(tx)
    }

    async fn execute(&self, current: PendingTx, _credential: Option<String>) -> Result<TxResult> {
        if !current.validation.can_execute() {
            return Err(TransferError::InternalError);
        }
        let quote = Self::quote_of(&current).ok_or(TransferError::QuoteInvalid)?;
        if Utc::now() >= quote.expires_at {
            return Err(TransferError::QuoteExpired);
        }
        let order_id = self
            .quotes
            .execute_order(&quote.id, &current.amount)
            .await?;
        Ok(TxResult::Unhashed {
            order_id: Some(order_id),
        })
    }

    async fn cancel(&self, current: PendingTx) -> Result<()> {
        if let Some(quote) = Self::quote_of(&current) {
            self.quotes.release_quote(&quote.id).await?;
        }
        Ok(())
    }
}
