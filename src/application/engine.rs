use crate::domain::account::{TxAction, TxTarget};
use crate::domain::confirmation::Confirmation;
use crate::domain::money::Money;
use crate::domain::pending::{FeeLevel, PendingTx, TxLimits};
use crate::domain::ports::{AccountArc, ApprovalPayload, CacheTag};
use crate::domain::validation::TxValidation;
use crate::error::Result;
use async_trait::async_trait;

/// Outcome of a successful execution.
#[derive(Debug, Clone, PartialEq)]
pub enum TxResult {
    /// On-chain transfer accepted by the network.
    Hashed { tx_id: String },
    /// Custodial or batched rail acknowledged the transfer without a
    /// chain hash.
    Unhashed { order_id: Option<String> },
    /// Signature-only execution.
    Signed { signature: String },
    /// The rail requires an out-of-band user action before settling;
    /// non-fatal, carries the approval payload.
    PendingApproval { payload: ApprovalPayload },
}

/// Per-rail transfer strategy: one implementation per
/// (source-account-kind, target-kind, action) combination.
///
/// Implementations are stateless beyond their construction-time
/// collaborators; every call derives from the snapshot passed in and
/// returns a new, fully formed snapshot. That keeps repeated calls with
/// rapidly changing inputs safe; the orchestrator discards any result
/// that no longer matches the latest request.
#[async_trait]
pub trait TxEngine: Send + Sync {
    fn source(&self) -> &AccountArc;
    fn target(&self) -> &TxTarget;
    fn action(&self) -> TxAction;

    /// Whether `update_amount` accepts amounts denominated in fiat when
    /// the source asset is crypto.
    fn accepts_fiat_input(&self) -> bool {
        false
    }

    /// Read-through caches a successful execution invalidates.
    fn affected_caches(&self) -> Vec<CacheTag> {
        vec![CacheTag::Balance(self.source().id().to_string())]
    }

    /// Builds the first snapshot: balances, default fee tier, zero
    /// amount, limits. Read-only lookups only, no side effects.
    async fn initialise(&self) -> Result<PendingTx>;

    async fn update_amount(&self, amount: Money, current: PendingTx) -> Result<PendingTx>;

    async fn update_fee_level(
        &self,
        current: PendingTx,
        level: FeeLevel,
        custom: Option<Money>,
    ) -> Result<PendingTx>;

    /// Applies a user edit to an already-offered confirmation option.
    async fn update_option(&self, current: PendingTx, value: Confirmation) -> Result<PendingTx> {
        Ok(current.put_confirmation(value))
    }

    /// Amount-affecting rules only: funds, min/max, fee affordability.
    async fn validate_amount(&self, current: PendingTx) -> Result<PendingTx>;

    /// Everything `validate_amount` checks plus transaction-wide rules:
    /// address and memo validity, in-flight transactions, deadlines.
    /// Always re-run immediately before execution.
    async fn validate_all(&self, current: PendingTx) -> Result<PendingTx>;

    /// Materialises the confirmation list for the current snapshot.
    /// Idempotent: the same snapshot yields the same list by tag.
    async fn build_confirmations(&self, current: PendingTx) -> Result<PendingTx>;

    /// Performs the transfer. Only invoked with `CanExecute` snapshots;
    /// engines re-check and fail fast otherwise.
    async fn execute(&self, current: PendingTx, credential: Option<String>) -> Result<TxResult>;

    /// Best-effort teardown; the orchestrator swallows failures so
    /// cancellation never blocks the consumer.
    async fn cancel(&self, current: PendingTx) -> Result<()> {
        let _ = current;
        Ok(())
    }
}

pub type EngineBox = Box<dyn TxEngine>;

/// Shared amount rules, applied by every engine so the state machine
/// behaves identically across rails. Order: malformed amount, minimum,
/// spendable funds, tiered maximum.
pub(crate) fn check_amount_bounds(
    amount: &Money,
    available: &Money,
    limits: Option<&TxLimits>,
) -> TxValidation {
    if !amount.is_positive() {
        return TxValidation::InvalidAmount;
    }
    if let Some(min) = limits.and_then(|l| l.min.as_ref()) {
        if matches!(amount.partial_cmp(min), Some(std::cmp::Ordering::Less)) {
            return TxValidation::UnderMinLimit;
        }
    }
    if matches!(
        amount.partial_cmp(available),
        Some(std::cmp::Ordering::Greater) | None
    ) {
        return TxValidation::InsufficientFunds;
    }
    if let Some(limits) = limits {
        if let Some(max) = &limits.max {
            if matches!(amount.partial_cmp(max), Some(std::cmp::Ordering::Greater)) {
                return limits.max_reason.over_limit_state();
            }
        }
    }
    TxValidation::CanExecute
}

/// Same-asset fee affordability: amount plus fee must fit in the total
/// balance. Returns `None` when the fee is paid in a different asset.
pub(crate) fn check_fee_coverage(
    amount: &Money,
    fee: &Money,
    total: &Money,
) -> Option<TxValidation> {
    let spend = amount.checked_add(fee).ok()?;
    if matches!(
        spend.partial_cmp(total),
        Some(std::cmp::Ordering::Greater) | None
    ) {
        return Some(TxValidation::InsufficientFunds);
    }
    None
}
