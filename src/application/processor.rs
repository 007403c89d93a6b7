use crate::application::engine::{EngineBox, TxResult};
use crate::domain::confirmation::{Confirmation, ConfirmationTag};
use crate::domain::money::Money;
use crate::domain::pending::{FeeLevel, PendingTx};
use crate::domain::ports::BalanceCache;
use crate::domain::validation::TxValidation;
use crate::error::{ProcessorError, TransferError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, watch};
use tracing::{debug, warn};

/// Binds one engine instance to one live transaction and exposes the
/// single external command surface.
///
/// Commands are serialised behind one mutex, so published snapshots are
/// totally ordered and never derived from a stale predecessor. Amount
/// updates additionally carry a request sequence: the sequence is bumped
/// before the lock is taken, and a result is discarded when a newer
/// request has been issued while the engine was resolving.
///
/// One instance per transaction; after `reset` or `cancel` the processor
/// is closed and a new one must be constructed.
pub struct TransactionProcessor {
    engine: EngineBox,
    cache: Option<Arc<dyn BalanceCache>>,
    state: Mutex<ProcessorState>,
    amount_seq: AtomicU64,
}

#[derive(Default)]
struct ProcessorState {
    current: Option<PendingTx>,
    publisher: Option<watch::Sender<PendingTx>>,
    executed: bool,
    closed: bool,
}

impl TransactionProcessor {
    pub fn new(engine: EngineBox) -> Self {
        Self {
            engine,
            cache: None,
            state: Mutex::new(ProcessorState::default()),
            amount_seq: AtomicU64::new(0),
        }
    }

    pub fn with_cache(engine: EngineBox, cache: Arc<dyn BalanceCache>) -> Self {
        Self {
            cache: Some(cache),
            ..Self::new(engine)
        }
    }

    /// Builds the first snapshot and starts publishing. Fails on a
    /// second call: the processor is bound to exactly one transaction.
    pub async fn initialise(&self) -> Result<PendingTx, ProcessorError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(ProcessorError::Closed);
        }
        if state.current.is_some() {
            return Err(ProcessorError::AlreadyInitialised);
        }
        let tx = self.engine.initialise().await?;
        let (sender, _) = watch::channel(tx.clone());
        state.publisher = Some(sender);
        state.current = Some(tx.clone());
        Ok(tx)
    }

    /// Replay-latest snapshot stream: a new subscriber immediately
    /// observes the current snapshot, then every subsequent update.
    pub async fn subscribe(&self) -> Result<watch::Receiver<PendingTx>, ProcessorError> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(ProcessorError::Closed);
        }
        state
            .publisher
            .as_ref()
            .map(watch::Sender::subscribe)
            .ok_or(ProcessorError::NotInitialised)
    }

    pub async fn current(&self) -> Result<PendingTx, ProcessorError> {
        let state = self.state.lock().await;
        Self::require_current(&state)
    }

    /// Applies a new amount, re-validates, and publishes. Only the
    /// result matching the latest requested amount is ever published;
    /// superseded results are discarded.
    pub async fn update_amount(&self, amount: Money) -> Result<(), ProcessorError> {
        let seq = self.amount_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock().await;
        let current = Self::require_current(&state)?;

        if amount.currency != current.amount.currency {
            if amount.currency.is_fiat() {
                if !self.engine.accepts_fiat_input() {
                    return Err(ProcessorError::FiatInputUnsupported);
                }
            } else {
                return Err(ProcessorError::Engine(TransferError::CurrencyMismatch {
                    expected: current.amount.currency.clone(),
                    actual: amount.currency,
                }));
            }
        }

        let updated = self.engine.update_amount(amount, current).await?;
        let updated = self.revalidate_amount(updated).await?;

        if self.amount_seq.load(Ordering::SeqCst) != seq {
            debug!(seq, "discarding superseded amount update");
            return Ok(());
        }
        Self::publish(&mut state, Self::apply_error_notice(updated));
        Ok(())
    }

    /// Switches the fee tier. Tiers not advertised by the current
    /// snapshot are rejected without touching it.
    pub async fn update_fee_level(
        &self,
        level: FeeLevel,
        custom: Option<Money>,
    ) -> Result<(), ProcessorError> {
        let mut state = self.state.lock().await;
        let current = Self::require_current(&state)?;
        if !current.fee_selection.supports(level) {
            return Err(ProcessorError::FeeLevelUnsupported(level));
        }
        let updated = self.engine.update_fee_level(current, level, custom).await?;
        let updated = self.revalidate_amount(updated).await?;
        Self::publish(&mut state, Self::apply_error_notice(updated));
        Ok(())
    }

    /// Applies a user edit to a confirmation option. An option must have
    /// been offered (present in the confirmation list) before it can be
    /// set; option changes can affect fees and limits, so the whole
    /// snapshot is re-validated.
    pub async fn set_option(&self, value: Confirmation) -> Result<(), ProcessorError> {
        let mut state = self.state.lock().await;
        let current = Self::require_current(&state)?;
        let tag = value.tag();
        if !current.has_confirmation(tag) {
            return Err(ProcessorError::UnknownOption(tag));
        }
        let updated = self.engine.update_option(current, value).await?;
        let updated = self.engine.validate_all(updated).await?.mark_validated();
        Self::publish(&mut state, Self::apply_error_notice(updated));
        Ok(())
    }

    /// Rebuilds confirmations, runs the full validation pass, and
    /// publishes; used before showing a final review step.
    pub async fn validate_all(&self) -> Result<PendingTx, ProcessorError> {
        let mut state = self.state.lock().await;
        let current = Self::require_current(&state)?;
        let updated = self.revalidate_all(current).await?;
        Self::publish(&mut state, updated.clone());
        Ok(updated)
    }

    /// Re-validates synchronously, then executes only from `CanExecute`.
    /// At most one execution ever reaches the engine: a second call
    /// observes `AlreadyExecuted`.
    pub async fn execute(&self, credential: Option<String>) -> Result<TxResult, ProcessorError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(ProcessorError::Closed);
        }
        if state.executed {
            return Err(ProcessorError::AlreadyExecuted);
        }
        let current = Self::require_current(&state)?;
        let validated = self.revalidate_all(current).await?;
        Self::publish(&mut state, validated.clone());

        if !validated.validation.can_execute() {
            return Err(ProcessorError::NotExecutable(validated.validation));
        }

        let result = self.engine.execute(validated, credential).await?;
        state.executed = true;
        if let Some(cache) = &self.cache {
            cache.invalidate(&self.engine.affected_caches());
        }
        Ok(result)
    }

    /// Best-effort engine teardown followed by releasing the processor.
    /// Cancellation failures never block the consumer.
    pub async fn cancel(&self) -> Result<(), ProcessorError> {
        let mut state = self.state.lock().await;
        if let Some(current) = state.current.clone() {
            if let Err(err) = self.engine.cancel(current).await {
                warn!(%err, "engine cancel failed; releasing processor anyway");
            }
        }
        Self::close(&mut state);
        Ok(())
    }

    /// Discards all outstanding asynchronous work and detaches the
    /// engine. The processor is not reusable afterwards.
    pub async fn reset(&self) {
        self.amount_seq.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        Self::close(&mut state);
    }

    async fn revalidate_amount(&self, tx: PendingTx) -> Result<PendingTx, ProcessorError> {
        // A zero amount on a never-yet-validated transaction stays
        // uninitialised instead of surfacing "insufficient funds" before
        // the user has entered anything.
        if tx.amount.is_zero() && !tx.validation_attempted {
            return Ok(tx.with_validation(TxValidation::Uninitialised));
        }
        Ok(self.engine.validate_amount(tx).await?.mark_validated())
    }

    async fn revalidate_all(&self, tx: PendingTx) -> Result<PendingTx, ProcessorError> {
        let built = self.engine.build_confirmations(tx).await?;
        let validated = self.engine.validate_all(built).await?.mark_validated();
        Ok(Self::apply_error_notice(validated))
    }

    /// The error notice is purely a function of the validation state:
    /// attached or replaced on any blocking state, removed otherwise.
    fn apply_error_notice(tx: PendingTx) -> PendingTx {
        let state = tx.validation;
        if state.is_blocking() {
            let limit = match state {
                TxValidation::UnderMinLimit => tx.limits.as_ref().and_then(|l| l.min.clone()),
                TxValidation::OverSilverTierLimit
                | TxValidation::OverGoldTierLimit
                | TxValidation::AbovePaymentMethodLimit => {
                    tx.limits.as_ref().and_then(|l| l.max.clone())
                }
                _ => None,
            };
            tx.put_confirmation(Confirmation::ErrorNotice { state, limit })
        } else {
            tx.remove_confirmation(ConfirmationTag::ErrorNotice)
        }
    }

    fn publish(state: &mut ProcessorState, tx: PendingTx) {
        if let Some(publisher) = &state.publisher {
            // send_replace keeps the replay value fresh even while no
            // subscriber is attached.
            publisher.send_replace(tx.clone());
        }
        state.current = Some(tx);
    }

    fn close(state: &mut ProcessorState) {
        state.closed = true;
        state.current = None;
        state.publisher = None;
    }

    fn require_current(state: &ProcessorState) -> Result<PendingTx, ProcessorError> {
        if state.closed {
            return Err(ProcessorError::Closed);
        }
        state.current.clone().ok_or(ProcessorError::NotInitialised)
    }
}
