use crate::application::engine::EngineBox;
use crate::application::processor::TransactionProcessor;
use crate::domain::account::{AccountKind, TargetKind, TxAction, TxTarget};
use crate::domain::ports::{
    AccountArc, AddressResolver, AssetCatalogue, BankRail, CustodialRail,
    EligibilityProvider, FeeOracle, QuoteService, TxBroadcaster,
};
use crate::engines::{
    FiatDepositEngine, FiatWithdrawEngine, InterestDepositEngine, InterestWithdrawEngine,
    OnChainSendEngine, OnChainSignEngine, SwapEngine, TradingSendEngine,
};
use crate::error::ProcessorError;
use std::collections::HashMap;
use std::sync::Arc;

/// Selects an engine: the source capability tag, the target shape, and
/// the requested action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineKey {
    pub source: AccountKind,
    pub target: TargetKind,
    pub action: TxAction,
}

type EngineBuilder = Arc<dyn Fn(AccountArc, TxTarget) -> EngineBox + Send + Sync>;

/// Maps capability-tag tuples to engine constructors.
///
/// Selection is a pure function of `(source kind, target kind, action)`;
/// a combination with no registered builder is a construction-time
/// error, never a runtime validation failure. Source tags are tried in
/// the order the account advertises them.
#[derive(Default)]
pub struct EngineRegistry {
    builders: HashMap<EngineKey, EngineBuilder>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, key: EngineKey, builder: F)
    where
        F: Fn(AccountArc, TxTarget) -> EngineBox + Send + Sync + 'static,
    {
        self.builders.insert(key, Arc::new(builder));
    }

    pub fn supports(&self, source: &AccountArc, target: &TxTarget, action: TxAction) -> bool {
        let target_kind = target.kind();
        source.kinds().iter().any(|&kind| {
            self.builders.contains_key(&EngineKey {
                source: kind,
                target: target_kind,
                action,
            })
        })
    }

    pub fn create(
        &self,
        source: AccountArc,
        target: TxTarget,
        action: TxAction,
    ) -> Result<EngineBox, ProcessorError> {
        let target_kind = target.kind();
        for kind in source.kinds() {
            let key = EngineKey {
                source: kind,
                target: target_kind,
                action,
            };
            if let Some(builder) = self.builders.get(&key) {
                return Ok(builder(source, target));
            }
        }
        Err(ProcessorError::UnsupportedTransfer {
            account_kind: source
                .kinds()
                .first()
                .copied()
                .unwrap_or(AccountKind::NonCustodial),
            target: target_kind,
            action,
        })
    }

    /// Builds a processor bound to the matching engine for one live
    /// transaction.
    pub fn processor(
        &self,
        source: AccountArc,
        target: TxTarget,
        action: TxAction,
    ) -> Result<TransactionProcessor, ProcessorError> {
        Ok(TransactionProcessor::new(self.create(source, target, action)?))
    }
}

/// The collaborator bundle the standard engine set is wired with.
#[derive(Clone)]
pub struct EnginePorts {
    pub catalogue: Arc<dyn AssetCatalogue>,
    pub resolver: Arc<dyn AddressResolver>,
    pub fees: Arc<dyn FeeOracle>,
    pub quotes: Arc<dyn QuoteService>,
    pub custodial: Arc<dyn CustodialRail>,
    pub bank: Arc<dyn BankRail>,
    pub eligibility: Arc<dyn EligibilityProvider>,
    pub broadcaster: Arc<dyn TxBroadcaster>,
}

/// The standard engine mapping. Token sends that pay gas from a separate
/// native-asset account are wired by the caller via
/// [`OnChainSendEngine::with_gas_funds`] instead.
pub fn default_registry(ports: EnginePorts) -> EngineRegistry {
    let mut registry = EngineRegistry::new();

    for target in [
        TargetKind::Address,
        TargetKind::Domain,
        TargetKind::Invoice,
        TargetKind::Account(AccountKind::Trading),
    ] {
        let ports = ports.clone();
        registry.register(
            EngineKey {
                source: AccountKind::NonCustodial,
                target,
                action: TxAction::Send,
            },
            move |source, target| {
                Box::new(OnChainSendEngine::new(
                    source,
                    target,
                    ports.catalogue.clone(),
                    ports.resolver.clone(),
                    ports.fees.clone(),
                    ports.eligibility.clone(),
                    ports.broadcaster.clone(),
                ))
            },
        );
    }

    {
        let ports = ports.clone();
        registry.register(
            EngineKey {
                source: AccountKind::Trading,
                target: TargetKind::Address,
                action: TxAction::Send,
            },
            move |source, target| {
                Box::new(TradingSendEngine::new(
                    source,
                    target,
                    ports.resolver.clone(),
                    ports.eligibility.clone(),
                    ports.custodial.clone(),
                ))
            },
        );
    }

    {
        let ports = ports.clone();
        registry.register(
            EngineKey {
                source: AccountKind::Trading,
                target: TargetKind::Account(AccountKind::Trading),
                action: TxAction::Swap,
            },
            move |source, target| {
                Box::new(SwapEngine::swap(
                    source,
                    target,
                    ports.catalogue.clone(),
                    ports.quotes.clone(),
                    ports.eligibility.clone(),
                ))
            },
        );
    }

    {
        let ports = ports.clone();
        registry.register(
            EngineKey {
                source: AccountKind::Trading,
                target: TargetKind::Account(AccountKind::Fiat),
                action: TxAction::Sell,
            },
            move |source, target| {
                Box::new(SwapEngine::sell(
                    source,
                    target,
                    ports.catalogue.clone(),
                    ports.quotes.clone(),
                    ports.eligibility.clone(),
                ))
            },
        );
    }

    for source in [AccountKind::NonCustodial, AccountKind::Trading] {
        let ports = ports.clone();
        registry.register(
            EngineKey {
                source,
                target: TargetKind::Account(AccountKind::Interest),
                action: TxAction::Deposit,
            },
            move |source, target| {
                Box::new(InterestDepositEngine::new(
                    source,
                    target,
                    ports.eligibility.clone(),
                    ports.custodial.clone(),
                    ports.fees.clone(),
                    ports.broadcaster.clone(),
                ))
            },
        );
    }

    for target in [
        TargetKind::Account(AccountKind::Trading),
        TargetKind::Account(AccountKind::NonCustodial),
    ] {
        let ports = ports.clone();
        registry.register(
            EngineKey {
                source: AccountKind::Interest,
                target,
                action: TxAction::Withdraw,
            },
            move |source, target| {
                Box::new(InterestWithdrawEngine::new(
                    source,
                    target,
                    ports.eligibility.clone(),
                    ports.custodial.clone(),
                ))
            },
        );
    }

    {
        let ports = ports.clone();
        registry.register(
            EngineKey {
                source: AccountKind::Fiat,
                target: TargetKind::Account(AccountKind::Fiat),
                action: TxAction::Deposit,
            },
            move |source, target| {
                Box::new(FiatDepositEngine::new(
                    source,
                    target,
                    ports.bank.clone(),
                    ports.eligibility.clone(),
                ))
            },
        );
    }

    {
        let ports = ports.clone();
        registry.register(
            EngineKey {
                source: AccountKind::Fiat,
                target: TargetKind::Bank,
                action: TxAction::Withdraw,
            },
            move |source, target| {
                Box::new(FiatWithdrawEngine::new(
                    source,
                    target,
                    ports.bank.clone(),
                    ports.eligibility.clone(),
                ))
            },
        );
    }

    {
        let ports = ports.clone();
        registry.register(
            EngineKey {
                source: AccountKind::NonCustodial,
                target: TargetKind::Payload,
                action: TxAction::Sign,
            },
            move |source, target| {
                Box::new(OnChainSignEngine::new(
                    source,
                    target,
                    ports.fees.clone(),
                    ports.broadcaster.clone(),
                ))
            },
        );
    }

    registry
}
