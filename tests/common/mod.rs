#![allow(dead_code)]

//! Mock collaborators shared by the integration tests.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use coinflow::domain::account::{AccountBalance, AccountKind, ReceiveAddress, TxAction};
use coinflow::domain::money::{Currency, ExchangeRate, Money};
use coinflow::domain::pending::{FeeLevel, MaxReason, TxLimits};
use coinflow::domain::ports::{
    Account, AccountArc, AddressResolver, ApprovalPayload, AssetCatalogue, AssetInfo, BalanceCache,
    BankRail, BankTransferTicket, CacheTag, CustodialRail, EligibilityProvider, Feature,
    FeatureAccess, FeeOracle, OpenOrders, Quote, QuoteService, ResolvedAddress, TxBroadcaster,
    TxSpec, WithdrawalTerms,
};
use coinflow::error::{Result, TransferError};
use coinflow::{EnginePorts, EngineRegistry, default_registry};
use futures::stream::BoxStream;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Best-effort tracing setup honouring `RUST_LOG`; safe to call from
/// every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn btc(value: Decimal) -> Money {
    Money::new(Currency::crypto("BTC"), value)
}

pub fn eth(value: Decimal) -> Money {
    Money::new(Currency::crypto("ETH"), value)
}

pub fn eur(value: Decimal) -> Money {
    Money::new(Currency::fiat("EUR"), value)
}

pub struct MockAccount {
    id: String,
    label: String,
    currency: Currency,
    kinds: Vec<AccountKind>,
    balance: Mutex<AccountBalance>,
    receive: ReceiveAddress,
    pending: AtomicBool,
}

impl MockAccount {
    pub fn new(
        id: &str,
        currency: Currency,
        kinds: Vec<AccountKind>,
        total: Money,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            label: format!("{id} account"),
            currency,
            kinds,
            balance: Mutex::new(AccountBalance::settled(total)),
            receive: ReceiveAddress {
                address: format!("bc1q{id}"),
                memo: None,
            },
            pending: AtomicBool::new(false),
        })
    }

    pub fn with_receive(
        id: &str,
        currency: Currency,
        kinds: Vec<AccountKind>,
        total: Money,
        receive: ReceiveAddress,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            label: format!("{id} account"),
            currency,
            kinds,
            balance: Mutex::new(AccountBalance::settled(total)),
            receive,
            pending: AtomicBool::new(false),
        })
    }

    pub fn set_balance(&self, balance: AccountBalance) {
        *self.balance.lock().unwrap() = balance;
    }

    pub fn set_pending(&self, pending: bool) {
        self.pending.store(pending, Ordering::SeqCst);
    }
}

#[async_trait]
impl Account for MockAccount {
    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn currency(&self) -> Currency {
        self.currency.clone()
    }

    fn kinds(&self) -> Vec<AccountKind> {
        self.kinds.clone()
    }

    fn balance(&self) -> BoxStream<'static, AccountBalance> {
        let balance = self.balance.lock().unwrap().clone();
        Box::pin(futures::stream::once(async move { balance }))
    }

    async fn receive_address(&self) -> Result<ReceiveAddress> {
        Ok(self.receive.clone())
    }

    async fn is_funded(&self) -> Result<bool> {
        Ok(!self.balance.lock().unwrap().total.is_zero())
    }

    async fn pending_activity(&self) -> Result<bool> {
        Ok(self.pending.load(Ordering::SeqCst))
    }
}

#[derive(Default)]
pub struct StaticCatalogue {
    assets: Vec<AssetInfo>,
    rates: HashMap<(String, String), Decimal>,
}

impl StaticCatalogue {
    pub fn with_asset(mut self, asset: AssetInfo) -> Self {
        self.assets.push(asset);
        self
    }

    pub fn with_rate(mut self, from: &Currency, to: &Currency, rate: Decimal) -> Self {
        self.rates
            .insert((from.code.clone(), to.code.clone()), rate);
        self
    }
}

#[async_trait]
impl AssetCatalogue for StaticCatalogue {
    fn asset(&self, currency: &Currency) -> Option<AssetInfo> {
        self.assets.iter().find(|a| &a.currency == currency).cloned()
    }

    async fn exchange_rate(&self, from: &Currency, to: &Currency) -> Result<ExchangeRate> {
        self.rates
            .get(&(from.code.clone(), to.code.clone()))
            .map(|rate| ExchangeRate::new(from.clone(), to.clone(), *rate))
            .ok_or_else(|| TransferError::Network("no rate".into()))
    }

    async fn historic_rate(
        &self,
        from: &Currency,
        to: &Currency,
        _at: chrono::DateTime<Utc>,
    ) -> Result<ExchangeRate> {
        self.exchange_rate(from, to).await
    }
}

pub fn simple_asset(currency: Currency) -> AssetInfo {
    AssetInfo {
        fee_currency: currency.clone(),
        currency,
        precision: 8,
        min_confirmations: 3,
        supports_memo: false,
    }
}

/// Accepts `bc1...`/`0x...` addresses of plausible length; anything
/// containing "contract" resolves as a contract. Domains ending in
/// `.crypto` resolve, `vault.*` domains to a contract address.
pub struct TestResolver;

#[async_trait]
impl AddressResolver for TestResolver {
    async fn parse(&self, _currency: &Currency, raw: &str) -> Result<ResolvedAddress> {
        if raw.len() >= 6 && (raw.starts_with("bc1") || raw.starts_with("0x")) {
            Ok(ResolvedAddress {
                address: raw.to_string(),
                is_contract: raw.contains("contract"),
            })
        } else {
            Err(TransferError::InvalidAddress(raw.to_string()))
        }
    }

    async fn resolve_domain(&self, _currency: &Currency, name: &str) -> Result<ResolvedAddress> {
        if let Some(stem) = name.strip_suffix(".crypto") {
            Ok(ResolvedAddress {
                address: format!("0xresolved{stem}"),
                is_contract: stem.starts_with("vault"),
            })
        } else {
            Err(TransferError::InvalidAddress(name.to_string()))
        }
    }
}

pub struct FlatFeeOracle {
    pub regular: Decimal,
    pub priority: Decimal,
}

impl FlatFeeOracle {
    pub fn new(regular: Decimal, priority: Decimal) -> Self {
        Self { regular, priority }
    }
}

#[async_trait]
impl FeeOracle for FlatFeeOracle {
    async fn estimate(
        &self,
        fee_currency: &Currency,
        level: FeeLevel,
        _amount: &Money,
    ) -> Result<Money> {
        let value = match level {
            FeeLevel::None => Decimal::ZERO,
            FeeLevel::Regular => self.regular,
            FeeLevel::Priority => self.priority,
            FeeLevel::Custom => Decimal::ZERO,
        };
        Ok(Money::new(fee_currency.clone(), value))
    }
}

pub struct MockQuoteService {
    pub rate: Decimal,
    pub fee_value: Decimal,
    pub ttl_secs: i64,
    pub open: AtomicU32,
    pub max: u32,
    pub executed: AtomicU32,
    pub released: Mutex<Vec<String>>,
    counter: AtomicU32,
}

impl MockQuoteService {
    pub fn new(rate: Decimal, fee_value: Decimal) -> Arc<Self> {
        Arc::new(Self {
            rate,
            fee_value,
            ttl_secs: 60,
            open: AtomicU32::new(0),
            max: 5,
            executed: AtomicU32::new(0),
            released: Mutex::new(Vec::new()),
            counter: AtomicU32::new(0),
        })
    }

    pub fn expiring(rate: Decimal, fee_value: Decimal, ttl_secs: i64) -> Arc<Self> {
        Arc::new(Self {
            rate,
            fee_value,
            ttl_secs,
            open: AtomicU32::new(0),
            max: 5,
            executed: AtomicU32::new(0),
            released: Mutex::new(Vec::new()),
            counter: AtomicU32::new(0),
        })
    }

    pub fn set_open_orders(&self, open: u32) {
        self.open.store(open, Ordering::SeqCst);
    }
}

#[async_trait]
impl QuoteService for MockQuoteService {
    async fn quote(&self, from: &Currency, _to: &Currency, _amount: &Money) -> Result<Quote> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Quote {
            id: format!("q-{n}"),
            rate: self.rate,
            fee: Money::new(from.clone(), self.fee_value),
            expires_at: Utc::now() + Duration::seconds(self.ttl_secs),
        })
    }

    async fn open_orders(&self) -> Result<OpenOrders> {
        Ok(OpenOrders {
            open: self.open.load(Ordering::SeqCst),
            max: self.max,
        })
    }

    async fn execute_order(&self, quote_id: &str, _amount: &Money) -> Result<String> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        Ok(format!("ord-{quote_id}"))
    }

    async fn release_quote(&self, quote_id: &str) -> Result<()> {
        self.released.lock().unwrap().push(quote_id.to_string());
        Ok(())
    }
}

pub struct MockCustodialRail {
    pub fee_value: Decimal,
    pub lock_days: u32,
    pub transfers: AtomicU32,
    pub withdrawals: Mutex<Vec<String>>,
}

impl MockCustodialRail {
    pub fn new(fee_value: Decimal, lock_days: u32) -> Arc<Self> {
        Arc::new(Self {
            fee_value,
            lock_days,
            transfers: AtomicU32::new(0),
            withdrawals: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl CustodialRail for MockCustodialRail {
    async fn withdrawal_fee(&self, currency: &Currency) -> Result<Money> {
        Ok(Money::new(currency.clone(), self.fee_value))
    }

    async fn withdraw(
        &self,
        _source_id: &str,
        destination: &str,
        _amount: &Money,
        _memo: Option<&str>,
    ) -> Result<String> {
        self.withdrawals.lock().unwrap().push(destination.to_string());
        Ok(format!("w-{}", self.withdrawals.lock().unwrap().len()))
    }

    async fn internal_transfer(
        &self,
        _source_id: &str,
        _target_id: &str,
        _amount: &Money,
    ) -> Result<String> {
        let n = self.transfers.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("t-{n}"))
    }

    async fn product_terms(&self, _currency: &Currency) -> Result<WithdrawalTerms> {
        Ok(WithdrawalTerms {
            lock_days: self.lock_days,
            settlement_days: 2,
        })
    }
}

pub struct MockBankRail {
    pub method_limit: Decimal,
    pub lock_days: u32,
    pub approval: Option<ApprovalPayload>,
    pub created: Mutex<Vec<(String, Money)>>,
    counter: AtomicU32,
}

impl MockBankRail {
    pub fn new(method_limit: Decimal) -> Arc<Self> {
        Arc::new(Self {
            method_limit,
            lock_days: 3,
            approval: None,
            created: Mutex::new(Vec::new()),
            counter: AtomicU32::new(0),
        })
    }

    pub fn with_approval(method_limit: Decimal, approval: ApprovalPayload) -> Arc<Self> {
        Arc::new(Self {
            method_limit,
            lock_days: 3,
            approval: Some(approval),
            created: Mutex::new(Vec::new()),
            counter: AtomicU32::new(0),
        })
    }

    fn ticket(&self, prefix: &str) -> BankTransferTicket {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        BankTransferTicket {
            id: format!("{prefix}-{n}"),
            requires_approval: self.approval.clone(),
        }
    }
}

#[async_trait]
impl BankRail for MockBankRail {
    async fn withdrawal_terms(&self, _currency: &Currency) -> Result<WithdrawalTerms> {
        Ok(WithdrawalTerms {
            lock_days: self.lock_days,
            settlement_days: 1,
        })
    }

    async fn payment_method_limit(&self, _bank_id: &str, currency: &Currency) -> Result<Money> {
        Ok(Money::new(currency.clone(), self.method_limit))
    }

    async fn create_withdrawal(&self, bank_id: &str, amount: &Money) -> Result<BankTransferTicket> {
        self.created
            .lock()
            .unwrap()
            .push((bank_id.to_string(), amount.clone()));
        Ok(self.ticket("bw"))
    }

    async fn create_deposit(&self, bank_id: &str, amount: &Money) -> Result<BankTransferTicket> {
        self.created
            .lock()
            .unwrap()
            .push((bank_id.to_string(), amount.clone()));
        Ok(self.ticket("bd"))
    }
}

pub struct StaticEligibility {
    access: FeatureAccess,
    limits: TxLimits,
}

impl StaticEligibility {
    pub fn granted(limits: TxLimits) -> Arc<Self> {
        Arc::new(Self {
            access: FeatureAccess::Granted,
            limits,
        })
    }

    pub fn blocked(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            access: FeatureAccess::Blocked {
                reason: reason.to_string(),
            },
            limits: TxLimits::unbounded(),
        })
    }
}

#[async_trait]
impl EligibilityProvider for StaticEligibility {
    async fn access(&self, _feature: Feature) -> Result<FeatureAccess> {
        Ok(self.access.clone())
    }

    async fn limits(&self, _action: TxAction, _currency: &Currency) -> Result<TxLimits> {
        Ok(self.limits.clone())
    }
}

pub fn silver_limits(min: Money, max: Money) -> TxLimits {
    TxLimits {
        min: Some(min),
        max: Some(max),
        max_reason: MaxReason::SilverTier,
        upgrade_available: true,
    }
}

pub struct MockBroadcaster {
    pub specs: Mutex<Vec<TxSpec>>,
}

impl MockBroadcaster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            specs: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TxBroadcaster for MockBroadcaster {
    async fn broadcast(&self, spec: &TxSpec) -> Result<String> {
        let mut specs = self.specs.lock().unwrap();
        specs.push(spec.clone());
        Ok(format!("0xhash{}", specs.len()))
    }

    async fn sign(&self, _source_id: &str, payload: &[u8]) -> Result<String> {
        Ok(format!("sig-{}", payload.len()))
    }
}

#[derive(Default)]
pub struct RecordingCache {
    pub invalidated: Mutex<Vec<CacheTag>>,
}

impl BalanceCache for RecordingCache {
    fn invalidate(&self, tags: &[CacheTag]) {
        self.invalidated.lock().unwrap().extend_from_slice(tags);
    }
}

/// Pre-wired collaborator set with handles kept for assertions.
pub struct TestPorts {
    pub catalogue: Arc<StaticCatalogue>,
    pub resolver: Arc<TestResolver>,
    pub fees: Arc<FlatFeeOracle>,
    pub quotes: Arc<MockQuoteService>,
    pub custodial: Arc<MockCustodialRail>,
    pub bank: Arc<MockBankRail>,
    pub eligibility: Arc<StaticEligibility>,
    pub broadcaster: Arc<MockBroadcaster>,
}

impl TestPorts {
    pub fn standard() -> Self {
        let btc = Currency::crypto("BTC");
        let eur = Currency::fiat("EUR");
        let catalogue = StaticCatalogue::default()
            .with_asset(simple_asset(btc.clone()))
            .with_asset(simple_asset(Currency::crypto("ETH")))
            .with_rate(&eur, &btc, dec!(0.00002));
        Self {
            catalogue: Arc::new(catalogue),
            resolver: Arc::new(TestResolver),
            fees: Arc::new(FlatFeeOracle::new(dec!(0.0001), dec!(0.0005))),
            quotes: MockQuoteService::new(dec!(15.0), dec!(0.001)),
            custodial: MockCustodialRail::new(dec!(0.0002), 7),
            bank: MockBankRail::new(dec!(5000)),
            eligibility: StaticEligibility::granted(TxLimits::unbounded()),
            broadcaster: MockBroadcaster::new(),
        }
    }

    pub fn ports(&self) -> EnginePorts {
        EnginePorts {
            catalogue: self.catalogue.clone(),
            resolver: self.resolver.clone(),
            fees: self.fees.clone(),
            quotes: self.quotes.clone(),
            custodial: self.custodial.clone(),
            bank: self.bank.clone(),
            eligibility: self.eligibility.clone(),
            broadcaster: self.broadcaster.clone(),
        }
    }

    pub fn registry(&self) -> EngineRegistry {
        default_registry(self.ports())
    }
}

pub fn account(id: &str, kinds: Vec<AccountKind>, total: Money) -> AccountArc {
    let currency = total.currency.clone();
    MockAccount::new(id, currency, kinds, total)
}
