//! Capability contracts the engine depends on.
//!
//! Pure data and lookup interfaces: no retry or caching policy is defined
//! here; that belongs to the backing implementation. Engines treat
//! failures from these as transient and map them into the crate error
//! taxonomy.

use crate::domain::account::{AccountBalance, AccountKind, ReceiveAddress, TxAction};
use crate::domain::money::{Currency, ExchangeRate, Money};
use crate::domain::pending::{FeeLevel, TxLimits};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;

/// One source or target of value. Referenced, never owned, by engines.
#[async_trait]
pub trait Account: Send + Sync {
    fn id(&self) -> &str;
    fn label(&self) -> &str;
    fn currency(&self) -> Currency;
    fn kinds(&self) -> Vec<AccountKind>;
    /// Hot, unbounded balance stream with latest-value-replay semantics:
    /// a new subscriber immediately observes the current balance.
    fn balance(&self) -> BoxStream<'static, AccountBalance>;
    async fn receive_address(&self) -> Result<ReceiveAddress>;
    async fn is_funded(&self) -> Result<bool>;
    /// Whether an earlier transaction from this account is still settling.
    async fn pending_activity(&self) -> Result<bool>;
}

pub type AccountArc = Arc<dyn Account>;

/// Static per-asset facts resolved from the asset catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub currency: Currency,
    pub precision: u32,
    pub min_confirmations: u32,
    /// The asset network fees are paid in; differs from `currency` for
    /// tokens carried on another chain.
    pub fee_currency: Currency,
    pub supports_memo: bool,
}

#[async_trait]
pub trait AssetCatalogue: Send + Sync {
    fn asset(&self, currency: &Currency) -> Option<AssetInfo>;
    async fn exchange_rate(&self, from: &Currency, to: &Currency) -> Result<ExchangeRate>;
    async fn historic_rate(
        &self,
        from: &Currency,
        to: &Currency,
        at: DateTime<Utc>,
    ) -> Result<ExchangeRate>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAddress {
    pub address: String,
    pub is_contract: bool,
}

/// Raw-address parsing per asset, plus naming-service resolution.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn parse(&self, currency: &Currency, raw: &str) -> Result<ResolvedAddress>;
    async fn resolve_domain(&self, currency: &Currency, name: &str) -> Result<ResolvedAddress>;
}

/// Per-tier network fee estimation for on-chain transfers.
#[async_trait]
pub trait FeeOracle: Send + Sync {
    async fn estimate(&self, fee_currency: &Currency, level: FeeLevel, amount: &Money)
    -> Result<Money>;
}

/// A priced, time-limited custodial exchange quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: String,
    pub rate: Decimal,
    pub fee: Money,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOrders {
    pub open: u32,
    pub max: u32,
}

impl OpenOrders {
    pub fn at_limit(&self) -> bool {
        self.open >= self.max
    }
}

/// Custodial quote lifecycle: price, lock, execute, release.
#[async_trait]
pub trait QuoteService: Send + Sync {
    async fn quote(&self, from: &Currency, to: &Currency, amount: &Money) -> Result<Quote>;
    async fn open_orders(&self) -> Result<OpenOrders>;
    async fn execute_order(&self, quote_id: &str, amount: &Money) -> Result<String>;
    async fn release_quote(&self, quote_id: &str) -> Result<()>;
}

/// Custodial balance operations: withdrawals to chain addresses and
/// transfers between custodial products.
#[async_trait]
pub trait CustodialRail: Send + Sync {
    async fn withdrawal_fee(&self, currency: &Currency) -> Result<Money>;
    async fn withdraw(
        &self,
        source_id: &str,
        destination: &str,
        amount: &Money,
        memo: Option<&str>,
    ) -> Result<String>;
    async fn internal_transfer(
        &self,
        source_id: &str,
        target_id: &str,
        amount: &Money,
    ) -> Result<String>;
    /// Product terms for interest/staking positions funded through this
    /// rail (withdrawal lock, settlement horizon).
    async fn product_terms(&self, currency: &Currency) -> Result<WithdrawalTerms>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalTerms {
    pub lock_days: u32,
    pub settlement_days: u32,
}

/// Payload a consumer must complete out-of-band (e.g. bank-side payment
/// authorisation) before the transfer settles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalPayload {
    pub payment_id: String,
    pub authorisation_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BankTransferTicket {
    pub id: String,
    pub requires_approval: Option<ApprovalPayload>,
}

/// Fiat deposits and withdrawals over linked bank accounts.
#[async_trait]
pub trait BankRail: Send + Sync {
    async fn withdrawal_terms(&self, currency: &Currency) -> Result<WithdrawalTerms>;
    async fn payment_method_limit(&self, bank_id: &str, currency: &Currency) -> Result<Money>;
    async fn create_withdrawal(&self, bank_id: &str, amount: &Money) -> Result<BankTransferTicket>;
    async fn create_deposit(&self, bank_id: &str, amount: &Money) -> Result<BankTransferTicket>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    InterestDeposit,
    Swap,
    Sell,
    FiatDeposit,
    FiatWithdraw,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureAccess {
    Granted,
    Blocked { reason: String },
}

/// Feature-access and transfer-limit lookup, consumed before certain
/// engine/target combinations are allowed.
#[async_trait]
pub trait EligibilityProvider: Send + Sync {
    async fn access(&self, feature: Feature) -> Result<FeatureAccess>;
    async fn limits(&self, action: TxAction, currency: &Currency) -> Result<TxLimits>;
}

/// Fully specified on-chain transfer handed to the broadcasting backend.
#[derive(Debug, Clone, PartialEq)]
pub struct TxSpec {
    pub source_id: String,
    pub destination: String,
    pub amount: Money,
    pub fee: Money,
    pub memo: Option<String>,
}

/// Opaque signing/broadcasting backend. Key management and broadcast
/// internals live behind this boundary.
#[async_trait]
pub trait TxBroadcaster: Send + Sync {
    async fn broadcast(&self, spec: &TxSpec) -> Result<String>;
    async fn sign(&self, source_id: &str, payload: &[u8]) -> Result<String>;
}

/// Read-through caches the orchestrator flushes after a successful
/// execution, so subsequent reads reflect the transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheTag {
    Balance(String),
    OpenOrders,
    LinkedBanks,
}

pub trait BalanceCache: Send + Sync {
    fn invalidate(&self, tags: &[CacheTag]);
}
