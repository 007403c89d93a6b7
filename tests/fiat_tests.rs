mod common;

use common::*;
use coinflow::domain::account::{AccountBalance, AccountKind, BankAccountRef, TxAction, TxTarget};
use coinflow::domain::confirmation::{Confirmation, ConfirmationTag};
use coinflow::domain::money::{Currency, Money};
use coinflow::domain::pending::{EngineData, MaxReason};
use coinflow::domain::ports::ApprovalPayload;
use coinflow::{ProcessorError, TransactionProcessor, TransferError, TxResult, TxValidation};
use rust_decimal_macros::dec;

fn bank_target() -> TxTarget {
    TxTarget::Bank(BankAccountRef {
        id: "bank-1".to_string(),
        label: "Main Street Bank".to_string(),
        currency: Currency::fiat("EUR"),
    })
}

#[tokio::test]
async fn test_fiat_withdrawal_applies_payment_method_limit() {
    let mut ports = TestPorts::standard();
    ports.bank = MockBankRail::new(dec!(1000));
    let source = account("euros", vec![AccountKind::Fiat], eur(dec!(3000)));
    let engine = ports
        .registry()
        .create(source, bank_target(), TxAction::Withdraw)
        .unwrap();
    let processor = TransactionProcessor::new(engine);

    let tx = processor.initialise().await.unwrap();
    let limits = tx.limits.clone().unwrap();
    assert_eq!(limits.max, Some(eur(dec!(1000))));
    assert_eq!(limits.max_reason, MaxReason::PaymentMethod);
    assert!(matches!(
        tx.engine_data,
        Some(EngineData::FiatWithdraw { .. })
    ));

    processor.update_amount(eur(dec!(2000))).await.unwrap();
    let tx = processor.current().await.unwrap();
    assert_eq!(tx.validation, TxValidation::AbovePaymentMethodLimit);
    assert!(matches!(
        tx.confirmation(ConfirmationTag::ErrorNotice),
        Some(Confirmation::ErrorNotice { limit: Some(l), .. }) if *l == eur(dec!(1000))
    ));

    processor.update_amount(eur(dec!(500))).await.unwrap();
    let tx = processor.validate_all().await.unwrap();
    assert_eq!(tx.validation, TxValidation::CanExecute);
    assert!(matches!(
        tx.confirmation(ConfirmationTag::WithdrawalTerms),
        Some(Confirmation::WithdrawalTerms { lock_days: 3 })
    ));

    let result = processor.execute(None).await.unwrap();
    assert!(matches!(result, TxResult::Unhashed { order_id: Some(id) } if id == "bw-1"));
    let created = ports.bank.created.lock().unwrap();
    assert_eq!(created[0], ("bank-1".to_string(), eur(dec!(500))));
}

#[tokio::test]
async fn test_bank_approval_is_a_distinct_outcome() {
    let mut ports = TestPorts::standard();
    ports.bank = MockBankRail::with_approval(
        dec!(5000),
        ApprovalPayload {
            payment_id: "pay-77".to_string(),
            authorisation_url: "https://bank.example/approve/pay-77".to_string(),
        },
    );
    let source = account("euros", vec![AccountKind::Fiat], eur(dec!(3000)));
    let engine = ports
        .registry()
        .create(source, bank_target(), TxAction::Withdraw)
        .unwrap();
    let processor = TransactionProcessor::new(engine);

    processor.initialise().await.unwrap();
    processor.update_amount(eur(dec!(100))).await.unwrap();
    let result = processor.execute(None).await.unwrap();
    match result {
        TxResult::PendingApproval { payload } => {
            assert_eq!(payload.payment_id, "pay-77");
        }
        other => panic!("expected approval outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fiat_deposit_is_limit_driven() {
    let ports = TestPorts::standard();
    // A linked bank has no observable balance; deposits validate purely
    // against limits.
    let source = account("linked-bank", vec![AccountKind::Fiat], eur(dec!(0)));
    let target = TxTarget::Account(account("euros", vec![AccountKind::Fiat], eur(dec!(250))));
    let engine = ports
        .registry()
        .create(source, target, TxAction::Deposit)
        .unwrap();
    let processor = TransactionProcessor::new(engine);

    processor.initialise().await.unwrap();
    processor.update_amount(eur(dec!(800))).await.unwrap();
    assert_eq!(
        processor.current().await.unwrap().validation,
        TxValidation::CanExecute
    );

    processor.update_amount(eur(dec!(9000))).await.unwrap();
    assert_eq!(
        processor.current().await.unwrap().validation,
        TxValidation::AbovePaymentMethodLimit
    );

    processor.update_amount(eur(dec!(800))).await.unwrap();
    let result = processor.execute(None).await.unwrap();
    assert!(matches!(result, TxResult::Unhashed { order_id: Some(id) } if id == "bd-1"));
}

#[tokio::test]
async fn test_interest_deposit_from_trading_is_an_internal_transfer() {
    let ports = TestPorts::standard();
    let source = account("btc-trading", vec![AccountKind::Trading], btc(dec!(1.0)));
    let target = TxTarget::Account(account(
        "interest",
        vec![AccountKind::Interest],
        btc(dec!(0)),
    ));
    let engine = ports
        .registry()
        .create(source, target, TxAction::Deposit)
        .unwrap();
    let processor = TransactionProcessor::new(engine);

    let tx = processor.initialise().await.unwrap();
    assert!(matches!(
        tx.engine_data,
        Some(EngineData::Interest { lock_days: 7 })
    ));
    assert!(tx.fee_amount.is_zero());

    processor.update_amount(btc(dec!(0.4))).await.unwrap();
    let tx = processor.validate_all().await.unwrap();
    assert_eq!(tx.validation, TxValidation::CanExecute);
    assert!(matches!(
        tx.confirmation(ConfirmationTag::WithdrawalTerms),
        Some(Confirmation::WithdrawalTerms { lock_days: 7 })
    ));

    let result = processor.execute(None).await.unwrap();
    assert!(matches!(result, TxResult::Unhashed { order_id: Some(id) } if id == "t-1"));
    assert_eq!(
        ports
            .custodial
            .transfers
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[tokio::test]
async fn test_interest_deposit_from_chain_pays_network_fee() {
    let ports = TestPorts::standard();
    let source = account("wallet", vec![AccountKind::NonCustodial], btc(dec!(1.0)));
    let target = TxTarget::Account(account(
        "interest",
        vec![AccountKind::Interest],
        btc(dec!(0)),
    ));
    let engine = ports
        .registry()
        .create(source, target, TxAction::Deposit)
        .unwrap();
    let processor = TransactionProcessor::new(engine);

    let tx = processor.initialise().await.unwrap();
    assert_eq!(tx.fee_amount, btc(dec!(0.0001)));

    processor.update_amount(btc(dec!(0.5))).await.unwrap();
    let tx = processor.validate_all().await.unwrap();
    assert_eq!(tx.validation, TxValidation::CanExecute);
    assert!(tx.has_confirmation(ConfirmationTag::NetworkFee));

    let result = processor.execute(None).await.unwrap();
    assert!(matches!(result, TxResult::Hashed { .. }));
    let specs = ports.broadcaster.specs.lock().unwrap();
    assert_eq!(specs[0].destination, "bc1qinterest");
}

#[tokio::test]
async fn test_blocked_interest_deposit_fails_terminally() {
    let ports = TestPorts::standard();
    let source = account("btc-trading", vec![AccountKind::Trading], btc(dec!(1.0)));
    let target = TxTarget::Account(account(
        "interest",
        vec![AccountKind::Interest],
        btc(dec!(0)),
    ));
    let engine = coinflow::engines::InterestDepositEngine::new(
        source,
        target,
        StaticEligibility::blocked("region not supported"),
        ports.custodial.clone(),
        ports.fees.clone(),
        ports.broadcaster.clone(),
    );
    let processor = TransactionProcessor::new(Box::new(engine));

    assert_eq!(
        processor.initialise().await.unwrap_err(),
        ProcessorError::Engine(TransferError::Unavailable {
            reason: "region not supported".to_string()
        })
    );
}

#[tokio::test]
async fn test_interest_withdrawal_spends_only_unlocked_balance() {
    let ports = TestPorts::standard();
    let source = MockAccount::new(
        "interest",
        Currency::crypto("BTC"),
        vec![AccountKind::Interest],
        btc(dec!(1.0)),
    );
    source.set_balance(AccountBalance {
        total: btc(dec!(1.0)),
        available: btc(dec!(0.6)),
        pending: btc(dec!(0.4)),
    });
    let target = TxTarget::Account(account(
        "btc-trading",
        vec![AccountKind::Trading],
        btc(dec!(0)),
    ));
    let engine = ports
        .registry()
        .create(source, target, TxAction::Withdraw)
        .unwrap();
    let processor = TransactionProcessor::new(engine);

    processor.initialise().await.unwrap();
    processor.update_amount(btc(dec!(0.8))).await.unwrap();
    assert_eq!(
        processor.current().await.unwrap().validation,
        TxValidation::InsufficientFunds
    );

    processor.update_amount(btc(dec!(0.5))).await.unwrap();
    let result = processor.execute(None).await.unwrap();
    assert!(matches!(result, TxResult::Unhashed { .. }));
}

#[tokio::test]
async fn test_in_flight_interest_withdrawal_blocks_another() {
    let ports = TestPorts::standard();
    let source = MockAccount::new(
        "interest",
        Currency::crypto("BTC"),
        vec![AccountKind::Interest],
        btc(dec!(1.0)),
    );
    source.set_pending(true);
    let target = TxTarget::Account(account(
        "btc-trading",
        vec![AccountKind::Trading],
        btc(dec!(0)),
    ));
    let engine = ports
        .registry()
        .create(source, target, TxAction::Withdraw)
        .unwrap();
    let processor = TransactionProcessor::new(engine);

    processor.initialise().await.unwrap();
    processor.update_amount(btc(dec!(0.2))).await.unwrap();
    let tx = processor.validate_all().await.unwrap();
    assert_eq!(tx.validation, TxValidation::HasTxInFlight);
}

#[tokio::test]
async fn test_sign_engine_returns_signature() {
    let ports = TestPorts::standard();
    let source = account("wallet", vec![AccountKind::NonCustodial], btc(dec!(1.0)));
    let target = TxTarget::Payload {
        currency: Currency::crypto("BTC"),
        data: b"auth-challenge".to_vec(),
        amount: None,
    };
    let engine = ports
        .registry()
        .create(source, target, TxAction::Sign)
        .unwrap();
    let processor = TransactionProcessor::new(engine);

    let tx = processor.initialise().await.unwrap();
    assert!(tx.amount.is_zero());
    assert!(matches!(
        tx.engine_data,
        Some(EngineData::Sign { payload_bytes: 14 })
    ));

    let tx = processor.validate_all().await.unwrap();
    assert_eq!(tx.validation, TxValidation::CanExecute);

    let result = processor.execute(None).await.unwrap();
    assert!(matches!(result, TxResult::Signed { signature } if signature == "sig-14"));
}

#[tokio::test]
async fn test_value_carrying_payload_validates_funds() {
    let ports = TestPorts::standard();
    let source = account("wallet", vec![AccountKind::NonCustodial], btc(dec!(0.1)));
    let target = TxTarget::Payload {
        currency: Currency::crypto("BTC"),
        data: b"dapp-tx".to_vec(),
        amount: Some(btc(dec!(0.5))),
    };
    let engine = ports
        .registry()
        .create(source, target, TxAction::Sign)
        .unwrap();
    let processor = TransactionProcessor::new(engine);

    processor.initialise().await.unwrap();
    let tx = processor.validate_all().await.unwrap();
    assert_eq!(tx.validation, TxValidation::InsufficientFunds);
}

#[tokio::test]
async fn test_cross_currency_amount_is_rejected_up_front() {
    let ports = TestPorts::standard();
    let source = account("euros", vec![AccountKind::Fiat], eur(dec!(3000)));
    let engine = ports
        .registry()
        .create(source, bank_target(), TxAction::Withdraw)
        .unwrap();
    let processor = TransactionProcessor::new(engine);
    processor.initialise().await.unwrap();

    let err = processor
        .update_amount(Money::new(Currency::crypto("BTC"), dec!(1)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProcessorError::Engine(TransferError::CurrencyMismatch { .. })
    ));
}
