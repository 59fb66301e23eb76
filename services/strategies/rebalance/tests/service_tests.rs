//! Submission, monitoring and the service facade

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::*;
use ledger_adapter::mock::FailWhen;
use ledger_adapter::{ErrorKind, FailoverRouter, RouterError, TxReceipt};
use pool_state::PoolStore;
use rebalance_strategy::{ErrorCategory, RebalanceService, ServiceError, SubmitRequest};
use rebalancer_types::{RebalanceStatus, Timeframe, H256, U256};

const GWEI: u64 = 1_000_000_000;

#[tokio::test(start_paused = true)]
async fn test_confirmed_rebalance_updates_pool() {
    let ledger = ledger();
    ledger.set_auto_receipt(Some(1));
    ledger.set_post_rebalance_reserves(addr(PAIR), U256::from(100u64), U256::from(100u64));
    let service = service(&ledger);
    service.discover_pairs(addr(FACTORY)).await.unwrap();

    let tx_hash = service
        .submit_rebalance(SubmitRequest::new(addr(PAIR), 1.0))
        .await
        .unwrap();

    let pending = service.get_transaction_status(tx_hash);
    assert!(pending.is_ok());

    let event = wait_resolved(&service, tx_hash).await;
    assert_eq!(event.status, RebalanceStatus::Confirmed);
    assert_eq!(event.to_ratio, Some(1.0));
    assert!((event.from_ratio - 1.2).abs() < 1e-12);
    assert_eq!(event.swap_amount_a, U256::from(12u64));
    assert_eq!(event.gas_used, Some(U256::from(150_000u64)));
    assert!(event.block_number.is_some());
    assert!(event.resolved_at.is_some());

    let pool = service.get_pool(addr(PAIR)).unwrap();
    assert_eq!(pool.reserve_a, U256::from(100u64));
    assert_eq!(pool.rebalance_count, 1);
    assert!(pool.last_rebalance.is_some());
    assert!(!pool.needs_rebalancing);

    let metrics = service.get_pool_metrics(addr(PAIR), Timeframe::All).unwrap();
    assert_eq!(metrics.rebalance_history.len(), 1);
    assert_eq!(metrics.historical.len(), 1);
    assert_eq!(metrics.historical[0].volume, U256::from(12u64));
    assert_eq!(metrics.performance.total_rebalances, 1);

    let sent = ledger.sent_transactions();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, addr(REBALANCER));
    assert_eq!(sent[0].gas_price, Some(U256::from(30 * GWEI)));
    assert_eq!(service.dashboard_stats().imbalanced_pools, 0);
}

#[tokio::test(start_paused = true)]
async fn test_reverted_rebalance_leaves_reserves() {
    let ledger = ledger();
    ledger.set_auto_receipt(Some(0));
    let service = service(&ledger);
    service.discover_pairs(addr(FACTORY)).await.unwrap();

    let tx_hash = service
        .submit_rebalance(SubmitRequest::new(addr(PAIR), 1.0))
        .await
        .unwrap();
    let event = wait_resolved(&service, tx_hash).await;

    assert_eq!(event.status, RebalanceStatus::Failed);
    assert!(event.failure_reason.unwrap().contains("reverted"));
    let pool = service.get_pool(addr(PAIR)).unwrap();
    assert_eq!(pool.reserve_a, U256::from(120u64));
    assert_eq!(pool.rebalance_count, 0);
    assert_eq!(pool.last_rebalance, None);

    let metrics = service.get_pool_metrics(addr(PAIR), Timeframe::OneDay).unwrap();
    assert_eq!(metrics.rebalance_history.len(), 1);
    assert_eq!(metrics.performance.total_rebalances, 0);
}

#[tokio::test(start_paused = true)]
async fn test_receipt_lookup_failure_marks_failed() {
    let ledger = ledger();
    ledger.fail(
        FailWhen::Method("eth_getTransactionReceipt"),
        ErrorKind::Connection,
        None,
    );
    let service = service(&ledger);
    service.discover_pairs(addr(FACTORY)).await.unwrap();

    let tx_hash = service
        .submit_rebalance(SubmitRequest::new(addr(PAIR), 1.0))
        .await
        .unwrap();
    let event = wait_resolved(&service, tx_hash).await;

    assert_eq!(event.status, RebalanceStatus::Failed);
    assert!(event.failure_reason.unwrap().contains("receipt lookup failed"));
}

#[tokio::test(start_paused = true)]
async fn test_unmined_transaction_times_out() {
    let ledger = ledger();
    let service = service(&ledger);
    service.discover_pairs(addr(FACTORY)).await.unwrap();

    let tx_hash = service
        .submit_rebalance(SubmitRequest::new(addr(PAIR), 1.0))
        .await
        .unwrap();
    let event = wait_resolved(&service, tx_hash).await;

    assert_eq!(event.status, RebalanceStatus::Failed);
    assert!(event.failure_reason.unwrap().contains("not mined"));
    assert!(ledger.call_count("eth_getTransactionReceipt") > 1);
}

#[tokio::test(start_paused = true)]
async fn test_late_receipt_is_picked_up() {
    let ledger = ledger();
    let service = service(&ledger);
    service.discover_pairs(addr(FACTORY)).await.unwrap();

    let tx_hash = service
        .submit_rebalance(SubmitRequest::new(addr(PAIR), 1.0))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(
        service.get_transaction_status(tx_hash).unwrap().status,
        RebalanceStatus::Pending
    );

    ledger.set_receipt(TxReceipt {
        tx_hash,
        status: Some(1),
        gas_used: Some(U256::from(90_000u64)),
        effective_gas_price: Some(U256::from(31 * GWEI)),
        block_number: Some(42),
    });
    let event = wait_resolved(&service, tx_hash).await;
    assert_eq!(event.status, RebalanceStatus::Confirmed);
    assert_eq!(event.block_number, Some(42));
    assert_eq!(event.gas_price, Some(U256::from(31 * GWEI)));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_marks_stragglers_failed() {
    let ledger = ledger();
    let mut config = config();
    config.monitor.confirmation_timeout_ms = 300_000;
    let service = service_with(&ledger, config);
    service.discover_pairs(addr(FACTORY)).await.unwrap();

    let tx_hash = service
        .submit_rebalance(SubmitRequest::new(addr(PAIR), 1.0))
        .await
        .unwrap();
    assert_eq!(service.monitors_in_flight(), 1);

    service.shutdown_within(Duration::from_millis(500)).await;

    let event = service.get_transaction_status(tx_hash).unwrap();
    assert_eq!(event.status, RebalanceStatus::Failed);
    assert_eq!(event.failure_reason.as_deref(), Some("monitor cancelled"));
    assert_eq!(service.monitors_in_flight(), 0);
}

#[tokio::test]
async fn test_cooldown_blocks_submission_unless_forced() {
    let ledger = ledger();
    ledger.set_auto_receipt(Some(1));
    ledger.set_last_rebalance(addr(PAIR), Utc::now().timestamp() as u64);
    let service = service(&ledger);
    service.discover_pairs(addr(FACTORY)).await.unwrap();

    let err = service
        .submit_rebalance(SubmitRequest::new(addr(PAIR), 1.0))
        .await
        .unwrap_err();
    match &err {
        ServiceError::CooldownActive { ready_at } => assert!(*ready_at > Utc::now()),
        other => panic!("expected cooldown, got {other:?}"),
    }
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert!(ledger.sent_transactions().is_empty());

    let forced = SubmitRequest {
        force: true,
        ..SubmitRequest::new(addr(PAIR), 1.0)
    };
    assert!(service.submit_rebalance(forced).await.is_ok());
    assert_eq!(ledger.sent_transactions().len(), 1);
}

#[tokio::test]
async fn test_gas_price_limit_rejects_submission() {
    let ledger = ledger();
    let service = service(&ledger);
    service.discover_pairs(addr(FACTORY)).await.unwrap();

    let request = SubmitRequest {
        max_gas_price: Some(U256::from(10 * GWEI)),
        ..SubmitRequest::new(addr(PAIR), 1.0)
    };
    let err = service.submit_rebalance(request).await.unwrap_err();
    assert!(matches!(err, ServiceError::GasPriceAboveLimit { .. }));
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert!(ledger.sent_transactions().is_empty());
}

#[tokio::test]
async fn test_submission_preconditions() {
    let ledger = ledger();
    let service = service(&ledger);

    let err = service
        .submit_rebalance(SubmitRequest::new(addr(PAIR), 1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::PoolNotFound(_)));

    let mut config = config();
    config.ledger.rebalancer_contract = None;
    let unconfigured = service_with(&ledger, config);
    unconfigured.discover_pairs(addr(FACTORY)).await.unwrap();
    let err = unconfigured
        .submit_rebalance(SubmitRequest::new(addr(PAIR), 1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::MissingConfig(_)));
    assert!(ledger.sent_transactions().is_empty());
}

#[tokio::test]
async fn test_rejected_send_is_fatal() {
    let ledger = ledger();
    ledger.fail(FailWhen::Method("eth_sendTransaction"), ErrorKind::Revert, None);
    let service = service(&ledger);
    service.discover_pairs(addr(FACTORY)).await.unwrap();

    let err = service
        .submit_rebalance(SubmitRequest::new(addr(PAIR), 1.0))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Fatal);
    assert!(service.store().pending_events().is_empty());
}

#[tokio::test]
async fn test_lookups() {
    let ledger = ledger();
    let service = service(&ledger);

    assert!(matches!(
        service.get_transaction_status(H256::from_low_u64_be(1)),
        Err(ServiceError::TransactionNotFound(_))
    ));
    assert!(matches!(
        service.get_pool_metrics(addr(PAIR), Timeframe::All),
        Err(ServiceError::Store(_))
    ));
    assert!(service.list_pools().is_empty());

    service.discover_pairs(addr(FACTORY)).await.unwrap();
    let pools = service.list_pools();
    assert_eq!(pools.len(), 1);
    assert_eq!(pools[0].token_a.symbol, "WETH");
    assert_eq!(service.dashboard_stats().total_pools, 1);
    assert_eq!(service.dashboard_stats().imbalanced_pools, 1);
}

#[tokio::test(start_paused = true)]
async fn test_estimate_deadline() {
    let ledger = ledger();
    let mut config = config();
    config.service.operation_deadline_ms = 1_500;
    let service = service_with(&ledger, config);
    service.discover_pairs(addr(FACTORY)).await.unwrap();

    ledger.set_latency(Duration::from_secs(1));
    let err = service
        .estimate_rebalance(addr(PAIR), 1.0, 0.5)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::DeadlineExceeded { .. }));
    assert!(err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_stalled_send_is_not_rebroadcast() {
    let ledger = ledger();
    let backup = ledger.replica("mock://backup");
    let mut config = config();
    config.ledger.max_retries = 1;
    let router = FailoverRouter::new(
        vec![ledger.endpoint(), backup.endpoint()],
        config.ledger.call_timeout(),
        config.ledger.max_retries,
    )
    .unwrap();
    let service = RebalanceService::new(config, Arc::new(router), Arc::new(PoolStore::new()));
    service.discover_pairs(addr(FACTORY)).await.unwrap();

    // broadcast goes out, the reply never arrives within the call timeout
    ledger.set_send_reply_delay(Duration::from_secs(60));
    let err = service
        .submit_rebalance(SubmitRequest::new(addr(PAIR), 1.0))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Ledger(RouterError::Unconfirmed { .. })));
    assert_eq!(ledger.sent_transactions().len(), 1);
    assert_eq!(backup.call_count("eth_sendTransaction"), 0);
    assert!(service.store().pending_events().is_empty());
}

#[tokio::test]
async fn test_out_of_range_slippage_rejected_before_any_call() {
    let ledger = ledger();
    let service = service(&ledger);
    service.discover_pairs(addr(FACTORY)).await.unwrap();
    let calls = ledger.total_calls();

    let request = SubmitRequest {
        slippage: Some(150.0),
        ..SubmitRequest::new(addr(PAIR), 1.0)
    };
    let err = service.submit_rebalance(request).await.unwrap_err();

    assert!(matches!(err, ServiceError::InvalidSlippage(_)));
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert_eq!(ledger.total_calls(), calls);
    assert!(ledger.sent_transactions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_submit_checks_respect_deadline() {
    let ledger = ledger();
    let mut config = config();
    config.service.operation_deadline_ms = 1_500;
    let service = service_with(&ledger, config);
    service.discover_pairs(addr(FACTORY)).await.unwrap();

    // cooldown reads, then gas price: two sequential 1s round trips
    ledger.set_latency(Duration::from_secs(1));
    let err = service
        .submit_rebalance(SubmitRequest::new(addr(PAIR), 1.0))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ServiceError::DeadlineExceeded {
            operation: "submit_rebalance",
            ..
        }
    ));
    assert!(ledger.sent_transactions().is_empty());
    assert!(service.store().pending_events().is_empty());
}

#[tokio::test]
async fn test_empty_pool_becomes_active_after_refresh() {
    let ledger = ledger();
    ledger.set_reserves(addr(PAIR), U256::zero(), U256::zero());
    let service = service(&ledger);
    service.discover_pairs(addr(FACTORY)).await.unwrap();
    assert!(!service.get_pool(addr(PAIR)).unwrap().is_active);
    assert_eq!(service.dashboard_stats().active_pools, 0);

    ledger.set_reserves(addr(PAIR), U256::from(120u64), U256::from(100u64));
    service.estimate_rebalance(addr(PAIR), 1.0, 0.5).await.unwrap();

    let pool = service.get_pool(addr(PAIR)).unwrap();
    assert_eq!(pool.reserve_a, U256::from(120u64));
    assert!(pool.is_active);
    assert_eq!(service.dashboard_stats().active_pools, 1);
}

#[tokio::test]
async fn test_endpoint_on_wrong_chain_rejected() {
    let ledger = ledger();
    let service = service(&ledger);
    service.verify_chain().await.unwrap();

    ledger.set_chain_id(1);
    let err = service.verify_chain().await.unwrap_err();
    assert!(matches!(err, ServiceError::Ledger(RouterError::InvalidEndpoint { .. })));
    assert_eq!(err.category(), ErrorCategory::Validation);
}
