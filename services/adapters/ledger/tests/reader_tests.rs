//! LedgerReader against the in-memory ledger

use std::sync::Arc;
use std::time::Duration;

use ledger_adapter::mock::{FailWhen, MockLedger, MockPair, PastEnd};
use ledger_adapter::{ErrorKind, FailoverRouter, LedgerReader, RouterError};
use rebalancer_types::{Address, U256};

fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

fn setup() -> (MockLedger, LedgerReader) {
    let ledger = MockLedger::new("mock://primary");
    ledger.add_factory(addr(0xfa), PastEnd::ZeroAddress);
    ledger.add_pair(
        addr(0xfa),
        MockPair {
            address: addr(0x100),
            token0: addr(0x10),
            token1: addr(0x11),
            reserve0: U256::from(120u64),
            reserve1: U256::from(100u64),
            total_supply: U256::from(1_000u64),
        },
    );
    ledger.set_symbol(addr(0x10), "WETH");

    let router = FailoverRouter::new(vec![ledger.endpoint()], Duration::from_secs(1), 2).unwrap();
    (ledger, LedgerReader::new(Arc::new(router)))
}

#[tokio::test]
async fn test_reads_pair_state() {
    let (_ledger, reader) = setup();

    assert_eq!(reader.all_pairs(addr(0xfa), 0).await.unwrap(), addr(0x100));
    assert_eq!(reader.all_pairs(addr(0xfa), 1).await.unwrap(), Address::zero());
    assert_eq!(reader.token0(addr(0x100)).await.unwrap(), addr(0x10));
    assert_eq!(reader.token1(addr(0x100)).await.unwrap(), addr(0x11));
    assert_eq!(
        reader.reserves(addr(0x100)).await.unwrap(),
        (U256::from(120u64), U256::from(100u64))
    );
    assert_eq!(reader.total_supply(addr(0x100)).await.unwrap(), U256::from(1_000u64));
    assert_eq!(reader.symbol(addr(0x10)).await.unwrap(), "WETH");
}

#[tokio::test]
async fn test_missing_symbol_is_fatal_revert() {
    let (_ledger, reader) = setup();
    let err = reader.symbol(addr(0x11)).await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.last_error().map(|e| e.kind), Some(ErrorKind::Revert));
}

#[tokio::test]
async fn test_empty_return_is_decode_error() {
    let (_ledger, reader) = setup();
    // No code at this address: the call succeeds with empty output.
    let err = reader.reserve0(addr(0xdead)).await.unwrap_err();
    assert!(matches!(
        err,
        RouterError::Fatal { ref source, .. } if source.kind == ErrorKind::Decode
    ));
}

#[tokio::test]
async fn test_retryable_failure_fails_over_to_replica() {
    let (ledger, _) = setup();
    let backup = ledger.replica("mock://backup");
    ledger.fail(FailWhen::Always, ErrorKind::Connection, None);

    let router = FailoverRouter::new(
        vec![ledger.endpoint(), backup.endpoint()],
        Duration::from_secs(1),
        2,
    )
    .unwrap();
    let reader = LedgerReader::new(Arc::new(router));

    assert_eq!(reader.token0(addr(0x100)).await.unwrap(), addr(0x10));
    assert_eq!(backup.call_count("eth_call"), 1);
}

#[tokio::test]
async fn test_rebalancer_calls() {
    let (ledger, reader) = setup();
    ledger.set_rebalancer(addr(0xbb), 3_600);
    ledger.set_last_rebalance(addr(0x100), 1_700_000_000);
    ledger.set_auto_receipt(Some(1));

    assert_eq!(reader.cooldown(addr(0xbb)).await.unwrap(), U256::from(3_600u64));
    assert_eq!(
        reader.last_rebalance(addr(0xbb), addr(0x100)).await.unwrap(),
        U256::from(1_700_000_000u64)
    );
    assert_eq!(
        reader.estimate_rebalance_gas(addr(0xbb), addr(0x100), U256::from(10_000u64)).await.unwrap(),
        U256::from(150_000u64)
    );

    let hash = reader
        .submit_rebalance(addr(0xbb), addr(0x100), U256::from(10_000u64), None)
        .await
        .unwrap();
    let sent = ledger.sent_transactions();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].hash, hash);
    // rebalance(address,uint256) selector followed by two words
    assert_eq!(sent[0].data.len(), 4 + 64);

    let receipt = reader.receipt(hash).await.unwrap().unwrap();
    assert!(receipt.succeeded());
}
