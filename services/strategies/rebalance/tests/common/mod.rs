//! Shared setup for the rebalance-strategy integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use ledger_adapter::mock::{MockLedger, MockPair, PastEnd};
use ledger_adapter::{FailoverRouter, LedgerReader};
use pool_state::PoolStore;
use rebalance_strategy::RebalanceService;
use rebalancer_config::RebalancerConfig;
use rebalancer_types::{Address, H256, RebalanceEvent, U256};

pub const FACTORY: u64 = 0xfa;
pub const REBALANCER: u64 = 0xbb;
pub const PAIR: u64 = 0x100;

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub fn pair(address: u64, reserve0: u64, reserve1: u64) -> MockPair {
    MockPair {
        address: addr(address),
        token0: addr(address + 1),
        token1: addr(address + 2),
        reserve0: U256::from(reserve0),
        reserve1: U256::from(reserve1),
        total_supply: U256::from(1_000u64),
    }
}

/// A ledger with one factory listing the 120/100 pair at `PAIR`, and a
/// rebalancer contract with a one hour cooldown.
pub fn ledger() -> MockLedger {
    let ledger = MockLedger::new("mock://primary");
    ledger.add_factory(addr(FACTORY), PastEnd::ZeroAddress);
    ledger.add_pair(addr(FACTORY), pair(PAIR, 120, 100));
    ledger.set_symbol(addr(PAIR + 1), "WETH");
    ledger.set_symbol(addr(PAIR + 2), "USDC");
    ledger.set_rebalancer(addr(REBALANCER), 3_600);
    ledger
}

pub fn config() -> RebalancerConfig {
    let mut config = RebalancerConfig::default();
    config.ledger.endpoints = vec!["mock://primary".to_string()];
    config.ledger.max_retries = 0;
    config.ledger.call_timeout_ms = 5_000;
    config.ledger.rebalancer_contract = Some(addr(REBALANCER));
    config.monitor.poll_interval_ms = 100;
    config.monitor.confirmation_timeout_ms = 1_000;
    config.monitor.shutdown_grace_ms = 500;
    config
}

pub fn router(ledger: &MockLedger, config: &RebalancerConfig) -> Arc<FailoverRouter> {
    Arc::new(
        FailoverRouter::new(
            vec![ledger.endpoint()],
            config.ledger.call_timeout(),
            config.ledger.max_retries,
        )
        .unwrap(),
    )
}

pub fn reader(ledger: &MockLedger) -> LedgerReader {
    LedgerReader::new(router(ledger, &config()))
}

pub fn service_with(ledger: &MockLedger, config: RebalancerConfig) -> RebalanceService {
    let router = router(ledger, &config);
    RebalanceService::new(config, router, Arc::new(PoolStore::new()))
}

pub fn service(ledger: &MockLedger) -> RebalanceService {
    service_with(ledger, config())
}

/// Poll the store until `tx_hash` leaves `pending`, giving up after ~10s of
/// (possibly paused) time.
pub async fn wait_resolved(service: &RebalanceService, tx_hash: H256) -> RebalanceEvent {
    for _ in 0..200 {
        let event = service.get_transaction_status(tx_hash).unwrap();
        if event.status.is_terminal() {
            return event;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("rebalance {tx_hash:#x} never resolved");
}
