//! Programmable in-memory ledger for tests
//!
//! `MockLedger` answers the factory, pair, ERC-20 and rebalancer calls the
//! reader issues, from state the test sets up. Handles are cheap clones that
//! share the ledger state; `replica` creates a second endpoint over the same
//! state with its own URL, latency and fault rules, for failover tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dex::abi::{factory, pair, rebalancer};
use dex::{encode_output, selector_of, Token};
use parking_lot::Mutex;
use rebalancer_types::{Address, H256, U256};

use crate::endpoint::{LedgerEndpoint, LogQuery, RawLogEntry, TxReceipt};
use crate::error::{ClassifiedError, ErrorKind};

/// What `allPairs(i)` does once `i` is past the last pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PastEnd {
    ZeroAddress,
    Revert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockPair {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub reserve0: U256,
    pub reserve1: U256,
    pub total_supply: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransaction {
    pub hash: H256,
    pub to: Address,
    pub data: Vec<u8>,
    pub gas_price: Option<U256>,
}

/// Which requests a fault rule applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailWhen {
    Always,
    /// RPC method name, e.g. `"eth_gasPrice"`.
    Method(&'static str),
    /// Any `eth_call` with this selector.
    Selector([u8; 4]),
    /// Any `eth_call` to this address.
    Address(Address),
    /// `eth_call` to `to` with `selector`.
    Call { to: Address, selector: [u8; 4] },
}

#[derive(Debug, Clone)]
struct FaultRule {
    when: FailWhen,
    kind: ErrorKind,
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct Factory {
    pairs: Vec<Address>,
    past_end: Option<PastEnd>,
}

#[derive(Debug, Default)]
struct LedgerState {
    chain_id: u64,
    code: HashMap<Address, Vec<u8>>,
    factories: HashMap<Address, Factory>,
    pairs: HashMap<Address, MockPair>,
    symbols: HashMap<Address, String>,
    rebalancer: Option<Address>,
    cooldown: U256,
    last_rebalance: HashMap<Address, U256>,
    gas_price: U256,
    gas_estimate: Option<U256>,
    auto_receipt_status: Option<u64>,
    post_rebalance_reserves: HashMap<Address, (U256, U256)>,
    receipts: HashMap<H256, TxReceipt>,
    sent: Vec<SentTransaction>,
    block_number: u64,
    logs: Vec<RawLogEntry>,
}

#[derive(Debug, Default)]
struct EndpointState {
    latency: Option<Duration>,
    send_reply_delay: Option<Duration>,
    faults: Vec<FaultRule>,
    calls: HashMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct MockLedger {
    url: String,
    ledger: Arc<Mutex<LedgerState>>,
    endpoint: Arc<Mutex<EndpointState>>,
}

const CONTRACT_CODE: &[u8] = &[0x60, 0x80, 0x60, 0x40];

impl MockLedger {
    pub fn new(url: impl Into<String>) -> Self {
        let state = LedgerState {
            chain_id: 137,
            gas_price: U256::from(30_000_000_000u64),
            gas_estimate: Some(U256::from(150_000u64)),
            block_number: 1,
            ..Default::default()
        };
        Self {
            url: url.into(),
            ledger: Arc::new(Mutex::new(state)),
            endpoint: Arc::new(Mutex::new(EndpointState::default())),
        }
    }

    /// Another endpoint over the same ledger state.
    pub fn replica(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ledger: Arc::clone(&self.ledger),
            endpoint: Arc::new(Mutex::new(EndpointState::default())),
        }
    }

    pub fn endpoint(&self) -> Arc<dyn LedgerEndpoint> {
        Arc::new(self.clone())
    }

    // ---- ledger setup ----

    pub fn add_factory(&self, address: Address, past_end: PastEnd) {
        let mut state = self.ledger.lock();
        state.code.insert(address, CONTRACT_CODE.to_vec());
        state.factories.insert(
            address,
            Factory {
                pairs: Vec::new(),
                past_end: Some(past_end),
            },
        );
    }

    /// Register `pair` at the factory's next index.
    pub fn add_pair(&self, factory_address: Address, pair: MockPair) {
        let mut state = self.ledger.lock();
        state.code.insert(pair.address, CONTRACT_CODE.to_vec());
        state
            .factories
            .entry(factory_address)
            .or_default()
            .pairs
            .push(pair.address);
        state.pairs.insert(pair.address, pair);
    }

    /// List a pair address at the factory without pair state behind it.
    pub fn add_unreadable_pair(&self, factory_address: Address, pair_address: Address) {
        self.ledger
            .lock()
            .factories
            .entry(factory_address)
            .or_default()
            .pairs
            .push(pair_address);
    }

    pub fn set_symbol(&self, token: Address, symbol: impl Into<String>) {
        let mut state = self.ledger.lock();
        state.code.insert(token, CONTRACT_CODE.to_vec());
        state.symbols.insert(token, symbol.into());
    }

    pub fn set_reserves(&self, pair_address: Address, reserve0: U256, reserve1: U256) {
        if let Some(pair) = self.ledger.lock().pairs.get_mut(&pair_address) {
            pair.reserve0 = reserve0;
            pair.reserve1 = reserve1;
        }
    }

    pub fn set_rebalancer(&self, contract: Address, cooldown_secs: u64) {
        let mut state = self.ledger.lock();
        state.code.insert(contract, CONTRACT_CODE.to_vec());
        state.rebalancer = Some(contract);
        state.cooldown = U256::from(cooldown_secs);
    }

    pub fn set_last_rebalance(&self, pair_address: Address, unix_secs: u64) {
        self.ledger
            .lock()
            .last_rebalance
            .insert(pair_address, U256::from(unix_secs));
    }

    pub fn set_gas_price(&self, price: U256) {
        self.ledger.lock().gas_price = price;
    }

    /// `None` makes gas estimation revert.
    pub fn set_gas_estimate(&self, estimate: Option<U256>) {
        self.ledger.lock().gas_estimate = estimate;
    }

    /// Mine every sent transaction immediately with this receipt status.
    pub fn set_auto_receipt(&self, status: Option<u64>) {
        self.ledger.lock().auto_receipt_status = status;
    }

    /// Reserves a successful auto-mined rebalance of `pair_address` leaves.
    pub fn set_post_rebalance_reserves(&self, pair_address: Address, reserve0: U256, reserve1: U256) {
        self.ledger
            .lock()
            .post_rebalance_reserves
            .insert(pair_address, (reserve0, reserve1));
    }

    pub fn set_receipt(&self, receipt: TxReceipt) {
        self.ledger.lock().receipts.insert(receipt.tx_hash, receipt);
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.ledger.lock().chain_id = chain_id;
    }

    pub fn set_block_number(&self, block: u64) {
        self.ledger.lock().block_number = block;
    }

    pub fn push_log(&self, entry: RawLogEntry) {
        self.ledger.lock().logs.push(entry);
    }

    pub fn sent_transactions(&self) -> Vec<SentTransaction> {
        self.ledger.lock().sent.clone()
    }

    // ---- endpoint behaviour ----

    pub fn set_latency(&self, latency: Duration) {
        self.endpoint.lock().latency = Some(latency);
    }

    /// Record sent transactions at once but hold the reply this long, like a
    /// node that broadcasts and then stalls.
    pub fn set_send_reply_delay(&self, delay: Duration) {
        self.endpoint.lock().send_reply_delay = Some(delay);
    }

    /// Fail matching requests with `kind`, `times` times or forever.
    pub fn fail(&self, when: FailWhen, kind: ErrorKind, times: Option<usize>) {
        self.endpoint.lock().faults.push(FaultRule {
            when,
            kind,
            remaining: times,
        });
    }

    pub fn clear_faults(&self) {
        self.endpoint.lock().faults.clear();
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.endpoint.lock().calls.get(method).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.endpoint.lock().calls.values().sum()
    }

    async fn enter(
        &self,
        method: &'static str,
        call: Option<(Address, [u8; 4])>,
    ) -> Result<(), ClassifiedError> {
        let latency = {
            let mut endpoint = self.endpoint.lock();
            *endpoint.calls.entry(method.to_string()).or_insert(0) += 1;
            endpoint.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut endpoint = self.endpoint.lock();
        let position = endpoint.faults.iter().position(|rule| match &rule.when {
            FailWhen::Always => true,
            FailWhen::Method(m) => *m == method,
            FailWhen::Selector(s) => call.map(|(_, sel)| sel == *s).unwrap_or(false),
            FailWhen::Address(a) => call.map(|(to, _)| to == *a).unwrap_or(false),
            FailWhen::Call { to, selector } => call == Some((*to, *selector)),
        });

        let Some(position) = position else {
            return Ok(());
        };
        let kind = endpoint.faults[position].kind;
        let exhausted = match endpoint.faults[position].remaining.as_mut() {
            Some(remaining) => {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            }
            None => false,
        };
        if exhausted {
            endpoint.faults.remove(position);
        }
        Err(ClassifiedError::new(
            kind,
            self.url.clone(),
            format!("injected {kind} failure for {method}"),
        ))
    }

    fn revert(&self, reason: &str) -> ClassifiedError {
        ClassifiedError::new(
            ErrorKind::Revert,
            self.url.clone(),
            format!("execution reverted: {reason}"),
        )
    }

    fn answer_call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, ClassifiedError> {
        let state = self.ledger.lock();
        if !state.code.contains_key(&to) {
            // eth_call to an account without code returns empty data
            return Ok(Vec::new());
        }
        let selector = selector_from(data);
        let args = &data[data.len().min(4)..];

        if selector == selector_of(factory::all_pairs()) {
            let factory_state = state
                .factories
                .get(&to)
                .ok_or_else(|| self.revert("not a factory"))?;
            let index = factory::all_pairs()
                .decode_input(args)
                .ok()
                .and_then(|tokens| tokens.into_iter().next())
                .and_then(Token::into_uint)
                .ok_or_else(|| self.revert("bad index"))?;
            return match usize::try_from(index).ok().and_then(|i| factory_state.pairs.get(i)) {
                Some(address) => Ok(encode_output(&[Token::Address(*address)])),
                None => match factory_state.past_end {
                    Some(PastEnd::Revert) => Err(self.revert("index out of range")),
                    _ => Ok(encode_output(&[Token::Address(Address::zero())])),
                },
            };
        }

        if let Some(pair_state) = state.pairs.get(&to) {
            let token = if selector == selector_of(pair::token0()) {
                Some(Token::Address(pair_state.token0))
            } else if selector == selector_of(pair::token1()) {
                Some(Token::Address(pair_state.token1))
            } else if selector == selector_of(pair::reserve0()) {
                Some(Token::Uint(pair_state.reserve0))
            } else if selector == selector_of(pair::reserve1()) {
                Some(Token::Uint(pair_state.reserve1))
            } else if selector == selector_of(pair::total_supply()) {
                Some(Token::Uint(pair_state.total_supply))
            } else {
                None
            };
            if let Some(token) = token {
                return Ok(encode_output(&[token]));
            }
        }

        if selector == selector_of(pair::symbol()) {
            return state
                .symbols
                .get(&to)
                .map(|symbol| encode_output(&[Token::String(symbol.clone())]))
                .ok_or_else(|| self.revert("symbol not implemented"));
        }

        if Some(to) == state.rebalancer {
            if selector == selector_of(rebalancer::cooldown()) {
                return Ok(encode_output(&[Token::Uint(state.cooldown)]));
            }
            if selector == selector_of(rebalancer::last_rebalance()) {
                let pair_address = rebalancer::last_rebalance()
                    .decode_input(args)
                    .ok()
                    .and_then(|tokens| tokens.into_iter().next())
                    .and_then(Token::into_address)
                    .ok_or_else(|| self.revert("bad pair"))?;
                let last = state
                    .last_rebalance
                    .get(&pair_address)
                    .copied()
                    .unwrap_or_default();
                return Ok(encode_output(&[Token::Uint(last)]));
            }
        }

        Err(self.revert("unknown selector"))
    }
}

fn selector_from(data: &[u8]) -> [u8; 4] {
    let mut selector = [0u8; 4];
    let n = data.len().min(4);
    selector[..n].copy_from_slice(&data[..n]);
    selector
}

#[async_trait]
impl LedgerEndpoint for MockLedger {
    fn url(&self) -> &str {
        &self.url
    }

    async fn chain_id(&self) -> Result<u64, ClassifiedError> {
        self.enter("eth_chainId", None).await?;
        Ok(self.ledger.lock().chain_id)
    }

    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, ClassifiedError> {
        self.enter("eth_call", Some((to, selector_from(&data)))).await?;
        self.answer_call(to, &data)
    }

    async fn get_code(&self, address: Address) -> Result<Vec<u8>, ClassifiedError> {
        self.enter("eth_getCode", None).await?;
        Ok(self.ledger.lock().code.get(&address).cloned().unwrap_or_default())
    }

    async fn gas_price(&self) -> Result<U256, ClassifiedError> {
        self.enter("eth_gasPrice", None).await?;
        Ok(self.ledger.lock().gas_price)
    }

    async fn estimate_gas(&self, to: Address, data: Vec<u8>) -> Result<U256, ClassifiedError> {
        self.enter("eth_estimateGas", Some((to, selector_from(&data)))).await?;
        self.ledger
            .lock()
            .gas_estimate
            .ok_or_else(|| self.revert("simulation failed"))
    }

    async fn send_transaction(
        &self,
        to: Address,
        data: Vec<u8>,
        gas_price: Option<U256>,
    ) -> Result<H256, ClassifiedError> {
        self.enter("eth_sendTransaction", Some((to, selector_from(&data)))).await?;

        let hash = {
            let mut state = self.ledger.lock();
            let hash = H256::from_low_u64_be(0x1000 + state.sent.len() as u64);
            state.block_number += 1;

            if let Some(status) = state.auto_receipt_status {
                let receipt = TxReceipt {
                    tx_hash: hash,
                    status: Some(status),
                    gas_used: state.gas_estimate.or(Some(U256::from(150_000u64))),
                    effective_gas_price: gas_price.or(Some(state.gas_price)),
                    block_number: Some(state.block_number),
                };
                state.receipts.insert(hash, receipt);

                if status == 1 && selector_from(&data) == selector_of(rebalancer::rebalance()) {
                    let pair_address = rebalancer::rebalance()
                        .decode_input(&data[4..])
                        .ok()
                        .and_then(|tokens| tokens.into_iter().next())
                        .and_then(Token::into_address);
                    if let Some(pair_address) = pair_address {
                        if let Some((r0, r1)) = state.post_rebalance_reserves.get(&pair_address).copied() {
                            if let Some(pair_state) = state.pairs.get_mut(&pair_address) {
                                pair_state.reserve0 = r0;
                                pair_state.reserve1 = r1;
                            }
                        }
                    }
                }
            }

            state.sent.push(SentTransaction {
                hash,
                to,
                data,
                gas_price,
            });
            hash
        };

        let reply_delay = self.endpoint.lock().send_reply_delay;
        if let Some(delay) = reply_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TxReceipt>, ClassifiedError> {
        self.enter("eth_getTransactionReceipt", None).await?;
        Ok(self.ledger.lock().receipts.get(&hash).cloned())
    }

    async fn block_number(&self) -> Result<u64, ClassifiedError> {
        self.enter("eth_blockNumber", None).await?;
        Ok(self.ledger.lock().block_number)
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<RawLogEntry>, ClassifiedError> {
        self.enter("eth_getLogs", None).await?;
        let state = self.ledger.lock();
        Ok(state
            .logs
            .iter()
            .filter(|log| {
                let block = log.block_number.unwrap_or_default();
                block >= query.from_block
                    && block <= query.to_block
                    && query.addresses.contains(&log.address)
                    && log
                        .topics
                        .first()
                        .map(|t| query.topics.contains(t))
                        .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}
