//! Typed contract reads and writes routed through `FailoverRouter`
//!
//! Calldata is built from the `dex` ABI definitions; return data is decoded
//! inside the routed operation, so a successful call with undecodable output
//! surfaces as a fatal `ErrorKind::Decode`.

use std::sync::Arc;

use dex::abi::{factory, pair, rebalancer};
use dex::{decode_address, decode_string_or_bytes32, decode_uint, encode_call, DecodingError};
use dex::{Function, Token};
use rebalancer_types::{Address, H256, U256};

use crate::endpoint::{LogQuery, RawLogEntry, TxReceipt};
use crate::error::{ClassifiedError, ErrorKind, RouterError};
use crate::router::FailoverRouter;

#[derive(Debug, Clone)]
pub struct LedgerReader {
    router: Arc<FailoverRouter>,
}

impl LedgerReader {
    pub fn new(router: Arc<FailoverRouter>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Arc<FailoverRouter> {
        &self.router
    }

    async fn view<T, D>(
        &self,
        operation: &str,
        to: Address,
        function: &'static Function,
        args: &[Token],
        decode: D,
    ) -> Result<T, RouterError>
    where
        D: Fn(&[u8]) -> Result<T, DecodingError> + Sync,
        T: Send,
    {
        let data = encode_call(function, args).map_err(|e| local_fatal(operation, e))?;
        let decode = &decode;

        self.router
            .execute(operation, |endpoint| {
                let data = data.clone();
                async move {
                    let output = endpoint.call(to, data).await?;
                    decode(&output).map_err(|e| {
                        ClassifiedError::new(ErrorKind::Decode, endpoint.url(), e.to_string())
                    })
                }
            })
            .await
    }

    /// `allPairs(index)` on the factory.
    pub async fn all_pairs(&self, factory_address: Address, index: u64) -> Result<Address, RouterError> {
        let function = factory::all_pairs();
        self.view(
            "allPairs",
            factory_address,
            function,
            &[Token::Uint(U256::from(index))],
            |out| decode_address(function, out),
        )
        .await
    }

    pub async fn token0(&self, pair_address: Address) -> Result<Address, RouterError> {
        let function = pair::token0();
        self.view("token0", pair_address, function, &[], |out| decode_address(function, out))
            .await
    }

    pub async fn token1(&self, pair_address: Address) -> Result<Address, RouterError> {
        let function = pair::token1();
        self.view("token1", pair_address, function, &[], |out| decode_address(function, out))
            .await
    }

    pub async fn reserve0(&self, pair_address: Address) -> Result<U256, RouterError> {
        let function = pair::reserve0();
        self.view("reserve0", pair_address, function, &[], |out| decode_uint(function, out))
            .await
    }

    pub async fn reserve1(&self, pair_address: Address) -> Result<U256, RouterError> {
        let function = pair::reserve1();
        self.view("reserve1", pair_address, function, &[], |out| decode_uint(function, out))
            .await
    }

    /// `(reserve0, reserve1)`, read concurrently.
    pub async fn reserves(&self, pair_address: Address) -> Result<(U256, U256), RouterError> {
        tokio::try_join!(self.reserve0(pair_address), self.reserve1(pair_address))
    }

    pub async fn total_supply(&self, pair_address: Address) -> Result<U256, RouterError> {
        let function = pair::total_supply();
        self.view("totalSupply", pair_address, function, &[], |out| decode_uint(function, out))
            .await
    }

    /// ERC-20 `symbol()`, accepting legacy `bytes32` returns.
    pub async fn symbol(&self, token: Address) -> Result<String, RouterError> {
        self.view("symbol", token, pair::symbol(), &[], decode_string_or_bytes32)
            .await
    }

    pub async fn get_code(&self, address: Address) -> Result<Vec<u8>, RouterError> {
        self.router
            .execute("getCode", |endpoint| async move { endpoint.get_code(address).await })
            .await
    }

    pub async fn gas_price(&self) -> Result<U256, RouterError> {
        self.router
            .execute("gasPrice", |endpoint| async move { endpoint.gas_price().await })
            .await
    }

    /// `lastRebalance(pair)` in unix seconds; zero when never rebalanced.
    pub async fn last_rebalance(&self, contract: Address, pair_address: Address) -> Result<U256, RouterError> {
        let function = rebalancer::last_rebalance();
        self.view(
            "lastRebalance",
            contract,
            function,
            &[Token::Address(pair_address)],
            |out| decode_uint(function, out),
        )
        .await
    }

    /// `cooldown()` in seconds.
    pub async fn cooldown(&self, contract: Address) -> Result<U256, RouterError> {
        let function = rebalancer::cooldown();
        self.view("cooldown", contract, function, &[], |out| decode_uint(function, out))
            .await
    }

    fn rebalance_calldata(pair_address: Address, target_ratio_bps: U256) -> Result<Vec<u8>, RouterError> {
        encode_call(
            rebalancer::rebalance(),
            &[Token::Address(pair_address), Token::Uint(target_ratio_bps)],
        )
        .map_err(|e| local_fatal("rebalance", e))
    }

    /// Simulate `rebalance(pair, targetRatioBps)` and return the gas it needs.
    pub async fn estimate_rebalance_gas(
        &self,
        contract: Address,
        pair_address: Address,
        target_ratio_bps: U256,
    ) -> Result<U256, RouterError> {
        let data = Self::rebalance_calldata(pair_address, target_ratio_bps)?;
        self.router
            .execute("estimateGas", |endpoint| {
                let data = data.clone();
                async move { endpoint.estimate_gas(contract, data).await }
            })
            .await
    }

    /// Send `rebalance(pair, targetRatioBps)` and return the transaction hash.
    /// Never replayed on a second endpoint once the first may have accepted it.
    pub async fn submit_rebalance(
        &self,
        contract: Address,
        pair_address: Address,
        target_ratio_bps: U256,
        gas_price: Option<U256>,
    ) -> Result<H256, RouterError> {
        let data = Self::rebalance_calldata(pair_address, target_ratio_bps)?;
        self.router
            .submit("sendTransaction", |endpoint| {
                let data = data.clone();
                async move { endpoint.send_transaction(contract, data, gas_price).await }
            })
            .await
    }

    pub async fn receipt(&self, hash: H256) -> Result<Option<TxReceipt>, RouterError> {
        self.router
            .execute("getTransactionReceipt", |endpoint| async move {
                endpoint.transaction_receipt(hash).await
            })
            .await
    }

    pub async fn block_number(&self) -> Result<u64, RouterError> {
        self.router
            .execute("blockNumber", |endpoint| async move { endpoint.block_number().await })
            .await
    }

    pub async fn logs(&self, query: &LogQuery) -> Result<Vec<RawLogEntry>, RouterError> {
        self.router
            .execute("getLogs", |endpoint| async move { endpoint.get_logs(query).await })
            .await
    }
}

fn local_fatal(operation: &str, error: DecodingError) -> RouterError {
    RouterError::Fatal {
        operation: operation.to_string(),
        source: ClassifiedError::new(ErrorKind::Decode, "local", error.to_string()),
    }
}
