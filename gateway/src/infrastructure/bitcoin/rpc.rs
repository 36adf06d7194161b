//! Bitcoin Core JSON-RPC chain source.
//!
//! bitcoincore-rpc is a blocking client; every call is moved onto the
//! blocking pool so the watcher tasks never stall the runtime.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::{Address, Txid};
use bitcoincore_rpc::jsonrpc;
use bitcoincore_rpc::json::ScanTxOutRequest;
use bitcoincore_rpc::{Client, RpcApi};

use crate::config::{Network, RpcConfig};
use crate::infrastructure::bitcoin::error::{classify_rpc_error, is_tx_not_found, NodeError};
use crate::infrastructure::bitcoin::source::{AddressOutput, ChainSource, ChainTx, ChainTxOut};
use crate::utils::logging;

pub struct RpcSource {
    client: Arc<Client>,
    network: Network,
}

impl fmt::Debug for RpcSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcSource")
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

impl RpcSource {
    /// Build the client with the configured connect/call timeout and HTTP
    /// Basic credentials.
    pub fn new(config: &RpcConfig, network: Network) -> Result<Self, NodeError> {
        let transport = jsonrpc::simple_http::SimpleHttpTransport::builder()
            .url(&config.url())
            .map_err(|e| NodeError::Fatal(format!("invalid RPC URL: {}", e)))?
            .timeout(Duration::from_secs(config.timeout_secs))
            .auth(config.username.clone(), Some(config.password.clone()))
            .build();
        let client = Client::from_jsonrpc(jsonrpc::Client::with_transport(transport));

        logging::log_info(&format!(
            "Bitcoin RPC client configured for {} ({})",
            config.url(),
            network.as_str()
        ));

        Ok(Self {
            client: Arc::new(client),
            network,
        })
    }

    /// Verify connectivity and that the node is on the expected chain.
    pub async fn check_connection(&self) -> Result<(), NodeError> {
        let client = self.client.clone();
        let expected = self.network.to_bitcoin_network();
        self.blocking(move || {
            let info = client.get_blockchain_info().map_err(|e| classify_rpc_error(&e))?;
            if info.chain != expected {
                return Err(NodeError::Fatal(format!(
                    "RPC node is on {:?}, gateway configured for {:?}",
                    info.chain, expected
                )));
            }
            Ok(())
        })
        .await
    }

    /// `estimatesmartfee` pass-through in sat/vB.
    pub async fn estimate_fee_rate(&self, target_blocks: u16) -> Result<Option<f64>, NodeError> {
        let client = self.client.clone();
        self.blocking(move || {
            let estimate = client
                .estimate_smart_fee(target_blocks, None)
                .map_err(|e| classify_rpc_error(&e))?;
            Ok(estimate
                .fee_rate
                .map(|rate| rate.to_btc() * 100_000.0))
        })
        .await
    }

    async fn blocking<T, F>(&self, call: F) -> Result<T, NodeError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, NodeError> + Send + 'static,
    {
        tokio::task::spawn_blocking(call)
            .await
            .map_err(|e| NodeError::Transient(format!("blocking task join error: {}", e)))?
    }

    fn parse_txid(txid: &str) -> Result<Txid, NodeError> {
        Txid::from_str(txid).map_err(|e| NodeError::Fatal(format!("invalid txid: {}", e)))
    }
}

#[async_trait]
impl ChainSource for RpcSource {
    fn source_name(&self) -> String {
        "bitcoin-core-rpc".to_string()
    }

    async fn tip_height(&self) -> Result<u64, NodeError> {
        let client = self.client.clone();
        self.blocking(move || client.get_block_count().map_err(|e| classify_rpc_error(&e)))
            .await
    }

    async fn fetch_transaction(&self, txid: &str) -> Result<Option<ChainTx>, NodeError> {
        let parsed = Self::parse_txid(txid)?;
        let client = self.client.clone();
        self.blocking(move || {
            let info = match client.get_raw_transaction_info(&parsed, None) {
                Ok(info) => info,
                Err(e) if is_tx_not_found(&e) => return Ok(None),
                Err(e) => return Err(classify_rpc_error(&e)),
            };

            let outputs = info
                .vout
                .into_iter()
                .map(|out| ChainTxOut {
                    vout: out.n,
                    value_sats: out.value.to_sat() as i64,
                    address: out
                        .script_pub_key
                        .address
                        .map(|a| a.assume_checked().to_string()),
                    script_pubkey_hex: hex::encode(&out.script_pub_key.hex),
                })
                .collect();

            Ok(Some(ChainTx {
                txid: info.txid.to_string(),
                confirmations: info.confirmations.unwrap_or(0) as i32,
                outputs,
            }))
        })
        .await
    }

    async fn address_outputs(
        &self,
        address: &str,
        thorough: bool,
    ) -> Result<Vec<AddressOutput>, NodeError> {
        let checked = Address::from_str(address)
            .map_err(|e| NodeError::Fatal(format!("invalid address: {}", e)))?
            .require_network(self.network.to_bitcoin_network())
            .map_err(|e| NodeError::Fatal(format!("address/network mismatch: {}", e)))?;

        let client = self.client.clone();
        let owned_address = address.to_string();
        self.blocking(move || {
            // listunspent covers nodes that track the address (importdescriptors)
            let unspent = client
                .list_unspent(Some(0), None, Some(&[&checked]), Some(true), None)
                .map_err(|e| classify_rpc_error(&e))?;

            let mut outputs: Vec<AddressOutput> = unspent
                .into_iter()
                .map(|entry| AddressOutput {
                    txid: entry.txid.to_string(),
                    vout: entry.vout,
                    value_sats: entry.amount.to_sat() as i64,
                    confirmations: entry.confirmations as i32,
                })
                .collect();

            if outputs.is_empty() && thorough {
                // Forced scans fall back to the UTXO set; this is slow and
                // only reaches confirmed outputs, which is why the periodic
                // poll never sets `thorough`.
                let tip = client.get_block_count().map_err(|e| classify_rpc_error(&e))?;
                let scan = client
                    .scan_tx_out_set_blocking(&[ScanTxOutRequest::Single(format!(
                        "addr({})",
                        owned_address
                    ))])
                    .map_err(|e| classify_rpc_error(&e))?;
                outputs = scan
                    .unspents
                    .into_iter()
                    .map(|utxo| AddressOutput {
                        txid: utxo.txid.to_string(),
                        vout: utxo.vout,
                        value_sats: utxo.amount.to_sat() as i64,
                        confirmations: (tip.saturating_sub(utxo.height) + 1) as i32,
                    })
                    .collect();
            }

            Ok(outputs)
        })
        .await
    }
}
