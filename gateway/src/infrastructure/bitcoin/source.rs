//! The chain-source seam: one trait over the push-path RPC node and the
//! pull-path Esplora indexer, so the reconciler never cares which backend
//! produced a transaction.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::infrastructure::bitcoin::error::NodeError;
use crate::infrastructure::bitcoin::esplora::EsploraSource;
use crate::infrastructure::bitcoin::rpc::RpcSource;
use crate::utils::logging;

/// A transaction as the reconciler sees it.
#[derive(Debug, Clone)]
pub struct ChainTx {
    pub txid: String,
    pub confirmations: i32,
    pub outputs: Vec<ChainTxOut>,
}

#[derive(Debug, Clone)]
pub struct ChainTxOut {
    pub vout: u32,
    pub value_sats: i64,
    pub address: Option<String>,
    pub script_pubkey_hex: String,
}

/// One output found while querying by address.
#[derive(Debug, Clone)]
pub struct AddressOutput {
    pub txid: String,
    pub vout: u32,
    pub value_sats: i64,
    pub confirmations: i32,
}

/// Chain data backends implement this; instances are picked by
/// [`build_source`] from configuration.
#[async_trait]
pub trait ChainSource: Send + Sync + fmt::Debug {
    fn source_name(&self) -> String;

    async fn tip_height(&self) -> Result<u64, NodeError>;

    /// `Ok(None)` means the backend does not know the transaction at all
    /// ("no such mempool or blockchain transaction"), which is the reorg signal.
    async fn fetch_transaction(&self, txid: &str) -> Result<Option<ChainTx>, NodeError>;

    /// Outputs currently paying `address`. `thorough` lets the RPC backend
    /// fall back to a UTXO-set scan when the wallet does not track the
    /// address; the indexer backend ignores it.
    async fn address_outputs(
        &self,
        address: &str,
        thorough: bool,
    ) -> Result<Vec<AddressOutput>, NodeError>;
}

/// RPC primary with indexer fallback on transient failure only.
#[derive(Debug)]
pub struct FallbackSource {
    primary: Arc<dyn ChainSource>,
    fallback: Arc<dyn ChainSource>,
}

impl FallbackSource {
    pub fn new(primary: Arc<dyn ChainSource>, fallback: Arc<dyn ChainSource>) -> Self {
        Self { primary, fallback }
    }

    fn note_fallback(&self, op: &str, err: &NodeError) {
        logging::log_warning(&format!(
            "{} failed transiently on {} ({}), falling back to {}",
            op,
            self.primary.source_name(),
            err,
            self.fallback.source_name()
        ));
    }
}

#[async_trait]
impl ChainSource for FallbackSource {
    fn source_name(&self) -> String {
        format!(
            "{}+{}",
            self.primary.source_name(),
            self.fallback.source_name()
        )
    }

    async fn tip_height(&self) -> Result<u64, NodeError> {
        match self.primary.tip_height().await {
            Err(e) if e.is_transient() => {
                self.note_fallback("tip_height", &e);
                self.fallback.tip_height().await
            }
            other => other,
        }
    }

    async fn fetch_transaction(&self, txid: &str) -> Result<Option<ChainTx>, NodeError> {
        match self.primary.fetch_transaction(txid).await {
            Err(e) if e.is_transient() => {
                self.note_fallback("fetch_transaction", &e);
                self.fallback.fetch_transaction(txid).await
            }
            other => other,
        }
    }

    async fn address_outputs(
        &self,
        address: &str,
        thorough: bool,
    ) -> Result<Vec<AddressOutput>, NodeError> {
        match self.primary.address_outputs(address, thorough).await {
            Err(e) if e.is_transient() => {
                self.note_fallback("address_outputs", &e);
                self.fallback.address_outputs(address, thorough).await
            }
            other => other,
        }
    }
}

/// Build the chain source from configuration. Exactly one backend family
/// must be configured; with both, rpc+zmq is primary and the indexer only
/// covers transient RPC failures.
pub fn build_source(config: &AppConfig) -> Result<Arc<dyn ChainSource>, NodeError> {
    match (&config.rpc, &config.indexer) {
        (Some(rpc), indexer) => {
            let primary: Arc<dyn ChainSource> =
                Arc::new(RpcSource::new(rpc, config.pay.network)?);
            logging::log_info(&format!("Using chain source: {}", primary.source_name()));
            match indexer {
                Some(idx) => {
                    let fallback: Arc<dyn ChainSource> = Arc::new(EsploraSource::new(idx)?);
                    Ok(Arc::new(FallbackSource::new(primary, fallback)))
                }
                None => Ok(primary),
            }
        }
        (None, Some(idx)) => {
            let source: Arc<dyn ChainSource> = Arc::new(EsploraSource::new(idx)?);
            logging::log_info(&format!("Using chain source: {}", source.source_name()));
            Ok(source)
        }
        (None, None) => Err(NodeError::Fatal(
            "no chain backend configured: set BITCOIN_RPC_HOST or INDEXER_API_URL".to_string(),
        )),
    }
}
