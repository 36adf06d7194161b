//! Esplora-style REST indexer chain source (pull path only).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::IndexerApiConfig;
use crate::infrastructure::bitcoin::error::NodeError;
use crate::infrastructure::bitcoin::source::{AddressOutput, ChainSource, ChainTx, ChainTxOut};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct EsploraTx {
    txid: String,
    status: EsploraTxStatus,
    vout: Vec<EsploraVout>,
}

#[derive(Debug, Deserialize)]
struct EsploraTxStatus {
    confirmed: bool,
    block_height: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct EsploraVout {
    scriptpubkey: String,
    scriptpubkey_address: Option<String>,
    value: u64,
}

pub struct EsploraSource {
    client: reqwest::Client,
    base_url: String,
}

impl fmt::Debug for EsploraSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EsploraSource")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl EsploraSource {
    pub fn new(config: &IndexerApiConfig) -> Result<Self, NodeError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| NodeError::Fatal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, NodeError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| NodeError::Transient(format!("indexer request failed: {}", e)))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(NodeError::Transient(format!(
                "indexer returned {} for {}",
                status, url
            )));
        }
        Ok(response)
    }

    fn confirmations(status: &EsploraTxStatus, tip: u64) -> i32 {
        match (status.confirmed, status.block_height) {
            (true, Some(height)) => (tip.saturating_sub(height) + 1) as i32,
            _ => 0,
        }
    }
}

#[async_trait]
impl ChainSource for EsploraSource {
    fn source_name(&self) -> String {
        format!("esplora({})", self.base_url)
    }

    async fn tip_height(&self) -> Result<u64, NodeError> {
        let response = self.get("/blocks/tip/height").await?;
        let body = response
            .text()
            .await
            .map_err(|e| NodeError::Transient(format!("indexer response error: {}", e)))?;
        body.trim()
            .parse()
            .map_err(|e| NodeError::Fatal(format!("indexer tip height unparsable: {}", e)))
    }

    async fn fetch_transaction(&self, txid: &str) -> Result<Option<ChainTx>, NodeError> {
        let response = self.get(&format!("/tx/{}", txid)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(NodeError::Fatal(format!(
                "indexer returned {} fetching tx {}",
                response.status(),
                txid
            )));
        }

        let tx: EsploraTx = response
            .json()
            .await
            .map_err(|e| NodeError::Transient(format!("indexer response decode error: {}", e)))?;

        let confirmations = if tx.status.confirmed {
            let tip = self.tip_height().await?;
            Self::confirmations(&tx.status, tip)
        } else {
            0
        };

        let outputs = tx
            .vout
            .into_iter()
            .enumerate()
            .map(|(n, out)| ChainTxOut {
                vout: n as u32,
                value_sats: out.value as i64,
                address: out.scriptpubkey_address,
                script_pubkey_hex: out.scriptpubkey,
            })
            .collect();

        Ok(Some(ChainTx {
            txid: tx.txid,
            confirmations,
            outputs,
        }))
    }

    async fn address_outputs(
        &self,
        address: &str,
        _thorough: bool,
    ) -> Result<Vec<AddressOutput>, NodeError> {
        let response = self.get(&format!("/address/{}/txs", address)).await?;
        if !response.status().is_success() {
            return Err(NodeError::Fatal(format!(
                "indexer returned {} for address {}",
                response.status(),
                address
            )));
        }

        let txs: Vec<EsploraTx> = response
            .json()
            .await
            .map_err(|e| NodeError::Transient(format!("indexer response decode error: {}", e)))?;

        let tip = if txs.iter().any(|tx| tx.status.confirmed) {
            self.tip_height().await?
        } else {
            0
        };

        let mut outputs = Vec::new();
        for tx in txs {
            let confirmations = Self::confirmations(&tx.status, tip);
            for (n, out) in tx.vout.iter().enumerate() {
                if out.scriptpubkey_address.as_deref() == Some(address) {
                    outputs.push(AddressOutput {
                        txid: tx.txid.clone(),
                        vout: n as u32,
                        value_sats: out.value as i64,
                        confirmations,
                    });
                }
            }
        }
        Ok(outputs)
    }
}
