//! Shared harness: in-memory SQLite behind the real migrations, a
//! scripted chain backend, and an event sink that records delivery order.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use paygate::config::{
    AdvancedConfig, AppConfig, DatabaseConfig, Network, PayConfig, ZmqConfig,
};
use paygate::infrastructure::bitcoin::{
    AddressOutput, ChainSource, ChainTx, ChainTxOut, NodeError,
};
use paygate::infrastructure::persistence::entities::{payment_intents, tx_observations};
use paygate::infrastructure::persistence::{DbPool, Repositories, RepositoryFactory};
use paygate::{PaymentEvents, PaymentService};
use paygate_migration::{Migrator, MigratorTrait};

/// BIP-32 test vector 1, chain m
pub const XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";
pub const SECRET: &str = "test-secret-that-is-well-over-32-bytes-long";

pub fn descriptor() -> String {
    format!("wpkh({}/0/*)", XPUB)
}

pub fn base_config() -> AppConfig {
    AppConfig {
        pay: PayConfig {
            base_url: "http://localhost:3000".to_string(),
            base_path: "/api/pay".to_string(),
            secret: SECRET.to_string(),
            descriptor: descriptor(),
            network: Network::Regtest,
            confirmations: 1,
            intent_expiry_minutes: 60,
            magic_link_ttl_secs: 86_400,
        },
        rpc: None,
        zmq: ZmqConfig::default(),
        indexer: None,
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
        },
        advanced: AdvancedConfig {
            gap_limit: 20,
            match_mode: Default::default(),
            token_reuse: Default::default(),
            poll_interval: "*/5 * * * *".to_string(),
        },
    }
}

/// Deterministic fake txid: 32 bytes of `n`, hex-encoded.
pub fn test_txid(n: u8) -> String {
    hex::encode([n; 32])
}

/// A chain backend whose contents the test controls.
#[derive(Debug, Default)]
pub struct ScriptedChain {
    txs: Mutex<HashMap<String, ChainTx>>,
    tip: Mutex<u64>,
}

impl ScriptedChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_tx(&self, tx: ChainTx) {
        self.txs.lock().unwrap().insert(tx.txid.clone(), tx);
    }

    /// Make the backend forget a transaction entirely (reorg).
    pub fn remove_tx(&self, txid: &str) {
        self.txs.lock().unwrap().remove(txid);
    }

    pub fn set_tip(&self, height: u64) {
        *self.tip.lock().unwrap() = height;
    }
}

#[async_trait]
impl ChainSource for ScriptedChain {
    fn source_name(&self) -> String {
        "scripted".to_string()
    }

    async fn tip_height(&self) -> Result<u64, NodeError> {
        Ok(*self.tip.lock().unwrap())
    }

    async fn fetch_transaction(&self, txid: &str) -> Result<Option<ChainTx>, NodeError> {
        Ok(self.txs.lock().unwrap().get(txid).cloned())
    }

    async fn address_outputs(
        &self,
        address: &str,
        _thorough: bool,
    ) -> Result<Vec<AddressOutput>, NodeError> {
        let txs = self.txs.lock().unwrap();
        let mut outputs = Vec::new();
        for tx in txs.values() {
            for out in &tx.outputs {
                if out.address.as_deref() == Some(address) {
                    outputs.push(AddressOutput {
                        txid: tx.txid.clone(),
                        vout: out.vout,
                        value_sats: out.value_sats,
                        confirmations: tx.confirmations,
                    });
                }
            }
        }
        Ok(outputs)
    }
}

/// Records every callback in delivery order as `"<event>:<intent id>"`.
#[derive(Debug, Default)]
pub struct RecordingEvents {
    log: Mutex<Vec<String>>,
}

impl RecordingEvents {
    pub fn all(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.as_str() == entry)
            .count()
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl PaymentEvents for RecordingEvents {
    async fn on_intent_created(&self, intent: &payment_intents::Model) -> anyhow::Result<()> {
        self.record(format!("created:{}", intent.id));
        Ok(())
    }

    async fn on_processing(
        &self,
        intent: &payment_intents::Model,
        _observation: &tx_observations::Model,
    ) -> anyhow::Result<()> {
        self.record(format!("processing:{}", intent.id));
        Ok(())
    }

    async fn on_confirmed(
        &self,
        intent: &payment_intents::Model,
        _observation: &tx_observations::Model,
    ) -> anyhow::Result<()> {
        self.record(format!("confirmed:{}", intent.id));
        Ok(())
    }

    async fn on_expired(&self, intent: &payment_intents::Model) -> anyhow::Result<()> {
        self.record(format!("expired:{}", intent.id));
        Ok(())
    }

    async fn on_reorg(&self, intent: &payment_intents::Model, _txid: &str) -> anyhow::Result<()> {
        self.record(format!("reorg:{}", intent.id));
        Ok(())
    }
}

pub struct TestGateway {
    pub service: PaymentService,
    pub chain: Arc<ScriptedChain>,
    pub events: Arc<RecordingEvents>,
    pub repos: Repositories,
    pub pool: DbPool,
}

impl TestGateway {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let mut config = base_config();
        tweak(&mut config);

        let pool = DbPool::connect(&config.database.url)
            .await
            .expect("sqlite connect");
        Migrator::up(pool.get_connection(), None)
            .await
            .expect("migrations");

        let repos = RepositoryFactory::create_repositories(&pool);
        let chain = Arc::new(ScriptedChain::new());
        let events = Arc::new(RecordingEvents::default());

        let service =
            PaymentService::with_source(config, &pool, events.clone(), chain.clone())
                .await
                .expect("service init");

        Self {
            service,
            chain,
            events,
            repos,
            pool,
        }
    }

    /// A one-output transaction paying `address`.
    pub fn payment_tx(
        &self,
        txid: &str,
        address: &str,
        script_pubkey_hex: &str,
        value_sats: i64,
        confirmations: i32,
    ) -> ChainTx {
        ChainTx {
            txid: txid.to_string(),
            confirmations,
            outputs: vec![ChainTxOut {
                vout: 0,
                value_sats,
                address: Some(address.to_string()),
                script_pubkey_hex: script_pubkey_hex.to_string(),
            }],
        }
    }

    /// Script for an assigned address, from the stored row.
    pub async fn script_of(&self, address: &str) -> String {
        self.repos
            .addresses
            .find_by_address(address)
            .await
            .unwrap()
            .expect("address row")
            .script_pubkey_hex
    }
}
