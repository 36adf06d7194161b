//! ZMQ push path: one SUB socket per configured Bitcoin Core notification
//! topic. Each frame is decoded and forwarded into the watcher's signal
//! queue; slow downstream handling queues in process memory.
//!
//! Frame layout (per bitcoind -zmqpub*): `[topic][payload][4-byte LE
//! sequence]`. Hash payloads arrive in internal byte order and are
//! reversed to display hex here.

use bitcoin::consensus::deserialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::ZmqConfig;
use crate::utils::logging;

/// What a notification means to the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchSignal {
    /// A transaction to reconcile
    Tx(String),
    /// A new block: tracked confirmations may have grown
    Block(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZmqTopic {
    HashTx,
    HashBlock,
    RawTx,
    RawBlock,
    Sequence,
}

impl ZmqTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZmqTopic::HashTx => "hashtx",
            ZmqTopic::HashBlock => "hashblock",
            ZmqTopic::RawTx => "rawtx",
            ZmqTopic::RawBlock => "rawblock",
            ZmqTopic::Sequence => "sequence",
        }
    }
}

pub struct ZmqListener;

impl ZmqListener {
    /// Spawn one subscriber task per configured topic. With no ports set
    /// this returns no tasks and the gateway degrades to polling.
    pub fn spawn(
        config: &ZmqConfig,
        sender: mpsc::UnboundedSender<WatchSignal>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let sockets = [
            (ZmqTopic::HashTx, config.hashtx_port),
            (ZmqTopic::HashBlock, config.hashblock_port),
            (ZmqTopic::RawTx, config.rawtx_port),
            (ZmqTopic::RawBlock, config.rawblock_port),
            (ZmqTopic::Sequence, config.sequence_port),
        ];

        sockets
            .into_iter()
            .filter_map(|(topic, port)| port.map(|p| (topic, config.endpoint(p))))
            .map(|(topic, endpoint)| {
                tokio::spawn(run_socket(
                    endpoint,
                    topic,
                    sender.clone(),
                    shutdown.clone(),
                ))
            })
            .collect()
    }
}

async fn run_socket(
    endpoint: String,
    topic: ZmqTopic,
    sender: mpsc::UnboundedSender<WatchSignal>,
    mut shutdown: watch::Receiver<bool>,
) {
    use zeromq::{Socket, SocketRecv};

    let mut socket = zeromq::SubSocket::new();
    if let Err(e) = socket.connect(&endpoint).await {
        logging::log_error(&format!("ZMQ connect to {} failed: {}", endpoint, e));
        return;
    }
    if let Err(e) = socket.subscribe(topic.as_str()).await {
        logging::log_error(&format!(
            "ZMQ subscribe {} on {} failed: {}",
            topic.as_str(),
            endpoint,
            e
        ));
        return;
    }
    logging::log_info(&format!(
        "ZMQ subscribed to {} on {}",
        topic.as_str(),
        endpoint
    ));

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            received = socket.recv() => match received {
                Ok(message) => {
                    let frames: Vec<&[u8]> = (0..message.len())
                        .filter_map(|i| message.get(i).map(|b| b.as_ref()))
                        .collect();
                    if let Some(signal) = decode_frames(topic, &frames) {
                        if sender.send(signal).is_err() {
                            break; // watcher gone
                        }
                    }
                }
                Err(e) => {
                    logging::log_warning(&format!(
                        "ZMQ recv error on {} ({}): {}",
                        topic.as_str(),
                        endpoint,
                        e
                    ));
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }
    logging::log_info(&format!("ZMQ subscriber for {} stopped", topic.as_str()));
}

/// Decode one multipart notification into a watch signal. Sequence-topic
/// frames and malformed payloads produce nothing.
fn decode_frames(topic: ZmqTopic, frames: &[&[u8]]) -> Option<WatchSignal> {
    let payload = frames.get(1)?;

    if let Some(seq) = frames.get(2).and_then(|b| decode_sequence(b)) {
        logging::log_debug(&format!("zmq {} seq {}", topic.as_str(), seq));
    }

    match topic {
        ZmqTopic::HashTx => hash_to_hex(payload).map(WatchSignal::Tx),
        ZmqTopic::HashBlock => hash_to_hex(payload).map(WatchSignal::Block),
        ZmqTopic::RawTx => deserialize::<bitcoin::Transaction>(payload)
            .ok()
            .map(|tx| WatchSignal::Tx(tx.compute_txid().to_string())),
        ZmqTopic::RawBlock => deserialize::<bitcoin::Block>(payload)
            .ok()
            .map(|block| WatchSignal::Block(block.block_hash().to_string())),
        ZmqTopic::Sequence => {
            if let Some(hash) = frames.get(1).and_then(|b| hash_to_hex(&b[..32.min(b.len())])) {
                logging::log_debug(&format!("zmq sequence event for {}", hash));
            }
            None
        }
    }
}

/// 32-byte hash in internal byte order → display hex.
fn hash_to_hex(bytes: &[u8]) -> Option<String> {
    if bytes.len() != 32 {
        return None;
    }
    let mut reversed = bytes.to_vec();
    reversed.reverse();
    Some(hex::encode(reversed))
}

/// Trailing 4-byte little-endian sequence counter.
fn decode_sequence(bytes: &[u8]) -> Option<u32> {
    let arr: [u8; 4] = bytes.try_into().ok()?;
    Some(u32::from_le_bytes(arr))
}
