use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Pending,
    Processing,
    Confirmed,
    Expired,
    Failed,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "pending",
            IntentStatus::Processing => "processing",
            IntentStatus::Confirmed => "confirmed",
            IntentStatus::Expired => "expired",
            IntentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(IntentStatus::Pending),
            "processing" => Some(IntentStatus::Processing),
            "confirmed" => Some(IntentStatus::Confirmed),
            "expired" => Some(IntentStatus::Expired),
            "failed" => Some(IntentStatus::Failed),
            _ => None,
        }
    }

    /// Terminal states accept no further observation-driven transitions
    /// (reorg is the one exception, handled explicitly on `confirmed`).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IntentStatus::Expired | IntentStatus::Failed | IntentStatus::Confirmed
        )
    }
}

/// State of a single observed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationStatus {
    Mempool,
    Confirmed,
}

impl ObservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationStatus::Mempool => "mempool",
            ObservationStatus::Confirmed => "confirmed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mempool" => Some(ObservationStatus::Mempool),
            "confirmed" => Some(ObservationStatus::Confirmed),
            _ => None,
        }
    }
}

/// Which path produced an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaSource {
    /// Push path: ZMQ hashtx/hashblock notification
    Zmq,
    /// Pull path: scheduler poll through the RPC node
    RpcPoll,
    /// Pull path: scheduler poll through the Esplora-style indexer
    IndexerPoll,
    /// Forced scan via the scan verb
    Manual,
}

/// The single logical unit handed from the reconciler to the intent state
/// machine, regardless of which source produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationDelta {
    pub txid: String,
    pub vout: u32,
    pub value_sats: i64,
    pub confirmations: i32,
    pub seen_at: DateTime<Utc>,
    pub source: DeltaSource,
}
