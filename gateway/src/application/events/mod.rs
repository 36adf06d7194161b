//! Event delivery to the embedding application.
//!
//! Callbacks for one intent are serialized so a downstream side-effect
//! chain observes transitions in order; different intents may interleave.
//! Callback failures are logged and never roll back the state change that
//! produced them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::infrastructure::persistence::entities::{payment_intents, tx_observations};
use crate::utils::logging;

/// Implemented by the embedding application; every hook defaults to a
/// no-op so a sink only overrides what it cares about.
#[async_trait]
pub trait PaymentEvents: Send + Sync {
    async fn on_intent_created(&self, _intent: &payment_intents::Model) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_processing(
        &self,
        _intent: &payment_intents::Model,
        _observation: &tx_observations::Model,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_confirmed(
        &self,
        _intent: &payment_intents::Model,
        _observation: &tx_observations::Model,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_expired(&self, _intent: &payment_intents::Model) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_reorg(&self, _intent: &payment_intents::Model, _txid: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Sink used when the embedder registers no callbacks.
#[derive(Debug, Default)]
pub struct NoopEvents;

#[async_trait]
impl PaymentEvents for NoopEvents {}

/// A state change worth telling the embedder about.
#[derive(Debug, Clone)]
pub enum PaymentEvent {
    Created(payment_intents::Model),
    Processing {
        intent: payment_intents::Model,
        observation: tx_observations::Model,
    },
    Confirmed {
        intent: payment_intents::Model,
        observation: tx_observations::Model,
    },
    Expired(payment_intents::Model),
    Reorg {
        intent: payment_intents::Model,
        txid: String,
    },
}

impl PaymentEvent {
    fn intent_id(&self) -> i64 {
        match self {
            PaymentEvent::Created(intent) => intent.id,
            PaymentEvent::Processing { intent, .. } => intent.id,
            PaymentEvent::Confirmed { intent, .. } => intent.id,
            PaymentEvent::Expired(intent) => intent.id,
            PaymentEvent::Reorg { intent, .. } => intent.id,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            PaymentEvent::Created(_) => "intent_created",
            PaymentEvent::Processing { .. } => "processing",
            PaymentEvent::Confirmed { .. } => "confirmed",
            PaymentEvent::Expired(_) => "expired",
            PaymentEvent::Reorg { .. } => "reorg",
        }
    }
}

#[derive(Clone)]
pub struct EventDispatcher {
    sink: Arc<dyn PaymentEvents>,
    locks: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher").finish_non_exhaustive()
    }
}

impl EventDispatcher {
    pub fn new(sink: Arc<dyn PaymentEvents>) -> Self {
        Self {
            sink,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Deliver one event, serialized per intent.
    pub async fn dispatch(&self, event: PaymentEvent) {
        let intent_id = event.intent_id();
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(intent_id).or_default().clone()
        };

        {
            let _serialized = lock.lock().await;
            let result = match &event {
                PaymentEvent::Created(intent) => self.sink.on_intent_created(intent).await,
                PaymentEvent::Processing {
                    intent,
                    observation,
                } => self.sink.on_processing(intent, observation).await,
                PaymentEvent::Confirmed {
                    intent,
                    observation,
                } => self.sink.on_confirmed(intent, observation).await,
                PaymentEvent::Expired(intent) => self.sink.on_expired(intent).await,
                PaymentEvent::Reorg { intent, txid } => self.sink.on_reorg(intent, txid).await,
            };

            if let Err(e) = result {
                logging::log_warning(&format!(
                    "{} callback failed for intent {}: {}",
                    event.name(),
                    intent_id,
                    e
                ));
            }
        }

        // drop the per-intent lock entry once nobody else holds it
        let mut locks = self.locks.lock().await;
        if let Some(entry) = locks.get(&intent_id) {
            if Arc::strong_count(entry) == 2 {
                locks.remove(&intent_id);
            }
        }
    }
}
