//! The intent state machine: applies observation deltas as the single
//! conditional storage update that defines each transition boundary, and
//! emits the matching event only when that update actually changed a row.

use chrono::Utc;

use crate::application::events::{EventDispatcher, PaymentEvent};
use crate::application::watcher::address_book::AddressBook;
use crate::domain::errors::{PayError, PayResult};
use crate::domain::models::IntentStatus;
use crate::infrastructure::persistence::entities::payment_intents;
use crate::infrastructure::persistence::repositories::UpsertOutcome;
use crate::infrastructure::persistence::Repositories;
use crate::utils::logging;

/// Upward edges an observation can propose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposedEdge {
    ToProcessing,
    ToConfirmed,
}

/// Pure transition decision. `confirmations`/`required` come from the
/// observation; `amount_met` is the value guard computed by the
/// reconciler under the configured match mode.
pub fn plan_transition(
    status: IntentStatus,
    confirmations: i32,
    required: i32,
    amount_met: bool,
) -> Option<ProposedEdge> {
    match status {
        IntentStatus::Pending | IntentStatus::Processing => {
            if confirmations >= required && amount_met {
                Some(ProposedEdge::ToConfirmed)
            } else if status == IntentStatus::Pending {
                Some(ProposedEdge::ToProcessing)
            } else {
                None
            }
        }
        // expired/failed take nothing; confirmed only moves via reorg
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct IntentStateMachine {
    repos: Repositories,
    dispatcher: EventDispatcher,
    watched: AddressBook,
}

impl IntentStateMachine {
    pub fn new(repos: Repositories, dispatcher: EventDispatcher, watched: AddressBook) -> Self {
        Self {
            repos,
            dispatcher,
            watched,
        }
    }

    /// Apply one observation delta to its intent.
    pub async fn apply_observation(
        &self,
        intent: &payment_intents::Model,
        outcome: &UpsertOutcome,
        amount_met: bool,
    ) -> PayResult<()> {
        let status = IntentStatus::parse(&intent.status)
            .ok_or_else(|| PayError::Fatal(format!("unknown intent status {}", intent.status)))?;

        let edge = plan_transition(
            status,
            outcome.row.confirmations,
            intent.required_confs,
            amount_met,
        );

        let now = Utc::now();
        match edge {
            Some(ProposedEdge::ToConfirmed) => {
                if self.repos.intents.mark_confirmed(intent.id, now).await? {
                    let updated = self.reload(intent.id).await?;
                    // a settled intent no longer needs live watching
                    if let Some(address) = self.address_of(&updated).await? {
                        self.watched.remove(&address);
                    }
                    logging::log_info(&format!(
                        "intent {} confirmed by {}:{} ({} sats, {} confs)",
                        intent.id,
                        outcome.row.txid,
                        outcome.row.vout,
                        outcome.row.value_sats,
                        outcome.row.confirmations
                    ));
                    self.dispatcher
                        .dispatch(PaymentEvent::Confirmed {
                            intent: updated,
                            observation: outcome.row.clone(),
                        })
                        .await;
                }
            }
            Some(ProposedEdge::ToProcessing) => {
                if self.repos.intents.mark_processing(intent.id, now).await? {
                    let updated = self.reload(intent.id).await?;
                    logging::log_info(&format!(
                        "intent {} processing: saw {}:{} ({} sats)",
                        intent.id, outcome.row.txid, outcome.row.vout, outcome.row.value_sats
                    ));
                    self.dispatcher
                        .dispatch(PaymentEvent::Processing {
                            intent: updated,
                            observation: outcome.row.clone(),
                        })
                        .await;
                }
            }
            None => {}
        }
        Ok(())
    }

    /// Reorg edge: the chain no longer knows the confirming transaction.
    /// The observation rows are demoted in place and the intent drops back
    /// to processing; the address goes back under watch.
    pub async fn apply_reorg(
        &self,
        intent: &payment_intents::Model,
        txid: &str,
    ) -> PayResult<()> {
        self.repos.observations.demote_txid(txid).await?;

        if self.repos.intents.mark_reorged(intent.id, Utc::now()).await? {
            let updated = self.reload(intent.id).await?;
            if let Some(address) = self.address_of(&updated).await? {
                self.watched.insert(&address, updated.id);
            }
            logging::log_warning(&format!(
                "reorg: intent {} demoted confirmed → processing (tx {} vanished)",
                intent.id, txid
            ));
            self.dispatcher
                .dispatch(PaymentEvent::Reorg {
                    intent: updated,
                    txid: txid.to_string(),
                })
                .await;
        }
        Ok(())
    }

    /// Expiry sweep edge for a single pending intent.
    pub async fn apply_expiry(&self, intent: &payment_intents::Model) -> PayResult<()> {
        // an intent with any sighting is left for the observation path
        if let Some(address_id) = intent.address_id {
            if self.repos.observations.exists_for_address(address_id).await? {
                return Ok(());
            }
        }

        if self.repos.intents.mark_expired(intent.id, Utc::now()).await? {
            let updated = self.reload(intent.id).await?;
            if let Some(address) = self.address_of(&updated).await? {
                self.watched.remove(&address);
            }
            logging::log_info(&format!("intent {} expired", intent.id));
            self.dispatcher.dispatch(PaymentEvent::Expired(updated)).await;
        }
        Ok(())
    }

    async fn reload(&self, intent_id: i64) -> PayResult<payment_intents::Model> {
        self.repos
            .intents
            .find(intent_id)
            .await?
            .ok_or_else(|| PayError::NotFound(format!("intent {}", intent_id)))
    }

    async fn address_of(
        &self,
        intent: &payment_intents::Model,
    ) -> PayResult<Option<String>> {
        match intent.address_id {
            Some(address_id) => Ok(self
                .repos
                .addresses
                .find(address_id)
                .await?
                .map(|row| row.address)),
            None => Ok(None),
        }
    }
}
