//! The observation reconciler: turns a txid (from ZMQ, a poll, or a
//! forced scan) into per-output observation upserts and hands the deltas
//! to the intent state machine.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;

use crate::application::watcher::address_book::AddressBook;
use crate::application::watcher::state_machine::IntentStateMachine;
use crate::config::MatchMode;
use crate::domain::errors::{PayError, PayResult};
use crate::domain::models::{DeltaSource, IntentStatus, ObservationDelta, ObservationStatus};
use crate::infrastructure::bitcoin::{ChainSource, ChainTx, ChainTxOut, RetryHandler};
use crate::infrastructure::persistence::Repositories;
use crate::utils::logging;

#[derive(Debug, Clone)]
pub struct Reconciler {
    repos: Repositories,
    source: Arc<dyn ChainSource>,
    watched: AddressBook,
    state: IntentStateMachine,
    retry: RetryHandler,
    match_mode: MatchMode,
}

impl Reconciler {
    pub fn new(
        repos: Repositories,
        source: Arc<dyn ChainSource>,
        watched: AddressBook,
        state: IntentStateMachine,
        match_mode: MatchMode,
    ) -> Self {
        Self {
            repos,
            source,
            watched,
            state,
            retry: RetryHandler::new(),
            match_mode,
        }
    }

    /// Reconcile one transaction by id. A backend that does not know the
    /// transaction at all triggers the reorg check instead.
    pub async fn process_txid(&self, txid: &str, source_tag: DeltaSource) -> PayResult<()> {
        let fetched = self
            .retry
            .execute("fetch_transaction", || self.source.fetch_transaction(txid))
            .await?;

        match fetched {
            Some(tx) => self.apply_transaction(&tx, source_tag).await,
            None => self.handle_missing_tx(txid).await,
        }
    }

    /// Match every output against the watched-address set. Outputs fail
    /// independently: a bad one is logged and skipped, the rest of the
    /// transaction still lands.
    async fn apply_transaction(&self, tx: &ChainTx, source_tag: DeltaSource) -> PayResult<()> {
        let totals = self.per_address_totals(tx);

        for out in &tx.outputs {
            let Some(address) = out.address.as_deref() else {
                continue;
            };
            let Some(intent_id) = self.watched.intent_for(address) else {
                continue;
            };
            let address_total = totals.get(address).copied().unwrap_or(out.value_sats);

            if let Err(e) = self
                .apply_output(tx, out, address, intent_id, address_total, source_tag)
                .await
            {
                logging::log_warning(&format!(
                    "skipping output {}:{} for {}: {}",
                    tx.txid, out.vout, address, e
                ));
            }
        }
        Ok(())
    }

    async fn apply_output(
        &self,
        tx: &ChainTx,
        out: &ChainTxOut,
        address: &str,
        intent_id: i64,
        address_total: i64,
        source_tag: DeltaSource,
    ) -> PayResult<()> {
        let intent = self
            .repos
            .intents
            .find(intent_id)
            .await?
            .ok_or_else(|| PayError::NotFound(format!("intent {}", intent_id)))?;
        let address_row = self
            .repos
            .addresses
            .find_by_address(address)
            .await?
            .ok_or_else(|| PayError::NotFound(format!("address {}", address)))?;

        let delta = ObservationDelta {
            txid: tx.txid.clone(),
            vout: out.vout,
            value_sats: out.value_sats,
            confirmations: tx.confirmations,
            seen_at: Utc::now(),
            source: source_tag,
        };

        let status = if tx.confirmations >= intent.required_confs {
            ObservationStatus::Confirmed
        } else {
            ObservationStatus::Mempool
        };

        let outcome = self
            .repos
            .observations
            .upsert(address_row.id, &out.script_pubkey_hex, &delta, status)
            .await?;

        // only fresh sightings and upward confirmation changes reach the
        // state machine; replays are absorbed here
        if outcome.is_new() || outcome.confirmations_grew() {
            let amount_met = match self.match_mode {
                MatchMode::FirstOutputMeets => out.value_sats >= intent.amount_sats,
                MatchMode::SumOfOutputsMeets => address_total >= intent.amount_sats,
            };
            self.state
                .apply_observation(&intent, &outcome, amount_met)
                .await?;
        }
        Ok(())
    }

    /// "No such mempool or blockchain transaction": demote any confirmed
    /// intent that was resting on it.
    async fn handle_missing_tx(&self, txid: &str) -> PayResult<()> {
        let observations = self.repos.observations.find_by_txid(txid).await?;
        if observations.is_empty() {
            logging::log_debug(&format!("tx {} unknown to backend and untracked", txid));
            return Ok(());
        }

        for obs in observations {
            let Some(address_row) = self.repos.addresses.find(obs.address_id).await? else {
                continue;
            };
            let Some(intent_id) = address_row.intent_id else {
                continue;
            };
            let Some(intent) = self.repos.intents.find(intent_id).await? else {
                continue;
            };

            match IntentStatus::parse(&intent.status) {
                Some(IntentStatus::Confirmed) => {
                    self.state.apply_reorg(&intent, txid).await?;
                }
                _ => logging::log_debug(&format!(
                    "tx {} vanished while intent {} is {}; leaving for the poll",
                    txid, intent.id, intent.status
                )),
            }
        }
        Ok(())
    }

    /// Pull-path reconciliation for one intent: refresh the known
    /// observation if there is one, otherwise look the address up by
    /// query. `thorough` is passed through to the backend for forced
    /// scans.
    pub async fn scan_intent(
        &self,
        intent: &crate::infrastructure::persistence::entities::payment_intents::Model,
        thorough: bool,
        source_tag: DeltaSource,
    ) -> PayResult<()> {
        let Some(address_id) = intent.address_id else {
            // nothing derivable without an address
            return Ok(());
        };

        if let Some(observation) = self.repos.observations.latest_for_address(address_id).await? {
            return self.process_txid(&observation.txid, source_tag).await;
        }

        let Some(address_row) = self.repos.addresses.find(address_id).await? else {
            return Err(PayError::NotFound(format!("address row {}", address_id)));
        };

        let outputs = self
            .retry
            .execute("address_outputs", || {
                self.source.address_outputs(&address_row.address, thorough)
            })
            .await?;

        let mut seen_txids = HashSet::new();
        for output in outputs {
            if seen_txids.insert(output.txid.clone()) {
                if let Err(e) = self.process_txid(&output.txid, source_tag).await {
                    logging::log_warning(&format!(
                        "scan of intent {} failed on tx {}: {}",
                        intent.id, output.txid, e
                    ));
                }
            }
        }
        Ok(())
    }

    /// Confirmation-growth refresh: re-fetch the tracked transaction of
    /// every open intent (driven by hashblock pushes). Recently confirmed
    /// intents are rechecked too; a backend that has forgotten their
    /// transaction triggers the reorg edge.
    pub async fn refresh_tracked(&self, source_tag: DeltaSource) -> PayResult<()> {
        let mut intents = self.repos.intents.list_open().await?;
        intents.extend(
            self.repos
                .intents
                .list_recently_confirmed(Utc::now() - chrono::Duration::hours(24))
                .await?,
        );
        for intent in intents {
            let Some(address_id) = intent.address_id else {
                continue;
            };
            if let Some(observation) =
                self.repos.observations.latest_for_address(address_id).await?
            {
                if let Err(e) = self.process_txid(&observation.txid, source_tag).await {
                    logging::log_warning(&format!(
                        "refresh of intent {} (tx {}) failed: {}",
                        intent.id, observation.txid, e
                    ));
                }
            }
        }
        Ok(())
    }

    fn per_address_totals(&self, tx: &ChainTx) -> HashMap<String, i64> {
        let mut totals: HashMap<String, i64> = HashMap::new();
        if self.match_mode == MatchMode::SumOfOutputsMeets {
            for out in &tx.outputs {
                if let Some(address) = &out.address {
                    *totals.entry(address.clone()).or_insert(0) += out.value_sats;
                }
            }
        }
        totals
    }
}
