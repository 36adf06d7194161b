//! The core verb surface: everything the HTTP adapter (or an embedding
//! application) calls, plus the watcher lifecycle. `PaymentService` is the
//! explicit root context; there are no process-wide singletons.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::application::events::{EventDispatcher, PaymentEvent, PaymentEvents};
use crate::application::watcher::address_book::AddressBook;
use crate::application::watcher::reconciler::Reconciler;
use crate::application::watcher::state_machine::IntentStateMachine;
use crate::application::watcher::Watcher;
use crate::config::{AppConfig, TokenReuse};
use crate::domain::errors::{PayError, PayResult};
use crate::domain::models::{DeltaSource, IntentStatus};
use crate::domain::services::descriptor::DescriptorEngine;
use crate::domain::services::{bip21, token_codec};
use crate::infrastructure::bitcoin::{build_source, ChainSource};
use crate::infrastructure::persistence::entities::{deposit_addresses, payment_intents};
use crate::infrastructure::persistence::repositories::metadata_repository::KEY_DESCRIPTOR_FINGERPRINT;
use crate::infrastructure::persistence::repositories::NewIntent;
use crate::infrastructure::persistence::{DbPool, Repositories, RepositoryFactory};
use crate::utils::logging;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    pub amount_sats: i64,
    #[serde(default)]
    pub required_confs: Option<i32>,
    #[serde(default)]
    pub expires_in_minutes: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub memo: Option<String>,
}

/// What a customer needs to pay: the assigned address and its BIP21 URI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedDetails {
    pub intent_id: i64,
    pub address: String,
    pub bip21: String,
    pub amount_sats: i64,
    pub expires_at: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub url: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub status: String,
    pub amount_sats: i64,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub confs: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_sats: Option<i64>,
}

pub struct PaymentService {
    config: AppConfig,
    repos: Repositories,
    descriptor: DescriptorEngine,
    source: Arc<dyn ChainSource>,
    dispatcher: EventDispatcher,
    watched: AddressBook,
    state: IntentStateMachine,
    reconciler: Reconciler,
    watcher: tokio::sync::Mutex<Option<Watcher>>,
}

impl PaymentService {
    /// Wire the whole core together with the chain backend selected by
    /// configuration. Fails fast on config problems, a broken descriptor,
    /// or a database initialized for a different descriptor.
    pub async fn new(
        config: AppConfig,
        pool: &DbPool,
        sink: Arc<dyn PaymentEvents>,
    ) -> PayResult<Self> {
        let source = build_source(&config)?;
        Self::with_source(config, pool, sink, source).await
    }

    /// Same wiring with a caller-provided chain backend (embedders and the
    /// test suite bring their own).
    pub async fn with_source(
        config: AppConfig,
        pool: &DbPool,
        sink: Arc<dyn PaymentEvents>,
        source: Arc<dyn ChainSource>,
    ) -> PayResult<Self> {
        config.validate().map_err(PayError::Fatal)?;

        let repos = RepositoryFactory::create_repositories(pool);
        let descriptor = DescriptorEngine::parse(&config.pay.descriptor, config.pay.network)?;

        let fingerprint = descriptor.fingerprint();
        match repos.metadata.get(KEY_DESCRIPTOR_FINGERPRINT).await? {
            Some(stored) if stored != fingerprint => {
                return Err(PayError::Fatal(
                    "configured descriptor does not match the one this database was initialized with"
                        .to_string(),
                ));
            }
            Some(_) => {}
            None => {
                repos
                    .metadata
                    .set(KEY_DESCRIPTOR_FINGERPRINT, &fingerprint)
                    .await?;
            }
        }

        let watched = AddressBook::new();
        let dispatcher = EventDispatcher::new(sink);
        let state = IntentStateMachine::new(repos.clone(), dispatcher.clone(), watched.clone());
        let reconciler = Reconciler::new(
            repos.clone(),
            source.clone(),
            watched.clone(),
            state.clone(),
            config.advanced.match_mode,
        );

        Ok(Self {
            config,
            repos,
            descriptor,
            source,
            dispatcher,
            watched,
            state,
            reconciler,
            watcher: tokio::sync::Mutex::new(None),
        })
    }

    // ─── intent verbs ───────────────────────────────────────────────────

    pub async fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> PayResult<payment_intents::Model> {
        if request.amount_sats <= 0 {
            return Err(PayError::Validation("amountSats must be positive".into()));
        }
        let required_confs = request
            .required_confs
            .unwrap_or(self.config.pay.confirmations);
        if required_confs < 1 {
            return Err(PayError::Validation("requiredConfs must be at least 1".into()));
        }
        let expires_in_minutes = request
            .expires_in_minutes
            .unwrap_or(self.config.pay.intent_expiry_minutes);
        if expires_in_minutes <= 0 {
            return Err(PayError::Validation(
                "expiresInMinutes must be positive".into(),
            ));
        }

        let customer_id = if request.customer_id.is_some() || request.email.is_some() {
            let customer = self
                .repos
                .customers
                .upsert(request.customer_id.as_deref(), request.email.as_deref())
                .await?;
            Some(customer.id)
        } else {
            None
        };

        let intent = self
            .repos
            .intents
            .insert(NewIntent {
                amount_sats: request.amount_sats,
                required_confs,
                expires_at: Utc::now() + Duration::minutes(expires_in_minutes),
                customer_id,
                email: request.email,
                memo: request.memo,
            })
            .await?;

        self.dispatcher
            .dispatch(PaymentEvent::Created(intent.clone()))
            .await;
        Ok(intent)
    }

    /// Idempotently attach a deposit address to the intent: the existing
    /// one when present, otherwise the lowest unassigned derivation or a
    /// fresh child at max+1.
    pub async fn ensure_assigned(&self, intent_id: i64) -> PayResult<AssignedDetails> {
        let intent = self.require_intent(intent_id).await?;

        if let Some(address_id) = intent.address_id {
            let address = self
                .repos
                .addresses
                .find(address_id)
                .await?
                .ok_or_else(|| PayError::NotFound(format!("address {}", address_id)))?;
            return Ok(self.assigned_details(&intent, &address));
        }

        match IntentStatus::parse(&intent.status) {
            Some(IntentStatus::Pending) | Some(IntentStatus::Processing) => {}
            _ => {
                return Err(PayError::InvalidState(format!(
                    "cannot assign an address to a {} intent",
                    intent.status
                )))
            }
        }

        for _ in 0..3 {
            let candidate = match self.repos.addresses.lowest_unassigned().await? {
                Some(row) => row,
                None => match self.derive_next().await? {
                    Some(row) => row,
                    // lost a derivation race; re-check the pool
                    None => continue,
                },
            };

            if self
                .repos
                .addresses
                .assign_to_intent(candidate.id, intent.id, Utc::now())
                .await?
            {
                self.watched.insert(&candidate.address, intent.id);
                let intent = self.require_intent(intent_id).await?;
                logging::log_info(&format!(
                    "assigned address {} (index {}) to intent {}",
                    candidate.address, candidate.derivation_index, intent.id
                ));
                return Ok(self.assigned_details(&intent, &candidate));
            }
        }

        Err(PayError::Conflict(
            "address assignment kept racing; try again".to_string(),
        ))
    }

    pub async fn issue_token(
        &self,
        intent_id: i64,
        ttl_secs: Option<i64>,
    ) -> PayResult<IssuedToken> {
        let intent = self.require_intent(intent_id).await?;
        match IntentStatus::parse(&intent.status) {
            Some(IntentStatus::Expired) | Some(IntentStatus::Failed) => {
                return Err(PayError::InvalidState(format!(
                    "cannot issue a magic link for a {} intent",
                    intent.status
                )))
            }
            _ => {}
        }

        let ttl = ttl_secs.unwrap_or(self.config.pay.magic_link_ttl_secs);
        if ttl <= 0 {
            return Err(PayError::Validation("token TTL must be positive".into()));
        }

        let now = Utc::now();
        let token = token_codec::issue(intent.id, &self.config.pay.secret, ttl, now);
        self.repos
            .tokens
            .insert(&token, intent.id, now + Duration::seconds(ttl))
            .await?;

        let url = format!(
            "{}{}/pay/{}",
            self.config.pay.base_url.trim_end_matches('/'),
            self.config.pay.base_path,
            token
        );
        Ok(IssuedToken { url, token })
    }

    /// Verify and consume a magic-link token, returning the intent it
    /// grants access to. Replays before expiry succeed without touching
    /// `consumed_at` (unless single-use mode is on).
    pub async fn redeem_token(&self, token: &str) -> PayResult<i64> {
        let now = Utc::now();
        let _claims = token_codec::decode(token, &self.config.pay.secret, now)?;

        // signature valid but no row: rotated secret or forgery attempt
        let row = self
            .repos
            .tokens
            .find_by_token(token)
            .await?
            .ok_or_else(|| PayError::NotFound("token".to_string()))?;

        if now >= row.expires_at {
            return Err(PayError::Expired("token expired".to_string()));
        }
        if self.config.advanced.token_reuse == TokenReuse::SingleUse && row.consumed {
            return Err(PayError::Expired("token already used".to_string()));
        }

        // sticky: only the first redemption sets consumed_at
        self.repos.tokens.mark_consumed(row.id, now).await?;
        Ok(row.intent_id)
    }

    /// The whole magic-link view: redeem, then reveal the payment details
    /// for exactly that intent.
    pub async fn redeem_magic_link(&self, token: &str) -> PayResult<AssignedDetails> {
        let intent_id = self.redeem_token(token).await?;
        self.ensure_assigned(intent_id).await
    }

    pub async fn get_intent(&self, intent_id: i64) -> PayResult<payment_intents::Model> {
        self.require_intent(intent_id).await
    }

    pub async fn get_status(&self, intent_id: i64) -> PayResult<StatusView> {
        let intent = self.require_intent(intent_id).await?;

        let observation = match intent.address_id {
            Some(address_id) => {
                self.repos
                    .observations
                    .latest_for_address(address_id)
                    .await?
            }
            None => None,
        };

        Ok(StatusView {
            status: intent.status,
            amount_sats: intent.amount_sats,
            expires_at: intent.expires_at,
            confirmed_at: intent.confirmed_at,
            confs: observation.as_ref().map(|o| o.confirmations).unwrap_or(0),
            txid: observation.as_ref().map(|o| o.txid.clone()),
            value_sats: observation.as_ref().map(|o| o.value_sats),
        })
    }

    /// Push-path entry point: reconcile one transaction by id, exactly as
    /// a ZMQ hashtx notification would. Exposed for embedders that feed
    /// their own notification stream.
    pub async fn process_incoming_tx(&self, txid: &str) -> PayResult<()> {
        self.reconciler.process_txid(txid, DeltaSource::Zmq).await
    }

    /// Run one expiry sweep immediately (the scheduler does this every
    /// minute while the watcher runs).
    pub async fn sweep_expired(&self) {
        crate::application::watcher::scheduler::run_expiry_sweep(&self.repos, &self.state).await;
    }

    /// Run one pending-payment poll immediately (the scheduler's
    /// fan-out tick).
    pub async fn poll_pending(&self) {
        let tag = if self.config.rpc.is_some() {
            DeltaSource::RpcPoll
        } else {
            DeltaSource::IndexerPoll
        };
        crate::application::watcher::scheduler::run_pending_poll(&self.repos, &self.reconciler, tag)
            .await;
    }

    /// Force a pull-path reconciliation for one intent right now.
    pub async fn scan_for_payments(&self, intent_id: i64) -> PayResult<()> {
        if !self.watcher_running().await {
            return Err(PayError::Transient("watcher is not running".to_string()));
        }
        let intent = self.require_intent(intent_id).await?;
        self.reconciler
            .scan_intent(&intent, true, DeltaSource::Manual)
            .await
    }

    // ─── watcher lifecycle ──────────────────────────────────────────────

    pub async fn start_watcher(&self) -> PayResult<()> {
        let mut guard = self.watcher.lock().await;
        if guard.is_some() {
            return Err(PayError::InvalidState("watcher already running".into()));
        }

        self.warm_address_pool().await?;

        let watcher = Watcher::start(
            &self.config,
            self.repos.clone(),
            self.reconciler.clone(),
            self.state.clone(),
            self.watched.clone(),
        )
        .await?;
        *guard = Some(watcher);
        Ok(())
    }

    pub async fn stop_watcher(&self) {
        let maybe = self.watcher.lock().await.take();
        if let Some(watcher) = maybe {
            watcher.stop(&self.watched).await;
        }
    }

    pub async fn watcher_running(&self) -> bool {
        self.watcher.lock().await.is_some()
    }

    /// Pre-derive unassigned addresses up to the configured gap limit so
    /// assignment never waits on derivation and operators can import the
    /// look-ahead window into their node's watch wallet.
    pub async fn warm_address_pool(&self) -> PayResult<usize> {
        let gap_limit = self.config.advanced.gap_limit as u64;
        let mut created = 0usize;
        for _ in 0..gap_limit * 2 {
            if self.repos.addresses.count_unassigned().await? >= gap_limit {
                break;
            }
            if self.derive_next().await?.is_some() {
                created += 1;
            }
        }
        if created > 0 {
            logging::log_info(&format!("pre-derived {} deposit addresses", created));
        }
        Ok(created)
    }

    // ─── helpers ────────────────────────────────────────────────────────

    pub fn source(&self) -> &Arc<dyn ChainSource> {
        &self.source
    }

    /// Mount point for the HTTP adapter.
    pub fn base_path(&self) -> &str {
        &self.config.pay.base_path
    }

    async fn require_intent(&self, intent_id: i64) -> PayResult<payment_intents::Model> {
        self.repos
            .intents
            .find(intent_id)
            .await?
            .ok_or_else(|| PayError::NotFound(format!("intent {}", intent_id)))
    }

    /// Derive the next child (max index + 1) and record it unassigned.
    /// Returns None when a concurrent derivation claimed the index first.
    async fn derive_next(&self) -> PayResult<Option<deposit_addresses::Model>> {
        let next_index = self
            .repos
            .addresses
            .max_derivation_index()
            .await?
            .map(|i| i + 1)
            .unwrap_or(0);
        let derived = self.descriptor.derive(next_index as u32)?;
        Ok(self
            .repos
            .addresses
            .insert_derived(&derived.address, next_index, &derived.script_pubkey_hex)
            .await?)
    }

    fn assigned_details(
        &self,
        intent: &payment_intents::Model,
        address: &deposit_addresses::Model,
    ) -> AssignedDetails {
        AssignedDetails {
            intent_id: intent.id,
            address: address.address.clone(),
            bip21: bip21::build_uri(
                &address.address,
                intent.amount_sats,
                None,
                intent.memo.as_deref(),
            ),
            amount_sats: intent.amount_sats,
            expires_at: intent.expires_at,
            status: intent.status.clone(),
        }
    }
}
