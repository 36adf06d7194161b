use std::fmt;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::domain::models::{ObservationDelta, ObservationStatus};
use crate::infrastructure::persistence::entities::tx_observations::{
    ActiveModel, Column, Entity, Model,
};
use crate::infrastructure::persistence::error::{is_unique_violation, DbError};

/// Repository for tx_observations table operations. `(txid, vout)` is the
/// logical key; updates are in place.
#[derive(Clone)]
pub struct ObservationRepository {
    conn: DatabaseConnection,
}

impl fmt::Debug for ObservationRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservationRepository").finish_non_exhaustive()
    }
}

/// Result of an upsert: the row as written plus what the row looked like
/// before, so the caller can tell a fresh sighting from a confirmation
/// bump from a no-op replay.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub row: Model,
    pub previous: Option<PreviousObservation>,
}

#[derive(Debug, Clone)]
pub struct PreviousObservation {
    pub confirmations: i32,
    pub status: ObservationStatus,
}

impl UpsertOutcome {
    pub fn is_new(&self) -> bool {
        self.previous.is_none()
    }

    /// True when this upsert raised the confirmation count.
    pub fn confirmations_grew(&self) -> bool {
        match &self.previous {
            None => true,
            Some(prev) => self.row.confirmations > prev.confirmations,
        }
    }
}

impl ObservationRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Insert or update the observation for one output. Status never moves
    /// downward here; reorg demotion goes through `demote_txid`.
    pub async fn upsert(
        &self,
        address_id: i64,
        script_pubkey_hex: &str,
        delta: &ObservationDelta,
        status: ObservationStatus,
    ) -> Result<UpsertOutcome, DbError> {
        if let Some(existing) = self.find_outpoint(&delta.txid, delta.vout as i32).await? {
            return self.update_existing(existing, delta, status).await;
        }

        let model = ActiveModel {
            txid: Set(delta.txid.clone()),
            vout: Set(delta.vout as i32),
            value_sats: Set(delta.value_sats),
            confirmations: Set(delta.confirmations),
            address_id: Set(address_id),
            script_pubkey_hex: Set(script_pubkey_hex.to_string()),
            status: Set(status.as_str().to_string()),
            seen_at: Set(delta.seen_at),
            updated_at: Set(delta.seen_at),
            ..Default::default()
        };

        match model.insert(&self.conn).await {
            Ok(row) => Ok(UpsertOutcome { row, previous: None }),
            // Lost an insert race on (txid, vout): treat as update
            Err(e) if is_unique_violation(&e) => {
                let existing = self
                    .find_outpoint(&delta.txid, delta.vout as i32)
                    .await?
                    .ok_or_else(|| DbError::Query(e.to_string()))?;
                self.update_existing(existing, delta, status).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_existing(
        &self,
        existing: Model,
        delta: &ObservationDelta,
        status: ObservationStatus,
    ) -> Result<UpsertOutcome, DbError> {
        let previous = PreviousObservation {
            confirmations: existing.confirmations,
            status: ObservationStatus::parse(&existing.status)
                .unwrap_or(ObservationStatus::Mempool),
        };

        // flip status only upward
        let next_status = match (previous.status, status) {
            (ObservationStatus::Confirmed, ObservationStatus::Mempool) => {
                ObservationStatus::Confirmed
            }
            (_, s) => s,
        };

        let mut active: ActiveModel = existing.into();
        active.confirmations = Set(delta.confirmations);
        active.value_sats = Set(delta.value_sats);
        active.status = Set(next_status.as_str().to_string());
        active.updated_at = Set(Utc::now());
        let row = active.update(&self.conn).await?;

        Ok(UpsertOutcome {
            row,
            previous: Some(previous),
        })
    }

    pub async fn find_outpoint(&self, txid: &str, vout: i32) -> Result<Option<Model>, DbError> {
        Ok(Entity::find()
            .filter(Column::Txid.eq(txid))
            .filter(Column::Vout.eq(vout))
            .one(&self.conn)
            .await?)
    }

    pub async fn find_by_txid(&self, txid: &str) -> Result<Vec<Model>, DbError> {
        Ok(Entity::find()
            .filter(Column::Txid.eq(txid))
            .all(&self.conn)
            .await?)
    }

    /// Most recent observation for an address, by seen_at.
    pub async fn latest_for_address(&self, address_id: i64) -> Result<Option<Model>, DbError> {
        Ok(Entity::find()
            .filter(Column::AddressId.eq(address_id))
            .order_by_desc(Column::SeenAt)
            .one(&self.conn)
            .await?)
    }

    pub async fn exists_for_address(&self, address_id: i64) -> Result<bool, DbError> {
        Ok(Entity::find()
            .filter(Column::AddressId.eq(address_id))
            .one(&self.conn)
            .await?
            .is_some())
    }

    /// Reorg demotion: the tx vanished from the chain, so every output of
    /// it drops back to an unconfirmed sighting. Rows are kept.
    pub async fn demote_txid(&self, txid: &str) -> Result<u64, DbError> {
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(ObservationStatus::Mempool.as_str()))
            .col_expr(Column::Confirmations, Expr::value(0))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Txid.eq(txid))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected)
    }
}
