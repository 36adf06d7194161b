use std::fmt;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};

use crate::infrastructure::persistence::entities::deposit_addresses::{
    ActiveModel, Column, Entity, Model,
};
use crate::infrastructure::persistence::entities::payment_intents;
use crate::infrastructure::persistence::error::{is_unique_violation, DbError};

/// Repository for deposit_addresses table operations.
#[derive(Clone)]
pub struct AddressRepository {
    conn: DatabaseConnection,
}

impl fmt::Debug for AddressRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressRepository").finish_non_exhaustive()
    }
}

impl AddressRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Record a freshly derived, not-yet-assigned address. Returns None
    /// when a concurrent derivation already claimed the index or address
    /// (unique violation), so the caller can re-check the pool.
    pub async fn insert_derived(
        &self,
        address: &str,
        derivation_index: i32,
        script_pubkey_hex: &str,
    ) -> Result<Option<Model>, DbError> {
        let model = ActiveModel {
            address: Set(address.to_string()),
            derivation_index: Set(derivation_index),
            script_pubkey_hex: Set(script_pubkey_hex.to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        match model.insert(&self.conn).await {
            Ok(row) => Ok(Some(row)),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find(&self, id: i64) -> Result<Option<Model>, DbError> {
        Ok(Entity::find_by_id(id).one(&self.conn).await?)
    }

    pub async fn find_by_address(&self, address: &str) -> Result<Option<Model>, DbError> {
        Ok(Entity::find()
            .filter(Column::Address.eq(address))
            .one(&self.conn)
            .await?)
    }

    /// Unassigned address with the lowest derivation index, if any.
    pub async fn lowest_unassigned(&self) -> Result<Option<Model>, DbError> {
        Ok(Entity::find()
            .filter(Column::IntentId.is_null())
            .order_by_asc(Column::DerivationIndex)
            .one(&self.conn)
            .await?)
    }

    /// Highest derivation index handed out so far; the next fresh
    /// derivation goes at this plus one (gap-free prefix invariant).
    pub async fn max_derivation_index(&self) -> Result<Option<i32>, DbError> {
        let row = Entity::find()
            .select_only()
            .column_as(Column::DerivationIndex.max(), "max_index")
            .into_tuple::<Option<i32>>()
            .one(&self.conn)
            .await?;
        Ok(row.flatten())
    }

    pub async fn count_unassigned(&self) -> Result<u64, DbError> {
        Ok(Entity::find()
            .filter(Column::IntentId.is_null())
            .count(&self.conn)
            .await?)
    }

    /// Bind an address to an intent and denormalize the pointer back onto
    /// the intent row, in one transaction. Returns false when the address
    /// was claimed by a concurrent assignment (derivation race).
    pub async fn assign_to_intent(
        &self,
        address_id: i64,
        intent_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let txn = self.conn.begin().await?;

        let claimed = Entity::update_many()
            .col_expr(Column::IntentId, Expr::value(Some(intent_id)))
            .col_expr(Column::AssignedAt, Expr::value(Some(now)))
            .filter(Column::Id.eq(address_id))
            .filter(Column::IntentId.is_null())
            .exec(&txn)
            .await?;

        if claimed.rows_affected != 1 {
            txn.rollback().await?;
            return Ok(false);
        }

        payment_intents::Entity::update_many()
            .col_expr(payment_intents::Column::AddressId, Expr::value(Some(address_id)))
            .col_expr(payment_intents::Column::UpdatedAt, Expr::value(now))
            .filter(payment_intents::Column::Id.eq(intent_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(true)
    }

    /// All assigned addresses with their owning intent, for watched-set
    /// bootstrap at watcher start.
    pub async fn list_assigned(&self) -> Result<Vec<(String, i64)>, DbError> {
        let rows = Entity::find()
            .filter(Column::IntentId.is_not_null())
            .all(&self.conn)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.intent_id.map(|intent_id| (row.address, intent_id)))
            .collect())
    }
}
