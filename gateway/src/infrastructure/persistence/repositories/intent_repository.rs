use std::fmt;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::domain::models::IntentStatus;
use crate::infrastructure::persistence::entities::payment_intents::{
    ActiveModel, Column, Entity, Model,
};
use crate::infrastructure::persistence::error::DbError;

/// Repository for payment_intents table operations.
///
/// Status transitions are single conditional UPDATE statements filtered on
/// the source state; `rows_affected == 1` is the caller's signal that this
/// call performed the edge (and should emit its event), so re-applying any
/// transition is harmless.
#[derive(Clone)]
pub struct IntentRepository {
    conn: DatabaseConnection,
}

impl fmt::Debug for IntentRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntentRepository").finish_non_exhaustive()
    }
}

/// Fields for a new intent row; status starts at `pending`.
#[derive(Debug, Clone)]
pub struct NewIntent {
    pub amount_sats: i64,
    pub required_confs: i32,
    pub expires_at: DateTime<Utc>,
    pub customer_id: Option<i64>,
    pub email: Option<String>,
    pub memo: Option<String>,
}

impl IntentRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, new: NewIntent) -> Result<Model, DbError> {
        let now = Utc::now();
        let model = ActiveModel {
            amount_sats: Set(new.amount_sats),
            status: Set(IntentStatus::Pending.as_str().to_string()),
            required_confs: Set(new.required_confs),
            expires_at: Set(new.expires_at),
            customer_id: Set(new.customer_id),
            email: Set(new.email),
            memo: Set(new.memo),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        Ok(model.insert(&self.conn).await?)
    }

    pub async fn find(&self, id: i64) -> Result<Option<Model>, DbError> {
        Ok(Entity::find_by_id(id).one(&self.conn).await?)
    }

    pub async fn find_by_address_id(&self, address_id: i64) -> Result<Option<Model>, DbError> {
        Ok(Entity::find()
            .filter(Column::AddressId.eq(address_id))
            .one(&self.conn)
            .await?)
    }

    /// Intents the watcher still cares about, oldest first.
    pub async fn list_open(&self) -> Result<Vec<Model>, DbError> {
        Ok(Entity::find()
            .filter(Column::Status.is_in([
                IntentStatus::Pending.as_str(),
                IntentStatus::Processing.as_str(),
            ]))
            .order_by_asc(Column::CreatedAt)
            .all(&self.conn)
            .await?)
    }

    /// Recently confirmed intents, rechecked on new blocks so a reorg that
    /// drops their transaction is noticed.
    pub async fn list_recently_confirmed(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Model>, DbError> {
        Ok(Entity::find()
            .filter(Column::Status.eq(IntentStatus::Confirmed.as_str()))
            .filter(Column::ConfirmedAt.gte(since))
            .order_by_asc(Column::ConfirmedAt)
            .all(&self.conn)
            .await?)
    }

    /// Pending intents whose deadline has passed.
    pub async fn list_expirable(&self, now: DateTime<Utc>) -> Result<Vec<Model>, DbError> {
        Ok(Entity::find()
            .filter(Column::Status.eq(IntentStatus::Pending.as_str()))
            .filter(Column::ExpiresAt.lte(now))
            .order_by_asc(Column::ExpiresAt)
            .all(&self.conn)
            .await?)
    }

    /// pending → processing (mempool sighting)
    pub async fn mark_processing(&self, id: i64, now: DateTime<Utc>) -> Result<bool, DbError> {
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(IntentStatus::Processing.as_str()))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(IntentStatus::Pending.as_str()))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// pending|processing → confirmed, stamping confirmed_at
    pub async fn mark_confirmed(&self, id: i64, now: DateTime<Utc>) -> Result<bool, DbError> {
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(IntentStatus::Confirmed.as_str()))
            .col_expr(Column::ConfirmedAt, Expr::value(Some(now)))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.is_in([
                IntentStatus::Pending.as_str(),
                IntentStatus::Processing.as_str(),
            ]))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// confirmed → processing (reorg), clearing confirmed_at
    pub async fn mark_reorged(&self, id: i64, now: DateTime<Utc>) -> Result<bool, DbError> {
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(IntentStatus::Processing.as_str()))
            .col_expr(Column::ConfirmedAt, Expr::value(None::<DateTime<Utc>>))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(IntentStatus::Confirmed.as_str()))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// pending → expired; the deadline re-checked inside the statement
    pub async fn mark_expired(&self, id: i64, now: DateTime<Utc>) -> Result<bool, DbError> {
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(IntentStatus::Expired.as_str()))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(IntentStatus::Pending.as_str()))
            .filter(Column::ExpiresAt.lte(now))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected == 1)
    }
}
