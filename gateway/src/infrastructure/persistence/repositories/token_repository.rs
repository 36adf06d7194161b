use std::fmt;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::infrastructure::persistence::entities::magic_link_tokens::{
    ActiveModel, Column, Entity, Model,
};
use crate::infrastructure::persistence::error::DbError;

/// Repository for magic_link_tokens table operations.
#[derive(Clone)]
pub struct TokenRepository {
    conn: DatabaseConnection,
}

impl fmt::Debug for TokenRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRepository").finish_non_exhaustive()
    }
}

impl TokenRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn insert(
        &self,
        token: &str,
        intent_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<Model, DbError> {
        let model = ActiveModel {
            token: Set(token.to_string()),
            intent_id: Set(intent_id),
            consumed: Set(false),
            expires_at: Set(expires_at),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        Ok(model.insert(&self.conn).await?)
    }

    pub async fn find_by_token(&self, token: &str) -> Result<Option<Model>, DbError> {
        Ok(Entity::find()
            .filter(Column::Token.eq(token))
            .one(&self.conn)
            .await?)
    }

    /// Flip `consumed` exactly once; replays leave consumed_at untouched.
    pub async fn mark_consumed(&self, id: i64, now: DateTime<Utc>) -> Result<bool, DbError> {
        let result = Entity::update_many()
            .col_expr(Column::Consumed, Expr::value(true))
            .col_expr(Column::ConsumedAt, Expr::value(Some(now)))
            .filter(Column::Id.eq(id))
            .filter(Column::Consumed.eq(false))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected == 1)
    }
}
