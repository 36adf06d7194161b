use std::fmt;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::infrastructure::persistence::entities::customers::{ActiveModel, Column, Entity, Model};
use crate::infrastructure::persistence::error::DbError;

/// Repository for the customers table. This is the optional storage
/// capability: the verbs only reach for it when an intent carries an
/// email or customer reference.
#[derive(Clone)]
pub struct CustomerRepository {
    conn: DatabaseConnection,
}

impl fmt::Debug for CustomerRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomerRepository").finish_non_exhaustive()
    }
}

impl CustomerRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Find by external reference (preferred) or email, creating the row
    /// if neither matches.
    pub async fn upsert(
        &self,
        customer_ref: Option<&str>,
        email: Option<&str>,
    ) -> Result<Model, DbError> {
        if let Some(reference) = customer_ref {
            if let Some(existing) = Entity::find()
                .filter(Column::CustomerRef.eq(reference))
                .one(&self.conn)
                .await?
            {
                return self.refresh_email(existing, email).await;
            }
        }
        if let Some(email_addr) = email {
            if let Some(existing) = Entity::find()
                .filter(Column::Email.eq(email_addr))
                .one(&self.conn)
                .await?
            {
                return Ok(existing);
            }
        }

        let now = Utc::now();
        let model = ActiveModel {
            customer_ref: Set(customer_ref.map(String::from)),
            email: Set(email.map(String::from)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        Ok(model.insert(&self.conn).await?)
    }

    async fn refresh_email(
        &self,
        existing: Model,
        email: Option<&str>,
    ) -> Result<Model, DbError> {
        match email {
            Some(new_email) if existing.email.as_deref() != Some(new_email) => {
                let mut active: ActiveModel = existing.into();
                active.email = Set(Some(new_email.to_string()));
                active.updated_at = Set(Utc::now());
                Ok(active.update(&self.conn).await?)
            }
            _ => Ok(existing),
        }
    }
}
