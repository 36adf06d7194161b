use std::fmt;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};

use crate::infrastructure::persistence::entities::system_metadata::{ActiveModel, Entity};
use crate::infrastructure::persistence::error::{is_unique_violation, DbError};

/// Well-known metadata keys
pub const KEY_DESCRIPTOR_FINGERPRINT: &str = "descriptor_fingerprint";
pub const KEY_NEXT_SCAN_HEIGHT: &str = "next_scan_height";
pub const KEY_PLANS_DIGEST: &str = "plans_digest";

/// Repository for the system_metadata key/value table.
#[derive(Clone)]
pub struct MetadataRepository {
    conn: DatabaseConnection,
}

impl fmt::Debug for MetadataRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataRepository").finish_non_exhaustive()
    }
}

impl MetadataRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, DbError> {
        Ok(Entity::find_by_id(key)
            .one(&self.conn)
            .await?
            .map(|row| row.value))
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), DbError> {
        let model = ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            updated_at: Set(Utc::now()),
        };
        match model.clone().insert(&self.conn).await {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                model.update(&self.conn).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
