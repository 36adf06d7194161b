use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tx_observations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(column_type = "Text")]
    pub txid: String,
    pub vout: i32,
    pub value_sats: i64,
    pub confirmations: i32,
    pub address_id: i64,
    #[sea_orm(column_type = "Text")]
    pub script_pubkey_hex: String,
    #[sea_orm(column_type = "Text")]
    pub status: String,
    pub seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
