use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // customers first: payment_intents.customer_id points at it
        manager
            .create_table(
                Table::create()
                    .table(Customers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Customers::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Customers::CustomerRef).text().null())
                    .col(ColumnDef::new(Customers::Email).text().null())
                    .col(
                        ColumnDef::new(Customers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Customers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_customers_email")
                    .table(Customers::Table)
                    .col(Customers::Email)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PaymentIntents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PaymentIntents::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PaymentIntents::AmountSats)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentIntents::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(PaymentIntents::AddressId).big_integer().null())
                    .col(
                        ColumnDef::new(PaymentIntents::RequiredConfs)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(PaymentIntents::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentIntents::ConfirmedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(PaymentIntents::CustomerId).big_integer().null())
                    .col(ColumnDef::new(PaymentIntents::Email).text().null())
                    .col(ColumnDef::new(PaymentIntents::Memo).text().null())
                    .col(
                        ColumnDef::new(PaymentIntents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentIntents::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_payment_intents_status")
                    .table(PaymentIntents::Table)
                    .col(PaymentIntents::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_payment_intents_expires_at")
                    .table(PaymentIntents::Table)
                    .col(PaymentIntents::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_payment_intents_customer_id")
                    .table(PaymentIntents::Table)
                    .col(PaymentIntents::CustomerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_payment_intents_email")
                    .table(PaymentIntents::Table)
                    .col(PaymentIntents::Email)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DepositAddresses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DepositAddresses::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DepositAddresses::Address).text().not_null())
                    .col(
                        ColumnDef::new(DepositAddresses::DerivationIndex)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DepositAddresses::ScriptPubkeyHex)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DepositAddresses::IntentId).big_integer().null())
                    .col(
                        ColumnDef::new(DepositAddresses::AssignedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DepositAddresses::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_deposit_addresses_address")
                    .table(DepositAddresses::Table)
                    .col(DepositAddresses::Address)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_deposit_addresses_derivation_index")
                    .table(DepositAddresses::Table)
                    .col(DepositAddresses::DerivationIndex)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TxObservations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TxObservations::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TxObservations::Txid).string_len(64).not_null())
                    .col(ColumnDef::new(TxObservations::Vout).integer().not_null())
                    .col(
                        ColumnDef::new(TxObservations::ValueSats)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TxObservations::Confirmations)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(TxObservations::AddressId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TxObservations::ScriptPubkeyHex)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TxObservations::Status)
                            .string_len(16)
                            .not_null()
                            .default("mempool"),
                    )
                    .col(
                        ColumnDef::new(TxObservations::SeenAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TxObservations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tx_observations_outpoint")
                    .table(TxObservations::Table)
                    .col(TxObservations::Txid)
                    .col(TxObservations::Vout)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tx_observations_address_id")
                    .table(TxObservations::Table)
                    .col(TxObservations::AddressId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MagicLinkTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MagicLinkTokens::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MagicLinkTokens::Token).text().not_null())
                    .col(
                        ColumnDef::new(MagicLinkTokens::IntentId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MagicLinkTokens::Consumed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(MagicLinkTokens::ConsumedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MagicLinkTokens::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MagicLinkTokens::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_magic_link_tokens_token")
                    .table(MagicLinkTokens::Table)
                    .col(MagicLinkTokens::Token)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SystemMetadata::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SystemMetadata::Key)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SystemMetadata::Value).text().not_null())
                    .col(
                        ColumnDef::new(SystemMetadata::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SystemMetadata::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MagicLinkTokens::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TxObservations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DepositAddresses::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PaymentIntents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Customers::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum PaymentIntents {
    Table,
    Id,
    AmountSats,
    Status,
    AddressId,
    RequiredConfs,
    ExpiresAt,
    ConfirmedAt,
    CustomerId,
    Email,
    Memo,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum DepositAddresses {
    Table,
    Id,
    Address,
    DerivationIndex,
    ScriptPubkeyHex,
    IntentId,
    AssignedAt,
    CreatedAt,
}

#[derive(Iden)]
enum TxObservations {
    Table,
    Id,
    Txid,
    Vout,
    ValueSats,
    Confirmations,
    AddressId,
    ScriptPubkeyHex,
    Status,
    SeenAt,
    UpdatedAt,
}

#[derive(Iden)]
enum MagicLinkTokens {
    Table,
    Id,
    Token,
    IntentId,
    Consumed,
    ConsumedAt,
    ExpiresAt,
    CreatedAt,
}

#[derive(Iden)]
enum Customers {
    Table,
    Id,
    CustomerRef,
    Email,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum SystemMetadata {
    Table,
    Key,
    Value,
    UpdatedAt,
}
