//! Create the issuer and document catalog tables

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Issuers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Issuers::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Issuers::TaxId)
                            .text()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Issuers::Name).text().not_null())
                    .col(ColumnDef::new(Issuers::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Issuers::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Documents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Documents::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Documents::AccessKey)
                            .text()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Documents::ContentHash)
                            .text()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Documents::IssuerId).integer().not_null())
                    .col(ColumnDef::new(Documents::ProcessedDate).date().not_null())
                    .col(ColumnDef::new(Documents::EmissionDate).date().not_null())
                    .col(ColumnDef::new(Documents::Kind).text().not_null())
                    .col(
                        ColumnDef::new(Documents::FinalDestination)
                            .text()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_documents_issuer_id")
                            .from(Documents::Table, Documents::IssuerId)
                            .to(Issuers::Table, Issuers::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_documents_issuer_id")
                    .table(Documents::Table)
                    .col(Documents::IssuerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_documents_emission_date")
                    .table(Documents::Table)
                    .col(Documents::EmissionDate)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Documents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Issuers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Issuers {
    Table,
    Id,
    TaxId,
    Name,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Documents {
    Table,
    Id,
    AccessKey,
    ContentHash,
    IssuerId,
    ProcessedDate,
    EmissionDate,
    Kind,
    FinalDestination,
}
