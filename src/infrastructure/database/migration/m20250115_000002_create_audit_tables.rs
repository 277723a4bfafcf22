//! Create the processing audit, attempt and reconciliation tables

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProcessingAudit::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProcessingAudit::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProcessingAudit::ContentHash)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProcessingAudit::Filename).text().not_null())
                    .col(
                        ColumnDef::new(ProcessingAudit::OriginalPath)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProcessingAudit::DiscoveredAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProcessingAudit::CurrentStatus)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProcessingAudit::AttemptCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ProcessingAudit::LastAttemptAt).timestamp())
                    .col(ColumnDef::new(ProcessingAudit::LastErrorKind).text())
                    .col(ColumnDef::new(ProcessingAudit::LastErrorMessage).text())
                    .col(ColumnDef::new(ProcessingAudit::FinalDestination).text())
                    .col(ColumnDef::new(ProcessingAudit::AccessKey).text())
                    .col(ColumnDef::new(ProcessingAudit::IssuerId).integer())
                    .col(ColumnDef::new(ProcessingAudit::CompletedAt).timestamp())
                    .col(ColumnDef::new(ProcessingAudit::TotalDurationMs).big_integer())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_audit_hash")
                    .table(ProcessingAudit::Table)
                    .col(ProcessingAudit::ContentHash)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_audit_status")
                    .table(ProcessingAudit::Table)
                    .col(ProcessingAudit::CurrentStatus)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_audit_last_attempt")
                    .table(ProcessingAudit::Table)
                    .col(ProcessingAudit::LastAttemptAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProcessingAttempts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProcessingAttempts::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProcessingAttempts::AuditId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProcessingAttempts::AttemptNumber)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProcessingAttempts::Status).text().not_null())
                    .col(ColumnDef::new(ProcessingAttempts::ErrorKind).text())
                    .col(ColumnDef::new(ProcessingAttempts::ErrorMessage).text())
                    .col(ColumnDef::new(ProcessingAttempts::StackTrace).text())
                    .col(
                        ColumnDef::new(ProcessingAttempts::DurationMs)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProcessingAttempts::AttemptedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_attempts_audit_id")
                            .from(ProcessingAttempts::Table, ProcessingAttempts::AuditId)
                            .to(ProcessingAudit::Table, ProcessingAudit::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_attempts_audit_id")
                    .table(ProcessingAttempts::Table)
                    .col(ProcessingAttempts::AuditId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ReconciliationLog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReconciliationLog::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationLog::RunAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationLog::FilesChecked)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationLog::IssuesFound)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationLog::IssuesFixed)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReconciliationLog::Details).text().not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ReconciliationLog::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProcessingAttempts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProcessingAudit::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProcessingAudit {
    Table,
    Id,
    ContentHash,
    Filename,
    OriginalPath,
    DiscoveredAt,
    CurrentStatus,
    AttemptCount,
    LastAttemptAt,
    LastErrorKind,
    LastErrorMessage,
    FinalDestination,
    AccessKey,
    IssuerId,
    CompletedAt,
    TotalDurationMs,
}

#[derive(DeriveIden)]
enum ProcessingAttempts {
    Table,
    Id,
    AuditId,
    AttemptNumber,
    Status,
    ErrorKind,
    ErrorMessage,
    StackTrace,
    DurationMs,
    AttemptedAt,
}

#[derive(DeriveIden)]
enum ReconciliationLog {
    Table,
    Id,
    RunAt,
    FilesChecked,
    IssuesFound,
    IssuesFixed,
    Details,
}
