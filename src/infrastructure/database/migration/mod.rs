//! Database migrations

use sea_orm_migration::prelude::*;

mod m20250115_000001_create_catalog;
mod m20250115_000002_create_audit_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250115_000001_create_catalog::Migration),
            Box::new(m20250115_000002_create_audit_tables::Migration),
        ]
    }
}
