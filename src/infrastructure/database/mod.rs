//! Catalog database infrastructure using SeaORM

use sea_orm::{ConnectOptions, ConnectionTrait, Database as SeaDatabase, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod entities;
pub mod migration;

/// Database wrapper for the archiver catalog
pub struct Database {
    conn: DatabaseConnection,
}

impl Database {
    /// Open the catalog at the given path, creating it and applying
    /// migrations on first use
    pub async fn open(path: &Path) -> Result<Self, DbErr> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DbErr::Custom(format!("Failed to create directory: {}", e)))?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", path.display());

        let mut opt = ConnectOptions::new(db_url);
        opt.max_connections(10)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(8))
            .idle_timeout(Duration::from_secs(8))
            .sqlx_logging(false); // We'll use tracing instead

        let conn = SeaDatabase::connect(opt).await?;

        // Committed writes must survive a crash, so WAL with synchronous=FULL
        use sea_orm::Statement;
        for pragma in [
            "PRAGMA journal_mode=WAL",
            "PRAGMA synchronous=FULL",
            "PRAGMA foreign_keys=ON",
            "PRAGMA temp_store=MEMORY",
        ] {
            let _ = conn
                .execute(Statement::from_string(
                    sea_orm::DatabaseBackend::Sqlite,
                    pragma,
                ))
                .await;
        }

        migration::Migrator::up(&conn, None).await?;

        info!("Opened catalog database at {:?}", path);

        Ok(Self { conn })
    }

    /// Get the underlying connection
    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Close the database connection
    pub async fn close(self) -> Result<(), DbErr> {
        self.conn.close().await
    }
}
