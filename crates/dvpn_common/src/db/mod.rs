use std::{path::Path, str::FromStr};

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use tracing::info;

pub mod models;

// helper for easier migration handling with a custom `migration` folder location
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoId;
pub type Id = i64;

/// Opens (creating if necessary) and migrates the session database. Returns DB pool object.
pub async fn init_db(path: &Path) -> Result<SqlitePool, sqlx::Error> {
    info!("Opening the database at {}", path.display());
    let opts = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);
    let pool = SqlitePool::connect_with(opts).await?;

    info!("Migrating database models");
    MIGRATOR.run(&pool).await?;

    Ok(pool)
}

/// In-memory database with migrations applied.
///
/// Limited to a single connection since every SQLite in-memory connection opens a separate database.
pub async fn setup_memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await?;
    MIGRATOR.run(&pool).await?;

    Ok(pool)
}
