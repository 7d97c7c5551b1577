//! # SQLite database methods
//!
//! "Low-level" SQLite interactions, kept as plain functions that accept a `&mut SqliteConnection`. Callers obtain
//! a connection from a pool, or open a transaction and pass `&mut *tx` when several calls must commit as one
//! atomic unit. Nothing outside the [`SqliteDatabase`](super::SqliteDatabase) impl should need these directly.
use std::env;

use log::info;
use sqlx::{
    migrate,
    migrate::{MigrateDatabase, MigrateError},
    sqlite::SqlitePoolOptions,
    Error as SqlxError,
    Sqlite,
    SqlitePool,
};

pub mod accounts;
pub mod codes;
pub mod orders;
pub mod responses;

const SQLITE_DB_URL: &str = "sqlite://data/taskpay.db";

pub fn db_url() -> String {
    let result = env::var("TASKPAY_DATABASE_URL").unwrap_or_else(|_| {
        info!("TASKPAY_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}

pub async fn create_database_if_missing(url: &str) -> Result<(), SqlxError> {
    if !Sqlite::database_exists(url).await? {
        Sqlite::create_database(url).await?;
        info!("Created Sqlite database {url}");
    }
    Ok(())
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), MigrateError> {
    migrate!("./migrations").run(pool).await?;
    info!("🗃️ Migrations complete");
    Ok(())
}
