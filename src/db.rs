//! SQLite connection setup and embedded schema migrations.

use anyhow::{Context, Result};
use sqlx::{
    SqlitePool,
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;

/// Schema for `products` and `content_objects`, embedded at compile time.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Open the metadata pool, creating the database file (and its parent
/// directory) when missing. Fails fast if the database is unreachable.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("parsing database url `{}`", database_url))?
        .create_if_missing(true);

    let db_path = options.get_filename();
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
            tracing::info!("Created missing directory {}", parent.display());
        }
    }
    tracing::debug!("Interpreted SQLite path => {}", db_path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("connecting to {}", database_url))?;

    Ok(pool)
}

/// Apply all pending migrations.
pub async fn run_migrations(db: &SqlitePool) -> Result<()> {
    tracing::info!("Running {} migrations...", MIGRATOR.iter().count());
    MIGRATOR.run(db).await.context("applying migrations")?;
    Ok(())
}
