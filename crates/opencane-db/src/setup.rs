//! Database setup and initialization, mirroring the teacher's
//! `setup_database`/`setup_test_database` pair.

use std::path::Path;

use opencane_core::ports::StoreError;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};

use crate::schema::create_schema;

fn storage_err(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Opens (creating if missing) the `SQLite` database at `db_path` and
/// ensures the full schema exists.
pub async fn setup_database(db_path: &Path) -> Result<SqlitePool, StoreError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| StoreError::Backend(format!("failed to create {}: {e}", parent.display())))?;
    }

    let pool = SqlitePool::connect_with(
        SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true),
    )
    .await
    .map_err(storage_err)?;

    create_schema(&pool).await?;
    tracing::debug!(path = %db_path.display(), "opened database and ensured schema");
    Ok(pool)
}

/// An in-memory database with the full production schema, for tests.
#[cfg(any(test, feature = "test-utils"))]
pub async fn setup_test_database() -> Result<SqlitePool, StoreError> {
    let pool = SqlitePool::connect("sqlite::memory:").await.map_err(storage_err)?;
    create_schema(&pool).await?;
    Ok(pool)
}
