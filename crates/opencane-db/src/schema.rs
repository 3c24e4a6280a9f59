//! Schema creation for the nine logical tables (spec §6.3), plus a
//! `schema_version` pragma table for future migrations. Mirrors the
//! teacher's `create_schema`: every statement is `IF NOT EXISTS`, safe to
//! call on every startup.

use opencane_core::ports::StoreError;
use sqlx::SqlitePool;

const CURRENT_SCHEMA_VERSION: i64 = 1;

pub async fn create_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(storage_err)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS device_sessions (
            device_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            state TEXT NOT NULL,
            last_recv_seq INTEGER NOT NULL DEFAULT 0,
            next_outbound_seq INTEGER NOT NULL DEFAULT 0,
            last_seen_at TEXT NOT NULL,
            PRIMARY KEY (device_id, session_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(storage_err)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lifelog_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            payload TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(storage_err)?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_lifelog_events_session ON lifelog_events(session_id, recorded_at)")
        .execute(pool)
        .await
        .map_err(storage_err)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lifelog_images (
            job_id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            dhash INTEGER NOT NULL,
            asset_uri TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(storage_err)?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_lifelog_images_session ON lifelog_images(session_id, recorded_at)")
        .execute(pool)
        .await
        .map_err(storage_err)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lifelog_contexts (
            job_id TEXT PRIMARY KEY REFERENCES lifelog_images(job_id) ON DELETE CASCADE,
            session_id TEXT NOT NULL,
            summary TEXT NOT NULL,
            structured TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(storage_err)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS digital_tasks (
            task_id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            device_id TEXT NOT NULL,
            goal TEXT NOT NULL,
            status TEXT NOT NULL,
            steps TEXT NOT NULL DEFAULT '[]',
            result TEXT,
            error TEXT,
            timeout_deadline TEXT,
            notify INTEGER NOT NULL DEFAULT 1,
            speak INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(storage_err)?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_digital_tasks_device ON digital_tasks(device_id, status)")
        .execute(pool)
        .await
        .map_err(storage_err)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS digital_task_push_queue (
            push_id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL,
            task_id TEXT NOT NULL,
            status TEXT NOT NULL,
            message TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            next_attempt_at TEXT NOT NULL,
            sent INTEGER NOT NULL DEFAULT 0,
            UNIQUE (device_id, task_id, status)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(storage_err)?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_task_push_due ON digital_task_push_queue(sent, next_attempt_at)")
        .execute(pool)
        .await
        .map_err(storage_err)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS device_operations (
            operation_id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL,
            command_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            status TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            next_attempt_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(storage_err)?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_device_operations_device ON device_operations(device_id)")
        .execute(pool)
        .await
        .map_err(storage_err)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS thought_traces (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            task_id TEXT,
            trace TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(storage_err)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS runtime_observability_samples (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recorded_at TEXT NOT NULL,
            session_count INTEGER NOT NULL,
            ingest_queue_depth INTEGER NOT NULL,
            ingest_queue_capacity INTEGER NOT NULL,
            push_queue_backlog INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(storage_err)?;

    let version_row: Option<(i64,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .map_err(storage_err)?;
    if version_row.is_none() {
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(CURRENT_SCHEMA_VERSION)
            .execute(pool)
            .await
            .map_err(storage_err)?;
    }

    Ok(())
}

fn storage_err(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}
