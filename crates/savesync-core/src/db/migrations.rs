//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Run `statements` inside one transaction, rolling back on the first failure.
async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn
        .execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .await
    {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Migration to version 1: snapshot caches and the pending sync queue
async fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        1,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            "CREATE TABLE IF NOT EXISTS save_cache (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id INTEGER NOT NULL,
                emulator_id TEXT,
                channel_name TEXT,
                slot_number INTEGER,
                content_hash TEXT NOT NULL,
                captured_at INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL DEFAULT 0,
                is_locked INTEGER NOT NULL DEFAULT 0,
                note TEXT,
                cache_path TEXT NOT NULL,
                core_id TEXT,
                is_hardcore INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE INDEX IF NOT EXISTS idx_save_cache_game ON save_cache(game_id, captured_at)",
            "CREATE INDEX IF NOT EXISTS idx_save_cache_hash ON save_cache(game_id, content_hash)",
            "CREATE TABLE IF NOT EXISTS state_cache (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id INTEGER NOT NULL,
                emulator_id TEXT,
                channel_name TEXT,
                slot_number INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                captured_at INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL DEFAULT 0,
                is_locked INTEGER NOT NULL DEFAULT 0,
                note TEXT,
                cache_path TEXT NOT NULL,
                core_id TEXT,
                is_hardcore INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE INDEX IF NOT EXISTS idx_state_cache_game ON state_cache(game_id, captured_at)",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_state_cache_slot ON state_cache(
                game_id, COALESCE(emulator_id, ''), slot_number, COALESCE(channel_name, '')
            )",
            "CREATE TABLE IF NOT EXISTS pending_sync_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id INTEGER NOT NULL,
                sync_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING',
                priority INTEGER NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL,
                last_error TEXT,
                payload_json TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                CHECK (retry_count <= max_retries)
            )",
            "CREATE INDEX IF NOT EXISTS idx_queue_drain ON pending_sync_queue(status, priority, created_at)",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_one_pending ON pending_sync_queue(game_id, sync_type)
                WHERE status = 'PENDING'",
        ],
    )
    .await
}

/// Migration to version 2: per-game sync status and its history
async fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        2,
        &[
            "CREATE TABLE IF NOT EXISTS save_sync (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id INTEGER NOT NULL,
                emulator_id TEXT NOT NULL,
                channel_name TEXT,
                local_save_path TEXT,
                local_updated_at INTEGER,
                sync_status TEXT NOT NULL,
                last_sync_error TEXT,
                server_save_id TEXT,
                server_updated_at INTEGER,
                last_synced_hash TEXT,
                last_synced_at INTEGER
            )",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_save_sync_key ON save_sync(
                game_id, emulator_id, COALESCE(channel_name, '')
            )",
            "CREATE TABLE IF NOT EXISTS sync_status_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id INTEGER NOT NULL,
                emulator_id TEXT NOT NULL,
                channel_name TEXT,
                old_status TEXT,
                new_status TEXT NOT NULL,
                reason TEXT NOT NULL,
                changed_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_history_game ON sync_status_history(game_id, changed_at DESC)",
        ],
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn table_exists(conn: &Connection, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
                [name],
            )
            .await
            .unwrap();
        rows.next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_all_tables_created() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        for table in [
            "save_cache",
            "state_cache",
            "pending_sync_queue",
            "save_sync",
            "sync_status_history",
        ] {
            assert!(table_exists(&conn, table).await, "missing table {table}");
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_queue_rejects_retry_count_above_max() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let result = conn
            .execute(
                "INSERT INTO pending_sync_queue
                    (game_id, sync_type, priority, retry_count, max_retries, created_at, updated_at)
                 VALUES (1, 'SAVE_FILE', 1, 4, 3, 0, 0)",
                (),
            )
            .await;
        assert!(result.is_err());
    }
}
