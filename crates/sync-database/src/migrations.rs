//! Database migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.

use crate::DatabaseResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_export_queue(conn)?;
    }
    if current_version < 2 {
        migrate_v2_apply_queue(conn)?;
    }
    if current_version < 3 {
        migrate_v3_dispatch_index(conn)?;
    }

    info!("Migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: outbound export queue.
fn migrate_v1_export_queue(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v1: export queue");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS export_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_id INTEGER NOT NULL,
            order_type TEXT NOT NULL DEFAULT 'salesorder',
            context TEXT NOT NULL DEFAULT 'create',
            courier_task_id TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            next_run_at TEXT NOT NULL,
            payload TEXT,
            last_error TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_export_queue_status
            ON export_queue(status);
        CREATE INDEX IF NOT EXISTS idx_export_queue_order_id
            ON export_queue(order_id);
        ",
    )?;

    record_migration(conn, 1, "export_queue")
}

/// V2: inbound apply queue for webhook events.
fn migrate_v2_apply_queue(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v2: apply queue");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS apply_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            raw_payload TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            resolved_order_id INTEGER,
            resolved_order_type TEXT,
            action TEXT,
            reference TEXT,
            courier_task_id TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_apply_queue_status
            ON apply_queue(status);
        ",
    )?;

    record_migration(conn, 2, "apply_queue")
}

/// V3: composite index for the dispatcher's due-entry scan.
fn migrate_v3_dispatch_index(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v3: dispatch due index");

    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_export_queue_due
            ON export_queue(status, next_run_at);
        ",
    )?;

    record_migration(conn, 3, "dispatch_due_index")
}
