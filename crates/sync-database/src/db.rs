//! Database connection and queue query operations.

use crate::{
    migrations, ApplyQueueEntry, ApplyStatus, DatabaseError, DatabaseResult, ExportContext,
    ExportQueueEntry, ExportStatus, NewApplyEntry, NewExportEntry, OrderType,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// Database wrapper with queue query methods.
///
/// The connection lives behind a mutex so the handle can be shared across
/// the daemon's drain loops; individual calls are short and SQLite's
/// busy_timeout covers writer contention with other processes.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open a database at the given path, running migrations if needed.
    pub fn open(path: &Path) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ==========================================
    // Export queue
    // ==========================================

    /// Insert a new export entry with status PENDING, due immediately.
    pub fn insert_export_entry(&self, entry: &NewExportEntry) -> DatabaseResult<ExportQueueEntry> {
        let conn = self.conn.lock().expect("lock poisoned");
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO export_queue
                (order_id, order_type, context, courier_task_id, status, attempts,
                 next_run_at, payload, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, ?6, ?5, ?5)",
            params![
                entry.order_id,
                entry.order_type.as_str(),
                entry.context.as_str(),
                entry.courier_task_id,
                now,
                entry.payload,
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.get_export_entry(id)?
            .ok_or_else(|| DatabaseError::NotFound("export entry not found after insert".to_string()))
    }

    /// Get an export entry by id.
    pub fn get_export_entry(&self, id: i64) -> DatabaseResult<Option<ExportQueueEntry>> {
        let conn = self.conn.lock().expect("lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, order_id, order_type, context, courier_task_id, status, attempts,
                    next_run_at, payload, last_error, created_at, updated_at
             FROM export_queue WHERE id = ?1",
        )?;

        let result = stmt.query_row(params![id], row_to_export_entry);

        match result {
            Ok(entry) => Ok(Some(entry)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Ids of PENDING export entries, oldest first, for the builder pass.
    pub fn pending_export_ids(&self, limit: usize) -> DatabaseResult<Vec<i64>> {
        let conn = self.conn.lock().expect("lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id FROM export_queue WHERE status = 'pending' ORDER BY id LIMIT ?1",
        )?;
        let ids = stmt
            .query_map(params![limit as i64], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Ids of export entries due for dispatch (PROCESSED or RETRY with
    /// next_run_at at or before `now`), oldest first.
    pub fn due_dispatch_ids(&self, limit: usize, now: DateTime<Utc>) -> DatabaseResult<Vec<i64>> {
        let conn = self.conn.lock().expect("lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id FROM export_queue
             WHERE status IN ('processed', 'retry') AND next_run_at <= ?1
             ORDER BY id LIMIT ?2",
        )?;
        let ids = stmt
            .query_map(params![now.to_rfc3339(), limit as i64], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Atomically claim an export entry: flip it to PROCESSING if and only if
    /// its status is one of `from`. Returns false when another pass owns it
    /// (or it already reached a terminal state).
    pub fn try_claim_export(&self, id: i64, from: &[ExportStatus]) -> DatabaseResult<bool> {
        let conn = self.conn.lock().expect("lock poisoned");
        let placeholders = from
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let changed = conn.execute(
            &format!(
                "UPDATE export_queue SET status = 'processing', updated_at = ?1
                 WHERE id = ?2 AND status IN ({placeholders})"
            ),
            params![Utc::now().to_rfc3339(), id],
        )?;
        if changed == 1 {
            debug!(entry_id = id, "Claimed export entry");
        }
        Ok(changed == 1)
    }

    /// All outstanding entries (PENDING/PROCESSING/PROCESSED) for an order,
    /// newest first. Used by consolidation.
    pub fn outstanding_exports_for_order(
        &self,
        order_id: i64,
    ) -> DatabaseResult<Vec<ExportQueueEntry>> {
        let conn = self.conn.lock().expect("lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, order_id, order_type, context, courier_task_id, status, attempts,
                    next_run_at, payload, last_error, created_at, updated_at
             FROM export_queue
             WHERE order_id = ?1 AND status IN ('pending', 'processing', 'processed')
             ORDER BY id DESC, updated_at DESC",
        )?;
        let entries = stmt
            .query_map(params![order_id], row_to_export_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Delete an export entry (consolidation superseding it).
    pub fn delete_export_entry(&self, id: i64) -> DatabaseResult<bool> {
        let conn = self.conn.lock().expect("lock poisoned");
        let changed = conn.execute("DELETE FROM export_queue WHERE id = ?1", params![id])?;
        Ok(changed == 1)
    }

    /// Mark an entry PROCESSED after the builder pass: attach (or clear) the
    /// payload, optionally rewrite the context, record any build error.
    pub fn mark_export_processed(
        &self,
        id: i64,
        payload: Option<&str>,
        context: Option<ExportContext>,
        last_error: Option<&str>,
    ) -> DatabaseResult<()> {
        let conn = self.conn.lock().expect("lock poisoned");
        match context {
            Some(ctx) => {
                conn.execute(
                    "UPDATE export_queue
                     SET status = 'processed', payload = ?1, context = ?2,
                         last_error = ?3, updated_at = ?4
                     WHERE id = ?5",
                    params![payload, ctx.as_str(), last_error, Utc::now().to_rfc3339(), id],
                )?;
            }
            None => {
                conn.execute(
                    "UPDATE export_queue
                     SET status = 'processed', payload = ?1, last_error = ?2, updated_at = ?3
                     WHERE id = ?4",
                    params![payload, last_error, Utc::now().to_rfc3339(), id],
                )?;
            }
        }
        Ok(())
    }

    /// Mark an entry SUCCESS, optionally with an explanatory note.
    pub fn mark_export_success(&self, id: i64, note: Option<&str>) -> DatabaseResult<()> {
        let conn = self.conn.lock().expect("lock poisoned");
        conn.execute(
            "UPDATE export_queue SET status = 'success', last_error = ?1, updated_at = ?2
             WHERE id = ?3",
            params![note, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Mark an entry ERROR (permanent, no further retry).
    pub fn mark_export_error(&self, id: i64, message: &str) -> DatabaseResult<()> {
        let conn = self.conn.lock().expect("lock poisoned");
        conn.execute(
            "UPDATE export_queue SET status = 'error', last_error = ?1, updated_at = ?2
             WHERE id = ?3",
            params![message, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Mark an entry RETRY with the incremented attempt count and its next
    /// due time.
    pub fn mark_export_retry(
        &self,
        id: i64,
        attempts: i32,
        next_run_at: DateTime<Utc>,
        message: &str,
    ) -> DatabaseResult<()> {
        let conn = self.conn.lock().expect("lock poisoned");
        conn.execute(
            "UPDATE export_queue
             SET status = 'retry', attempts = ?1, next_run_at = ?2, last_error = ?3,
                 updated_at = ?4
             WHERE id = ?5",
            params![attempts, next_run_at.to_rfc3339(), message, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Record a courier task id discovered on the order but missing from the
    /// entry (the builder corrects the context alongside, to avoid a
    /// duplicate create).
    pub fn set_export_task_id(&self, id: i64, courier_task_id: &str) -> DatabaseResult<()> {
        let conn = self.conn.lock().expect("lock poisoned");
        conn.execute(
            "UPDATE export_queue SET courier_task_id = ?1, updated_at = ?2
             WHERE id = ?3",
            params![courier_task_id, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Resolve every outstanding entry for an order as SUCCESS with a note.
    /// Used when customer pickup is turned on and there is no remote task.
    pub fn resolve_outstanding_for_order(
        &self,
        order_id: i64,
        note: &str,
    ) -> DatabaseResult<usize> {
        let conn = self.conn.lock().expect("lock poisoned");
        let changed = conn.execute(
            "UPDATE export_queue SET status = 'success', last_error = ?1, updated_at = ?2
             WHERE order_id = ?3 AND status IN ('pending', 'processing', 'processed', 'retry')",
            params![note, Utc::now().to_rfc3339(), order_id],
        )?;
        Ok(changed)
    }

    // ==========================================
    // Apply queue
    // ==========================================

    /// Insert a new apply entry.
    pub fn insert_apply_entry(&self, entry: &NewApplyEntry) -> DatabaseResult<ApplyQueueEntry> {
        let conn = self.conn.lock().expect("lock poisoned");
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO apply_queue
                (raw_payload, status, attempts, last_error, resolved_order_id,
                 resolved_order_type, action, reference, courier_task_id,
                 created_at, updated_at)
             VALUES (?1, ?2, 0, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                entry.raw_payload,
                entry.status.as_str(),
                entry.last_error,
                entry.resolved_order_id,
                entry.resolved_order_type.map(|t| t.as_str()),
                entry.action,
                entry.reference,
                entry.courier_task_id,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.get_apply_entry(id)?
            .ok_or_else(|| DatabaseError::NotFound("apply entry not found after insert".to_string()))
    }

    /// Get an apply entry by id.
    pub fn get_apply_entry(&self, id: i64) -> DatabaseResult<Option<ApplyQueueEntry>> {
        let conn = self.conn.lock().expect("lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, raw_payload, status, attempts, last_error, resolved_order_id,
                    resolved_order_type, action, reference, courier_task_id,
                    created_at, updated_at
             FROM apply_queue WHERE id = ?1",
        )?;

        let result = stmt.query_row(params![id], row_to_apply_entry);

        match result {
            Ok(entry) => Ok(Some(entry)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Ids of apply entries awaiting processing (PENDING or RETRY), oldest
    /// first.
    pub fn due_apply_ids(&self, limit: usize) -> DatabaseResult<Vec<i64>> {
        let conn = self.conn.lock().expect("lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id FROM apply_queue WHERE status IN ('pending', 'retry')
             ORDER BY id LIMIT ?1",
        )?;
        let ids = stmt
            .query_map(params![limit as i64], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Mark an apply entry PROCESSED. Conditional on the entry still being
    /// non-terminal, so a concurrent pass cannot double-terminate it.
    pub fn mark_apply_processed(&self, id: i64, note: Option<&str>) -> DatabaseResult<bool> {
        let conn = self.conn.lock().expect("lock poisoned");
        let changed = conn.execute(
            "UPDATE apply_queue SET status = 'processed', last_error = ?1, updated_at = ?2
             WHERE id = ?3 AND status IN ('pending', 'retry')",
            params![note, Utc::now().to_rfc3339(), id],
        )?;
        Ok(changed == 1)
    }

    /// Mark an apply entry RETRY with the incremented attempt count.
    pub fn mark_apply_retry(&self, id: i64, attempts: i32, message: &str) -> DatabaseResult<bool> {
        let conn = self.conn.lock().expect("lock poisoned");
        let changed = conn.execute(
            "UPDATE apply_queue
             SET status = 'retry', attempts = ?1, last_error = ?2, updated_at = ?3
             WHERE id = ?4 AND status IN ('pending', 'retry')",
            params![attempts, message, Utc::now().to_rfc3339(), id],
        )?;
        Ok(changed == 1)
    }

    /// Mark an apply entry ERROR (permanent).
    pub fn mark_apply_error(&self, id: i64, attempts: i32, message: &str) -> DatabaseResult<bool> {
        let conn = self.conn.lock().expect("lock poisoned");
        let changed = conn.execute(
            "UPDATE apply_queue
             SET status = 'error', attempts = ?1, last_error = ?2, updated_at = ?3
             WHERE id = ?4 AND status IN ('pending', 'retry')",
            params![attempts, message, Utc::now().to_rfc3339(), id],
        )?;
        Ok(changed == 1)
    }
}

fn row_to_export_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExportQueueEntry> {
    Ok(ExportQueueEntry {
        id: row.get(0)?,
        order_id: row.get(1)?,
        order_type: OrderType::from_str(&row.get::<_, String>(2)?),
        context: ExportContext::from_str(&row.get::<_, String>(3)?),
        courier_task_id: row.get(4)?,
        status: ExportStatus::from_str(&row.get::<_, String>(5)?),
        attempts: row.get(6)?,
        next_run_at: parse_datetime(row.get::<_, String>(7)?),
        payload: row.get(8)?,
        last_error: row.get(9)?,
        created_at: parse_datetime(row.get::<_, String>(10)?),
        updated_at: parse_datetime(row.get::<_, String>(11)?),
    })
}

fn row_to_apply_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApplyQueueEntry> {
    Ok(ApplyQueueEntry {
        id: row.get(0)?,
        raw_payload: row.get(1)?,
        status: ApplyStatus::from_str(&row.get::<_, String>(2)?),
        attempts: row.get(3)?,
        last_error: row.get(4)?,
        resolved_order_id: row.get(5)?,
        resolved_order_type: row
            .get::<_, Option<String>>(6)?
            .map(|t| OrderType::from_str(&t)),
        action: row.get(7)?,
        reference: row.get(8)?,
        courier_task_id: row.get(9)?,
        created_at: parse_datetime(row.get::<_, String>(10)?),
        updated_at: parse_datetime(row.get::<_, String>(11)?),
    })
}

/// Parse an RFC 3339 / SQLite datetime string, falling back to now.
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}
