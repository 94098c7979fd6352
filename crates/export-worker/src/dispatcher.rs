//! Dispatch pass: PROCESSED/RETRY → SUCCESS/RETRY/ERROR via the courier API.

use crate::ExportResult;
use chrono::Utc;
use courier_client::{CourierClient, CourierError};
use order_store::{OrderPatch, OrderStore};
use std::sync::Arc;
use sync_database::{Database, ExportContext, ExportQueueEntry, ExportStatus};
use tracing::{debug, info, warn};

/// Attempts after which a retryable failure becomes a permanent ERROR.
pub const MAX_DISPATCH_ATTEMPTS: i32 = 12;

/// Status label written onto the order after a successful create/edit.
const TASK_CREATED_LABEL: &str = "Courier task created";

/// Configuration for the dispatch pass.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum entries per pass.
    pub batch_size: usize,
    /// Retryable-failure attempt cap.
    pub max_attempts: i32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 40,
            max_attempts: MAX_DISPATCH_ATTEMPTS,
        }
    }
}

/// What to do with an entry after a courier call failed.
#[derive(Debug, PartialEq, Eq)]
enum FailureAction {
    /// Schedule a retry this many seconds from now.
    Retry { delay_secs: u64 },
    /// Permanent failure; no further attempts.
    Fail,
}

/// Drains PROCESSED/RETRY export entries against the courier API.
pub struct DispatchPass {
    db: Arc<Database>,
    client: CourierClient,
    store: Arc<dyn OrderStore>,
    config: DispatchConfig,
}

impl DispatchPass {
    pub fn new(
        db: Arc<Database>,
        client: CourierClient,
        store: Arc<dyn OrderStore>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            db,
            client,
            store,
            config,
        }
    }

    /// Run one dispatch pass. Returns the number of due entries picked up;
    /// a return value equal to the batch size signals backlog, and the
    /// caller should re-drain immediately.
    pub async fn run_pass(&self) -> ExportResult<usize> {
        let ids = self.db.due_dispatch_ids(self.config.batch_size, Utc::now())?;
        let picked = ids.len();

        for id in ids {
            if !self
                .db
                .try_claim_export(id, &[ExportStatus::Processed, ExportStatus::Retry])?
            {
                continue;
            }

            if let Err(err) = self.dispatch_entry(id).await {
                warn!(entry_id = id, error = %err, "Dispatch failed outside the courier call");
                let _ = self.db.mark_export_error(id, &err.to_string());
            }
        }

        if picked > 0 {
            debug!(picked, "Dispatch pass complete");
        }
        Ok(picked)
    }

    async fn dispatch_entry(&self, id: i64) -> ExportResult<()> {
        let Some(entry) = self.db.get_export_entry(id)? else {
            return Ok(());
        };

        match entry.context {
            ExportContext::Create | ExportContext::Copy => {
                let Some(payload) = entry.payload.clone() else {
                    self.db.mark_export_error(id, "create dispatch with no payload")?;
                    return Ok(());
                };
                match self.client.create_task(&payload).await {
                    Ok(uid) => self.finish_task_write(&entry, &uid)?,
                    Err(err) => self.handle_failure(&entry, &err)?,
                }
            }
            ExportContext::Edit => {
                let Some(task_id) = entry.courier_task_id.clone() else {
                    self.db.mark_export_error(id, "edit dispatch with no courier task id")?;
                    return Ok(());
                };
                let Some(payload) = entry.payload.clone() else {
                    self.db.mark_export_error(id, "edit dispatch with no payload")?;
                    return Ok(());
                };
                match self.client.update_task(&task_id, &payload).await {
                    Ok(uid) => self.finish_task_write(&entry, &uid)?,
                    Err(err) => self.handle_failure(&entry, &err)?,
                }
            }
            ExportContext::Delete => {
                let Some(task_id) = entry.courier_task_id.clone() else {
                    self.db.mark_export_error(id, "delete dispatch with no courier task id")?;
                    return Ok(());
                };
                match self.client.delete_task(&task_id).await {
                    Ok(()) => {
                        info!(entry_id = id, task_id = %task_id, "Courier task deleted");
                        self.db.mark_export_success(id, None)?;
                    }
                    Err(err) => self.handle_failure(&entry, &err)?,
                }
            }
            ExportContext::Backorder => {
                // The builder rewrites backorder to create before dispatch.
                self.db
                    .mark_export_error(id, "backorder entry reached dispatch without rebuild")?;
            }
        }
        Ok(())
    }

    /// Create/edit succeeded: write the task id and status label back onto
    /// the order, then terminate the entry.
    fn finish_task_write(&self, entry: &ExportQueueEntry, uid: &str) -> ExportResult<()> {
        let patch = OrderPatch {
            courier_task_id: Some(Some(uid.to_string())),
            task_status: Some(Some(TASK_CREATED_LABEL.to_string())),
            ..Default::default()
        };

        match self.store.apply_patch(entry.order_type, entry.order_id, &patch) {
            Ok(()) => {
                info!(
                    entry_id = entry.id,
                    order_id = entry.order_id,
                    task_id = %uid,
                    "Courier task synced"
                );
                self.db.mark_export_success(entry.id, None)?;
            }
            Err(err) => {
                // The remote task exists; surface the half-applied state.
                self.db.mark_export_error(
                    entry.id,
                    &format!("task {uid} dispatched but order update failed: {err}"),
                )?;
            }
        }
        Ok(())
    }

    fn handle_failure(&self, entry: &ExportQueueEntry, err: &CourierError) -> ExportResult<()> {
        match plan_failure(err, entry.attempts, self.config.max_attempts) {
            FailureAction::Retry { delay_secs } => {
                let next_run = Utc::now() + chrono::Duration::seconds(delay_secs as i64);
                warn!(
                    entry_id = entry.id,
                    attempts = entry.attempts + 1,
                    delay_secs,
                    error = %err,
                    "Dispatch failed, scheduling retry"
                );
                self.db
                    .mark_export_retry(entry.id, entry.attempts + 1, next_run, &err.to_string())?;
            }
            FailureAction::Fail => {
                warn!(entry_id = entry.id, error = %err, "Dispatch failed permanently");
                self.db.mark_export_error(entry.id, &err.to_string())?;
            }
        }
        Ok(())
    }
}

/// Decide retry-vs-fail for a courier error, honoring Retry-After on 429
/// and the attempt cap on retryable failures.
fn plan_failure(err: &CourierError, attempts: i32, max_attempts: i32) -> FailureAction {
    match err {
        CourierError::RateLimited { retry_after } => FailureAction::Retry {
            delay_secs: retry_after.unwrap_or_else(|| backoff_secs(attempts)),
        },
        CourierError::ServerError { .. } | CourierError::Http(_) => {
            if attempts < max_attempts {
                FailureAction::Retry {
                    delay_secs: backoff_secs(attempts),
                }
            } else {
                FailureAction::Fail
            }
        }
        _ => FailureAction::Fail,
    }
}

/// Exponential backoff: `2^attempts` seconds.
fn backoff_secs(attempts: i32) -> u64 {
    let shift = attempts.clamp(0, 30) as u32;
    1u64 << shift
}
