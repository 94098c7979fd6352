//! The apply pass: one drain of due apply-queue entries.

use std::sync::Arc;
use std::time::Duration;

use order_store::{OrderPatch, OrderStore, StoreResult};
use sync_database::{ApplyQueueEntry, Database, OrderType};
use tracing::{debug, info, warn};
use webhook_intake::WebhookEvent;

use crate::plan::{plan_patch, NO_CHANGE_NOTE};
use crate::{ApplyError, ApplyResult};

/// Attempts before an entry is parked as a permanent error.
pub const MAX_APPLY_ATTEMPTS: i32 = 5;

/// How many times a single pass retries a conflicting write before
/// giving the entry back to the queue.
const CONFLICT_TRIES: u32 = 5;

#[derive(Debug, Clone)]
pub struct ApplyConfig {
    pub batch_size: usize,
    pub max_attempts: i32,
    /// Base of the public tracking link written on driver assignment.
    pub tracking_base_url: String,
    /// First conflict-retry delay; doubles on each further conflict.
    pub conflict_retry_base_ms: u64,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            max_attempts: MAX_APPLY_ATTEMPTS,
            tracking_base_url: "https://track.example.com/t".to_string(),
            conflict_retry_base_ms: 300,
        }
    }
}

/// Drains due apply entries into order writes.
pub struct ApplyPass {
    db: Arc<Database>,
    store: Arc<dyn OrderStore>,
    config: ApplyConfig,
}

impl ApplyPass {
    pub fn new(db: Arc<Database>, store: Arc<dyn OrderStore>, config: ApplyConfig) -> Self {
        Self { db, store, config }
    }

    /// Process one batch of due entries. Returns how many were picked up.
    pub async fn run_pass(&self) -> ApplyResult<usize> {
        let ids = self.db.due_apply_ids(self.config.batch_size)?;
        let picked = ids.len();
        for id in ids {
            if let Err(ApplyError::Database(err)) = self.process_entry(id).await {
                warn!(entry_id = id, error = %err, "apply entry failed at the database");
            }
        }
        Ok(picked)
    }

    async fn process_entry(&self, id: i64) -> ApplyResult<()> {
        let Some(entry) = self.db.get_apply_entry(id)? else {
            return Ok(());
        };
        if entry.status.is_terminal() {
            return Ok(());
        }

        let event: WebhookEvent = match serde_json::from_str(&entry.raw_payload) {
            Ok(event) => event,
            Err(err) => {
                // The stored payload never changes, so a parse failure is
                // permanent no matter the attempt count.
                let message = format!("malformed stored payload: {err}");
                warn!(entry_id = id, error = %err, "apply entry unreadable");
                self.db.mark_apply_error(id, entry.attempts + 1, &message)?;
                return Ok(());
            }
        };

        let Some((order_type, order_id)) = resolve_target(&entry, &event) else {
            info!(entry_id = id, "apply entry has no resolvable target order");
            self.db
                .mark_apply_processed(id, Some("could not resolve target order from payload"))?;
            return Ok(());
        };

        let action = entry
            .action
            .clone()
            .or_else(|| event.action.clone())
            .unwrap_or_default();
        let external_id = event
            .external_id_str()
            .unwrap_or_else(|| order_id.to_string());
        let patch = match plan_patch(&action, &event, &external_id, &self.config.tracking_base_url)
        {
            Ok(patch) => patch,
            Err(err) => {
                return self.park_failure(id, order_id, entry.attempts, &err.to_string());
            }
        };

        if patch.is_empty() {
            self.db.mark_apply_processed(id, Some(NO_CHANGE_NOTE))?;
            return Ok(());
        }

        match self.write_patch(order_type, order_id, &patch).await {
            Ok(()) => {
                info!(entry_id = id, order_id, action = %action, "applied webhook to order");
                self.db.mark_apply_processed(id, None)?;
            }
            Err(err) => {
                let message = format!("order update failed: {err}");
                self.park_failure(id, order_id, entry.attempts, &message)?;
            }
        }
        Ok(())
    }

    /// Count a failed attempt against the entry: retry until the attempt
    /// budget runs out, then park it as a permanent error.
    fn park_failure(
        &self,
        id: i64,
        order_id: i64,
        prior_attempts: i32,
        message: &str,
    ) -> ApplyResult<()> {
        let attempts = prior_attempts + 1;
        if attempts >= self.config.max_attempts {
            warn!(entry_id = id, order_id, error = message, "apply entry exhausted");
            self.db.mark_apply_error(id, attempts, message)?;
        } else {
            debug!(entry_id = id, order_id, attempts, "apply entry will retry");
            self.db.mark_apply_retry(id, attempts, message)?;
        }
        Ok(())
    }

    /// Write with in-pass retries on optimistic-concurrency conflicts.
    async fn write_patch(
        &self,
        order_type: OrderType,
        order_id: i64,
        patch: &OrderPatch,
    ) -> StoreResult<()> {
        let mut delay = Duration::from_millis(self.config.conflict_retry_base_ms);
        let mut attempt = 0;
        loop {
            match self.store.apply_patch(order_type, order_id, patch) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_conflict() && attempt + 1 < CONFLICT_TRIES => {
                    attempt += 1;
                    debug!(order_id, attempt, "order write conflict, backing off");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn resolve_target(entry: &ApplyQueueEntry, event: &WebhookEvent) -> Option<(OrderType, i64)> {
    let order_id = entry.resolved_order_id.or_else(|| event.resolved_order_id())?;
    let order_type = entry
        .resolved_order_type
        .or_else(|| event.resolved_order_type())?;
    Some((order_type, order_id))
}
