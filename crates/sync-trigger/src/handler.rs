//! Executes trigger decisions against the export queue.

use std::sync::Arc;

use order_store::{Order, OrderPatch};
use sync_database::{Database, ExportContext, ExportQueueEntry, NewExportEntry, OrderType};
use thiserror::Error;
use tracing::{debug, info};

use crate::decision::{decide, OrderEvent, TriggerDecision};

/// Note stamped on outstanding entries closed out by a pickup switch.
pub const CUSTOMER_PICKUP_NOTE: &str = "removed: customer pickup turned on";

pub type TriggerResult<T> = Result<T, TriggerError>;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("database error: {0}")]
    Database(#[from] sync_database::DatabaseError),
}

/// A return authorization copied from a sales order inherits the source's
/// courier linkage, which must not survive: the new document has no task of
/// its own yet. Scrubs the snapshot in place and returns the patch to
/// persist, when there was anything to clear. Callers run this on RMA
/// create/copy events before deciding.
pub fn scrub_copied_linkage(order: &mut Order) -> Option<OrderPatch> {
    if order.order_type != OrderType::ReturnAuthorization || order.courier_task_id.is_none() {
        return None;
    }
    order.reset_courier_linkage();
    debug!(order_id = order.id, "copied courier linkage scrubbed");
    Some(OrderPatch {
        courier_task_id: Some(None),
        task_status: Some(None),
        tracking_link: Some(None),
        driver: Some(None),
        route_stop: Some(None),
        released: Some(false),
        task_id_history: Some(order.task_id_history.clone()),
        ..Default::default()
    })
}

/// Receives order-change notifications and writes export entries.
pub struct TriggerHandler {
    db: Arc<Database>,
}

impl TriggerHandler {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Handle one order change. Returns the entry that was enqueued, if
    /// the change warranted one.
    pub fn on_order_change(
        &self,
        event: OrderEvent,
        before: Option<&Order>,
        after: &Order,
    ) -> TriggerResult<Option<ExportQueueEntry>> {
        match decide(event, before, after) {
            TriggerDecision::Skip(reason) => {
                debug!(order_id = after.id, reason, "order change skipped");
                Ok(None)
            }
            TriggerDecision::Enqueue(context) => self.enqueue(after, context).map(Some),
            TriggerDecision::EnqueueDelete => {
                self.enqueue(after, ExportContext::Delete).map(Some)
            }
            TriggerDecision::ResolveOutstanding => {
                let resolved = self
                    .db
                    .resolve_outstanding_for_order(after.id, CUSTOMER_PICKUP_NOTE)?;
                info!(
                    order_id = after.id,
                    resolved, "customer pickup turned on, outstanding entries closed"
                );
                Ok(None)
            }
        }
    }

    /// Re-release an order whose courier task was cancelled remotely.
    /// The builder archives and clears the old linkage before creating a
    /// fresh task.
    pub fn enqueue_backorder(&self, order: &Order) -> TriggerResult<ExportQueueEntry> {
        self.enqueue(order, ExportContext::Backorder)
    }

    /// Manual re-send, e.g. from an operator action. Edits when a courier
    /// task already exists, creates otherwise.
    pub fn enqueue_resend(&self, order: &Order) -> TriggerResult<ExportQueueEntry> {
        let context = if order.courier_task_id.is_some() {
            ExportContext::Edit
        } else {
            ExportContext::Create
        };
        self.enqueue(order, context)
    }

    fn enqueue(&self, order: &Order, context: ExportContext) -> TriggerResult<ExportQueueEntry> {
        let entry = self.db.insert_export_entry(&NewExportEntry {
            order_id: order.id,
            order_type: order.order_type,
            context,
            courier_task_id: order.courier_task_id.clone(),
            payload: None,
        })?;
        info!(
            entry_id = entry.id,
            order_id = order.id,
            context = context.as_str(),
            "export entry enqueued"
        );
        Ok(entry)
    }
}
