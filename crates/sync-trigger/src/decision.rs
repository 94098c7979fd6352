//! The enqueue decision, as a pure function over order snapshots.

use order_store::Order;
use sync_database::ExportContext;

/// The order-change event reported by the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderEvent {
    Create,
    Edit,
    Copy,
    Delete,
}

impl OrderEvent {
    fn context(self) -> ExportContext {
        match self {
            Self::Create => ExportContext::Create,
            Self::Edit => ExportContext::Edit,
            Self::Copy => ExportContext::Copy,
            Self::Delete => ExportContext::Delete,
        }
    }
}

/// What the trigger should do with a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerDecision {
    /// Change is not sync-relevant.
    Skip(&'static str),
    /// Enqueue an export entry with this context.
    Enqueue(ExportContext),
    /// Customer pickup turned on while a courier task exists: remove it.
    EnqueueDelete,
    /// Customer pickup turned on with no courier task: close out any
    /// outstanding entries instead of enqueueing.
    ResolveOutstanding,
}

/// Decide what an order change means for the export queue.
///
/// `before` is the snapshot prior to the change; `None` for creates or
/// when the store cannot supply one (treated as "everything changed").
pub fn decide(event: OrderEvent, before: Option<&Order>, after: &Order) -> TriggerDecision {
    if !after.release_to_courier {
        return TriggerDecision::Skip("not released to courier");
    }

    let pickup_before = before.map(|b| b.customer_pickup).unwrap_or(false);
    if after.customer_pickup && !pickup_before {
        return if after.courier_task_id.is_some() {
            TriggerDecision::EnqueueDelete
        } else {
            TriggerDecision::ResolveOutstanding
        };
    }

    let released_before = before.map(|b| b.release_to_courier).unwrap_or(false);
    if !released_before {
        // The release flag just flipped on; whatever the event was, the
        // courier has never seen this order.
        return TriggerDecision::Enqueue(ExportContext::Create);
    }

    if event == OrderEvent::Edit {
        match before {
            Some(before) if !watched_fields_changed(before, after) => {
                return TriggerDecision::Skip("no watched fields changed");
            }
            _ => {}
        }
    }

    let mut context = event.context();
    if context == ExportContext::Edit && after.courier_task_id.is_none() {
        // Nothing to edit remotely yet.
        context = ExportContext::Create;
    }
    TriggerDecision::Enqueue(context)
}

/// Field-level diff driving edit-event enqueueing. Text fields compare
/// after trimming so whitespace-only edits stay no-ops.
pub fn watched_fields_changed(before: &Order, after: &Order) -> bool {
    if before.required_date != after.required_date
        || before.release_to_courier != after.release_to_courier
    {
        return true;
    }

    let text_pairs = [
        (&before.site_contact_name, &after.site_contact_name),
        (&before.site_contact_phone, &after.site_contact_phone),
        (&before.ship_method, &after.ship_method),
        (&before.memo, &after.memo),
        (&before.shipping_address.addressee, &after.shipping_address.addressee),
        (&before.shipping_address.addr1, &after.shipping_address.addr1),
        (&before.shipping_address.addr2, &after.shipping_address.addr2),
        (&before.shipping_address.city, &after.shipping_address.city),
        (&before.shipping_address.state, &after.shipping_address.state),
        (&before.shipping_address.zip, &after.shipping_address.zip),
        (&before.shipping_address.country, &after.shipping_address.country),
    ];
    if text_pairs.iter().any(|(b, a)| b.trim() != a.trim()) {
        return true;
    }

    line_keys(before) != line_keys(after)
}

fn line_keys(order: &Order) -> Vec<(String, String)> {
    let mut keys: Vec<(String, String)> = order
        .lines
        .iter()
        .map(|line| (line.item.trim().to_string(), line.quantity.to_string()))
        .collect();
    keys.sort();
    keys
}
