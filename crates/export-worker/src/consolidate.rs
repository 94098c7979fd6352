//! Per-order consolidation: at most one outstanding export entry per order.

use sync_database::{Database, DatabaseResult};
use tracing::debug;

/// Outcome of consolidating an order's outstanding entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consolidation {
    /// The entry being processed is the newest; older duplicates were deleted.
    Kept,
    /// A newer entry exists; the entry being processed was deleted and must
    /// not be processed further.
    Superseded,
}

/// Collapse the order's outstanding entries down to the newest one.
///
/// Entries in {PENDING, PROCESSING, PROCESSED} for the same order are
/// ordered newest first (id descending, then updated_at); everything but the
/// newest is deleted. The newest entry carries any later edits, so dropping
/// the rest loses nothing.
pub fn consolidate_order(
    db: &Database,
    order_id: i64,
    entry_id: i64,
) -> DatabaseResult<Consolidation> {
    let outstanding = db.outstanding_exports_for_order(order_id)?;
    let Some(newest) = outstanding.first() else {
        // Nothing outstanding (entry already terminal or gone).
        return Ok(Consolidation::Kept);
    };
    let newest_id = newest.id;

    for stale in &outstanding[1..] {
        db.delete_export_entry(stale.id)?;
        debug!(
            order_id,
            entry_id = stale.id,
            kept = newest_id,
            "Deleted superseded export entry"
        );
    }

    if newest_id == entry_id {
        Ok(Consolidation::Kept)
    } else {
        Ok(Consolidation::Superseded)
    }
}
