//! Trigger logic: decides, on each order change, whether the change is
//! worth a courier sync, and enqueues the export entry when it is.
//!
//! The decision itself is a pure function over before/after order
//! snapshots; [`TriggerHandler`] executes it against the queue.

mod decision;
mod handler;

pub use decision::{decide, watched_fields_changed, OrderEvent, TriggerDecision};
pub use handler::{
    scrub_copied_linkage, TriggerError, TriggerHandler, TriggerResult, CUSTOMER_PICKUP_NOTE,
};
