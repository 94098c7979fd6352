//! Apply worker: drains the inbound webhook queue into order updates.
//!
//! Each queued event is translated into a narrow [`order_store::OrderPatch`]
//! against its target order. Write conflicts are retried within a pass;
//! repeated failures push the entry back to retry until its attempt budget
//! runs out.

mod error;
mod plan;
mod worker;

pub use error::{ApplyError, ApplyResult};
pub use plan::{parse_compact_date, plan_patch, tracking_link, PlanError, NO_CHANGE_NOTE};
pub use worker::{ApplyConfig, ApplyPass, MAX_APPLY_ATTEMPTS};
