//! Outbound export workers.
//!
//! Two cooperating passes drain the export queue: the builder pass turns
//! PENDING entries into PROCESSED entries with a serialized task payload
//! (consolidating duplicates per order on the way), and the dispatch pass
//! sends PROCESSED/RETRY entries to the courier API and drives them to a
//! terminal state.

mod builder;
mod consolidate;
mod dispatcher;
mod error;
mod payload;

pub use builder::{BuilderConfig, BuilderPass};
pub use consolidate::{consolidate_order, Consolidation};
pub use dispatcher::{DispatchConfig, DispatchPass, MAX_DISPATCH_ATTEMPTS};
pub use error::{ExportError, ExportResult};
pub use payload::{build_task_payload, BuildOptions, EARLY_DELIVERY_SERVICES};
