//! SQLite persistence for the courier sync daemon.
//!
//! This crate owns the two durable work queues that mediate bidirectional
//! synchronization between the ERP and the courier service:
//!
//! - The **export queue**: outbound entries driving courier task
//!   create/edit/delete calls.
//! - The **apply queue**: inbound webhook events awaiting application to
//!   an order.
//!
//! All state transitions are conditional updates keyed by entry id and the
//! expected current status, so concurrent drain passes can never
//! double-process an entry. See [`Database::try_claim_export`].

mod db;
mod error;
mod migrations;
mod models;

pub use db::Database;
pub use error::{DatabaseError, DatabaseResult};
pub use migrations::run_migrations;
pub use models::*;
