//! HTTP client for the remote delivery (courier) task API.
//!
//! Exposes the task payload wire types, the verb-per-context client
//! (create/update/delete), and an error taxonomy that separates permanent
//! rejections from retryable failures.

mod client;
mod error;
mod payload;

pub use client::{CourierClient, TaskResponse};
pub use error::{CourierError, CourierResult};
pub use payload::{
    strip_immutable_fields, ItemCustomData, TaskContact, TaskCustomData, TaskItem, TaskLocation,
    TaskPayload, TaskStop, LOCATION_TYPE, TASK_TYPE_DELIVERY, WEIGHT_UNIT_KEY,
};
