//! Order snapshots and the store boundary the sync daemon reads and
//! writes orders through.
//!
//! Orders live in an external system of record; the daemon only sees
//! point-in-time snapshots and writes back narrow patches of the
//! courier-linked fields. `OrderStore` is that boundary; the in-memory
//! implementation backs tests and local mode.

mod error;
mod model;
mod store;

pub use error::{StoreError, StoreResult};
pub use model::{Address, Order, OrderLine, PickupSite};
pub use store::{MemoryOrderStore, OrderPatch, OrderStore};
