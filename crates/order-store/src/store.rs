//! The store boundary and its in-memory implementation.

use crate::{Order, StoreError, StoreResult};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;
use sync_database::OrderType;
use tracing::debug;

/// A narrow write against an order's courier-linked fields.
///
/// `None` leaves a field untouched; `Some(None)` clears it; `Some(Some(v))`
/// sets it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPatch {
    pub courier_task_id: Option<Option<String>>,
    pub task_status: Option<Option<String>>,
    pub tracking_link: Option<Option<String>>,
    pub driver: Option<Option<String>>,
    pub route_stop: Option<Option<i64>>,
    pub released: Option<bool>,
    pub release_to_courier: Option<bool>,
    pub task_id_history: Option<Option<String>>,
    pub ship_date: Option<Option<NaiveDate>>,
}

impl OrderPatch {
    /// True when the patch would not change anything.
    pub fn is_empty(&self) -> bool {
        self == &OrderPatch::default()
    }

    /// Apply this patch to an order snapshot.
    pub fn apply_to(&self, order: &mut Order) {
        if let Some(v) = &self.courier_task_id {
            order.courier_task_id = v.clone();
        }
        if let Some(v) = &self.task_status {
            order.task_status = v.clone();
        }
        if let Some(v) = &self.tracking_link {
            order.tracking_link = v.clone();
        }
        if let Some(v) = &self.driver {
            order.driver = v.clone();
        }
        if let Some(v) = &self.route_stop {
            order.route_stop = *v;
        }
        if let Some(v) = self.released {
            order.released = v;
        }
        if let Some(v) = self.release_to_courier {
            order.release_to_courier = v;
        }
        if let Some(v) = &self.task_id_history {
            order.task_id_history = v.clone();
        }
        if let Some(v) = &self.ship_date {
            order.ship_date = *v;
        }
    }
}

/// Read/write boundary to the external system of record.
pub trait OrderStore: Send + Sync {
    /// Load a point-in-time snapshot of an order.
    fn load(&self, order_type: OrderType, id: i64) -> StoreResult<Order>;

    /// Write a patch back. Returns `StoreError::Conflict` when another
    /// writer changed the record since it was loaded; callers retry with
    /// backoff.
    fn apply_patch(&self, order_type: OrderType, id: i64, patch: &OrderPatch) -> StoreResult<()>;
}

/// In-memory order store for tests and local mode.
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: Mutex<HashMap<(OrderType, i64), Order>>,
    /// Remaining apply_patch calls that will fail with Conflict.
    conflicts: Mutex<u32>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an order snapshot.
    pub fn insert(&self, order: Order) {
        let mut orders = self.orders.lock().expect("lock poisoned");
        orders.insert((order.order_type, order.id), order);
    }

    /// Fetch a copy of a stored order (test inspection).
    pub fn get(&self, order_type: OrderType, id: i64) -> Option<Order> {
        let orders = self.orders.lock().expect("lock poisoned");
        orders.get(&(order_type, id)).cloned()
    }

    /// Make the next `n` apply_patch calls fail with Conflict.
    pub fn inject_conflicts(&self, n: u32) {
        *self.conflicts.lock().expect("lock poisoned") = n;
    }
}

impl OrderStore for MemoryOrderStore {
    fn load(&self, order_type: OrderType, id: i64) -> StoreResult<Order> {
        let orders = self.orders.lock().expect("lock poisoned");
        orders
            .get(&(order_type, id))
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    fn apply_patch(&self, order_type: OrderType, id: i64, patch: &OrderPatch) -> StoreResult<()> {
        {
            let mut conflicts = self.conflicts.lock().expect("lock poisoned");
            if *conflicts > 0 {
                *conflicts -= 1;
                return Err(StoreError::Conflict(id));
            }
        }

        let mut orders = self.orders.lock().expect("lock poisoned");
        let order = orders
            .get_mut(&(order_type, id))
            .ok_or(StoreError::NotFound(id))?;
        patch.apply_to(order);
        debug!(order_id = id, "Applied order patch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Address;

    fn order(id: i64) -> Order {
        Order {
            id,
            order_type: OrderType::SalesOrder,
            reference: format!("SO{id}"),
            closed: false,
            customer_name: String::new(),
            fulfilment_email: String::new(),
            order_date: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            required_date: None,
            subtotal: 0.0,
            memo: String::new(),
            ship_method: String::new(),
            delivery_service: String::new(),
            site_contact_name: String::new(),
            site_contact_phone: String::new(),
            raised_by: String::new(),
            driver_notes: String::new(),
            shipping_address: Address::default(),
            pickup_site: None,
            courier_task_id: None,
            task_status: None,
            tracking_link: None,
            driver: None,
            route_stop: None,
            released: false,
            release_to_courier: false,
            customer_pickup: false,
            task_id_history: None,
            ship_date: None,
            lines: vec![],
        }
    }

    #[test]
    fn load_missing_is_not_found() {
        let store = MemoryOrderStore::new();
        let result = store.load(OrderType::SalesOrder, 99);
        assert!(matches!(result, Err(StoreError::NotFound(99))));
    }

    #[test]
    fn patch_sets_and_clears_fields() {
        let store = MemoryOrderStore::new();
        store.insert(order(1));

        let patch = OrderPatch {
            courier_task_id: Some(Some("T-9".to_string())),
            released: Some(true),
            ..Default::default()
        };
        store.apply_patch(OrderType::SalesOrder, 1, &patch).unwrap();

        let loaded = store.load(OrderType::SalesOrder, 1).unwrap();
        assert_eq!(loaded.courier_task_id.as_deref(), Some("T-9"));
        assert!(loaded.released);

        let clear = OrderPatch {
            courier_task_id: Some(None),
            ..Default::default()
        };
        store.apply_patch(OrderType::SalesOrder, 1, &clear).unwrap();
        let loaded = store.load(OrderType::SalesOrder, 1).unwrap();
        assert!(loaded.courier_task_id.is_none());
        // Untouched fields survive.
        assert!(loaded.released);
    }

    #[test]
    fn empty_patch_detection() {
        assert!(OrderPatch::default().is_empty());
        let patch = OrderPatch {
            driver: Some(Some("Sam".to_string())),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn injected_conflicts_fail_then_clear() {
        let store = MemoryOrderStore::new();
        store.insert(order(1));
        store.inject_conflicts(2);

        let patch = OrderPatch {
            released: Some(true),
            ..Default::default()
        };
        assert!(store.apply_patch(OrderType::SalesOrder, 1, &patch).unwrap_err().is_conflict());
        assert!(store.apply_patch(OrderType::SalesOrder, 1, &patch).unwrap_err().is_conflict());
        store.apply_patch(OrderType::SalesOrder, 1, &patch).unwrap();
        assert!(store.load(OrderType::SalesOrder, 1).unwrap().released);
    }

    #[test]
    fn orders_are_keyed_by_type_and_id() {
        let store = MemoryOrderStore::new();
        store.insert(order(1));
        let mut rma = order(1);
        rma.order_type = OrderType::ReturnAuthorization;
        rma.reference = "RMA1".to_string();
        store.insert(rma);

        assert_eq!(store.load(OrderType::SalesOrder, 1).unwrap().reference, "SO1");
        assert_eq!(
            store.load(OrderType::ReturnAuthorization, 1).unwrap().reference,
            "RMA1"
        );
    }
}
