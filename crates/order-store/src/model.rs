//! Order snapshot model.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sync_database::OrderType;

/// A shipping address as it appears on the order body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub addressee: String,
    #[serde(default)]
    pub addr1: String,
    #[serde(default)]
    pub addr2: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub country: String,
}

impl Address {
    /// Space-joined single-line form (empty components skipped).
    pub fn single_line(&self) -> String {
        [&self.addr1, &self.addr2, &self.city, &self.zip, &self.country]
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The site a courier collects from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PickupSite {
    #[serde(default)]
    pub addressee: String,
    #[serde(default)]
    pub addr1: String,
    #[serde(default)]
    pub addr2: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub phone: String,
}

impl PickupSite {
    /// Space-joined single-line form (empty components skipped).
    pub fn single_line(&self) -> String {
        [&self.addr1, &self.addr2, &self.city, &self.zip, &self.country]
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One order line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub item: String,
    #[serde(default)]
    pub description: String,
    pub quantity: f64,
    #[serde(default)]
    pub fulfilled: f64,
    /// Unit weight in kg; None when the item has no weight on record.
    #[serde(default)]
    pub weight: Option<f64>,
}

impl OrderLine {
    /// Quantity still awaiting fulfilment.
    pub fn open_quantity(&self) -> f64 {
        self.quantity - self.fulfilled
    }
}

/// Point-in-time snapshot of an order in the external system of record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_type: OrderType,
    /// Human-facing reference like `SO45` or `RMA12`.
    pub reference: String,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub fulfilment_email: String,
    pub order_date: NaiveDate,
    #[serde(default)]
    pub required_date: Option<NaiveDate>,
    #[serde(default)]
    pub subtotal: f64,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub ship_method: String,
    #[serde(default)]
    pub delivery_service: String,
    #[serde(default)]
    pub site_contact_name: String,
    #[serde(default)]
    pub site_contact_phone: String,
    #[serde(default)]
    pub raised_by: String,
    #[serde(default)]
    pub driver_notes: String,
    #[serde(default)]
    pub shipping_address: Address,
    /// Pickup location; absent means the order cannot be exported yet.
    #[serde(default)]
    pub pickup_site: Option<PickupSite>,

    // Courier-linked fields, written back by the daemon.
    #[serde(default)]
    pub courier_task_id: Option<String>,
    #[serde(default)]
    pub task_status: Option<String>,
    #[serde(default)]
    pub tracking_link: Option<String>,
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub route_stop: Option<i64>,
    #[serde(default)]
    pub released: bool,
    /// Operator gate: nothing is exported while this is off.
    #[serde(default)]
    pub release_to_courier: bool,
    #[serde(default)]
    pub customer_pickup: bool,
    /// Comma-separated prior task ids.
    #[serde(default)]
    pub task_id_history: Option<String>,
    #[serde(default)]
    pub ship_date: Option<NaiveDate>,

    #[serde(default)]
    pub lines: Vec<OrderLine>,
}

impl Order {
    /// True when every line has been fully fulfilled.
    pub fn all_lines_fulfilled(&self) -> bool {
        self.lines.iter().all(|line| line.open_quantity() <= 0.0)
    }

    /// Archive the current task id into the history field and clear every
    /// courier-linked field. Used when a return authorization is copied from
    /// a sales order (it must not inherit the source's task) and when a
    /// backorder re-export starts over.
    pub fn reset_courier_linkage(&mut self) {
        if let Some(task_id) = self.courier_task_id.take() {
            self.task_id_history = Some(match self.task_id_history.take() {
                Some(history) if !history.is_empty() => format!("{history},{task_id}"),
                _ => task_id,
            });
        }
        self.task_status = None;
        self.tracking_link = None;
        self.driver = None;
        self.route_stop = None;
        self.released = false;
    }
}
