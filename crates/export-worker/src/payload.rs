//! Pure payload builder: order snapshot in, courier task envelope out.

use crate::{ExportError, ExportResult};
use chrono::NaiveDate;
use courier_client::{
    ItemCustomData, TaskContact, TaskCustomData, TaskItem, TaskLocation, TaskPayload, TaskStop,
    LOCATION_TYPE, TASK_TYPE_DELIVERY, WEIGHT_UNIT_KEY,
};
use order_store::Order;
use std::collections::BTreeMap;
use sync_database::OrderType;

/// Delivery-service values that map to the `"Early Delivery"` skill.
pub const EARLY_DELIVERY_SERVICES: [&str; 2] = ["Pre 12 Delivery", "Pre 10:30 Delivery"];

/// Policy knobs for payload construction.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Ship method that keeps its own name as the carrier skill.
    pub preferred_carrier: String,
    /// Swap pickup/dropoff for return authorizations.
    pub swap_return_locations: bool,
}

/// Build the courier task payload for an order.
///
/// Pure; fails with `ExportError::Build` when required linked data is
/// missing (no pickup site). The caller marks the entry PROCESSED with the
/// error note rather than crashing the batch.
pub fn build_task_payload(
    order: &Order,
    options: &BuildOptions,
    today: NaiveDate,
) -> ExportResult<TaskPayload> {
    let site = order.pickup_site.as_ref().ok_or_else(|| {
        ExportError::Build(format!("order {} has no pickup site address", order.reference))
    })?;

    let mut skills = vec![carrier_skill(&order.ship_method, &options.preferred_carrier)];
    if let Some(tag) = delivery_service_skill(&order.delivery_service) {
        skills.push(tag.to_string());
    }
    if matches!(order.required_date, Some(d) if d > today) {
        skills.push("Future Order".to_string());
    }

    let pickup = TaskStop {
        location: TaskLocation {
            location_type: LOCATION_TYPE,
            address: site.single_line(),
            addressee: non_empty(&site.addressee),
        },
        contact: Some(TaskContact {
            name: non_empty(&order.raised_by),
            phone: non_empty(&site.phone),
            email: None,
        }),
        instructions: non_empty(&order.driver_notes),
    };

    let dropoff = TaskStop {
        location: TaskLocation {
            location_type: LOCATION_TYPE,
            address: order.shipping_address.single_line(),
            addressee: non_empty(&order.shipping_address.addressee),
        },
        contact: Some(TaskContact {
            name: non_empty(&order.site_contact_name),
            phone: non_empty(&order.site_contact_phone),
            email: non_empty(&order.fulfilment_email),
        }),
        instructions: None,
    };

    let swap = options.swap_return_locations && order.order_type == OrderType::ReturnAuthorization;
    let (pickup, dropoff) = if swap { (dropoff, pickup) } else { (pickup, dropoff) };

    let items = order
        .lines
        .iter()
        .filter(|line| line.open_quantity() > 0.0)
        .map(|line| TaskItem {
            description: line.description.clone(),
            state: 0,
            quantity: line.open_quantity(),
            unit_sizes: BTreeMap::from([(
                WEIGHT_UNIT_KEY.to_string(),
                line.weight.unwrap_or(0.0),
            )]),
            custom_data: ItemCustomData {
                qty: line.open_quantity(),
                item_display: line.item.clone(),
            },
        })
        .collect();

    Ok(TaskPayload {
        external_id: order.id.to_string(),
        reference: order.reference.clone(),
        task_type: TASK_TYPE_DELIVERY,
        date: order.order_date.format("%Y%m%d").to_string(),
        order_value: order.subtotal,
        skills,
        internal_comment: non_empty(&order.memo),
        custom_data: TaskCustomData {
            required_date: order.required_date.map(|d| d.format("%Y-%m-%d").to_string()),
        },
        pickup,
        dropoff,
        items,
    })
}

/// Normalize the ship method to exactly one carrier skill.
fn carrier_skill(ship_method: &str, preferred_carrier: &str) -> String {
    if ship_method.trim() == preferred_carrier {
        preferred_carrier.to_string()
    } else {
        "Courier".to_string()
    }
}

/// Map the delivery-service field to a skill; unknown values are dropped.
fn delivery_service_skill(delivery_service: &str) -> Option<&'static str> {
    if EARLY_DELIVERY_SERVICES.contains(&delivery_service.trim()) {
        Some("Early Delivery")
    } else {
        None
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
