//! Task payload wire types.
//!
//! Field names follow the courier API's camelCase JSON schema; the builder
//! in the export worker assembles these from an order snapshot.

use crate::{CourierError, CourierResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Courier task type for a standard delivery.
pub const TASK_TYPE_DELIVERY: i64 = 1;

/// Courier location type for a street address.
pub const LOCATION_TYPE: i64 = 2;

/// Unit-size key the courier expects item weights under.
pub const WEIGHT_UNIT_KEY: &str = "Weight kg";

/// A pickup or dropoff address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLocation {
    /// Always [`LOCATION_TYPE`].
    #[serde(rename = "type")]
    pub location_type: i64,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addressee: Option<String>,
}

impl TaskLocation {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            location_type: LOCATION_TYPE,
            address: address.into(),
            addressee: None,
        }
    }
}

/// Contact details attached to a stop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskContact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// One end of the task (pickup or dropoff).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStop {
    pub location: TaskLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<TaskContact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Per-item custom data the courier echoes back on scans.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCustomData {
    pub qty: f64,
    pub item_display: String,
}

/// One deliverable item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskItem {
    pub description: String,
    /// Item state at creation; always 0 (pending).
    pub state: i64,
    pub quantity: f64,
    /// Unit sizes keyed by measure, e.g. `{"Weight kg": 1.5}`.
    pub unit_sizes: BTreeMap<String, f64>,
    pub custom_data: ItemCustomData,
}

/// Task-level custom data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskCustomData {
    #[serde(rename = "RequiredDate", skip_serializing_if = "Option::is_none")]
    pub required_date: Option<String>,
}

/// The full create/update task envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    /// Stringified order internal id; the join key for webhooks.
    pub external_id: String,
    pub reference: String,
    /// Always [`TASK_TYPE_DELIVERY`].
    #[serde(rename = "type")]
    pub task_type: i64,
    /// Task date, compact `YYYYMMDD`.
    pub date: String,
    pub order_value: f64,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub skills: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_comment: Option<String>,
    pub custom_data: TaskCustomData,
    pub pickup: TaskStop,
    pub dropoff: TaskStop,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub items: Vec<TaskItem>,
}

/// Drop the keys the courier rejects on edits (`type`, `date`) from a
/// serialized payload.
pub fn strip_immutable_fields(payload: &str) -> CourierResult<String> {
    let mut value: serde_json::Value = serde_json::from_str(payload)?;
    let obj = value
        .as_object_mut()
        .ok_or_else(|| CourierError::InvalidPayload("payload is not a JSON object".to_string()))?;
    obj.remove("type");
    obj.remove("date");
    Ok(serde_json::to_string(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> TaskPayload {
        TaskPayload {
            external_id: "45".to_string(),
            reference: "SO45".to_string(),
            task_type: TASK_TYPE_DELIVERY,
            date: "20260310".to_string(),
            order_value: 120.5,
            skills: vec!["Courier".to_string()],
            internal_comment: Some("leave at gate".to_string()),
            custom_data: TaskCustomData {
                required_date: Some("2026-03-12".to_string()),
            },
            pickup: TaskStop {
                location: TaskLocation::new("1 Depot Way Leeds LS1 1AA GB"),
                contact: None,
                instructions: Some("use side door".to_string()),
            },
            dropoff: TaskStop {
                location: TaskLocation::new("9 Main St York YO1 1AA GB"),
                contact: Some(TaskContact {
                    name: Some("Pat".to_string()),
                    phone: Some("0113 000000".to_string()),
                    email: Some("pat@example.com".to_string()),
                }),
                instructions: None,
            },
            items: vec![TaskItem {
                description: "Widget".to_string(),
                state: 0,
                quantity: 2.0,
                unit_sizes: BTreeMap::from([(WEIGHT_UNIT_KEY.to_string(), 1.5)]),
                custom_data: ItemCustomData {
                    qty: 2.0,
                    item_display: "WID-1".to_string(),
                },
            }],
        }
    }

    #[test]
    fn payload_serializes_with_camel_case_wire_names() {
        let json = serde_json::to_value(sample_payload()).unwrap();

        assert_eq!(json["externalId"], "45");
        assert_eq!(json["type"], 1);
        assert_eq!(json["date"], "20260310");
        assert_eq!(json["orderValue"], 120.5);
        assert_eq!(json["internalComment"], "leave at gate");
        assert_eq!(json["customData"]["RequiredDate"], "2026-03-12");
        assert_eq!(json["pickup"]["location"]["type"], 2);
        assert_eq!(json["dropoff"]["contact"]["name"], "Pat");
        assert_eq!(json["items"][0]["unitSizes"]["Weight kg"], 1.5);
        assert_eq!(json["items"][0]["customData"]["itemDisplay"], "WID-1");
        assert_eq!(json["items"][0]["state"], 0);
    }

    #[test]
    fn strip_immutable_fields_removes_type_and_date() {
        let serialized = serde_json::to_string(&sample_payload()).unwrap();
        let stripped = strip_immutable_fields(&serialized).unwrap();

        let value: serde_json::Value = serde_json::from_str(&stripped).unwrap();
        assert!(value.get("type").is_none());
        assert!(value.get("date").is_none());
        // Everything else survives.
        assert_eq!(value["externalId"], "45");
        assert_eq!(value["reference"], "SO45");
    }

    #[test]
    fn strip_immutable_fields_rejects_non_objects() {
        assert!(strip_immutable_fields("[1,2]").is_err());
        assert!(strip_immutable_fields("not json").is_err());
    }
}
