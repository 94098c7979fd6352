//! Inbound webhook event model and the intake decision.

use serde::Deserialize;
use serde_json::Value;
use sync_database::OrderType;

/// Actions the sync engine reacts to. Everything else is either dropped
/// silently or recorded as ignored for audit.
pub const ALLOWED_ACTIONS: [&str; 8] = [
    "Tasks.assignManually",
    "Tasks.moveToDate",
    "Tasks.update",
    "v3.Optimization.optimizeDates",
    "v3.Optimization.optimizeRoutes",
    "Routes.setOrder",
    "Routes.reassign",
    "Routes.swap",
];

/// ETA recalculations fire constantly and carry nothing we apply.
const DROPPED_ACTION: &str = "Routes.updateETAs";

/// The subset of the courier webhook body the intake path inspects. The
/// full body is stored verbatim on the queue entry regardless.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "externalId")]
    pub external_id: Option<Value>,
    pub reference: Option<String>,
    pub action: Option<String>,
    pub uid: Option<Value>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    pub data: Option<HistoryData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryData {
    pub date: Option<Value>,
    pub assignment: Option<Assignment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Assignment {
    #[serde(rename = "routeOrder")]
    pub route_order: Option<Value>,
    pub assignee: Option<Assignee>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Assignee {
    pub info: Option<AssigneeInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssigneeInfo {
    #[serde(rename = "firstName")]
    pub first_name: Option<String>,
}

/// What intake should do with an authenticated, well-formed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeDecision {
    /// Allowed action carrying the fields its apply step needs.
    Enqueue,
    /// Known-noisy action, or an allowed action missing its required
    /// fields. Acknowledged but not recorded.
    Drop(&'static str),
    /// Unknown action. Recorded on the queue as an error entry for audit.
    RecordIgnored,
}

impl WebhookEvent {
    /// Stringified external id, if present and non-empty. The courier
    /// service sends it as either a string or a number.
    pub fn external_id_str(&self) -> Option<String> {
        value_to_string(self.external_id.as_ref())
    }

    pub fn uid_str(&self) -> Option<String> {
        value_to_string(self.uid.as_ref())
    }

    /// Order internal id, when the external id parses as one.
    pub fn resolved_order_id(&self) -> Option<i64> {
        self.external_id_str()?.parse().ok()
    }

    /// Order type from the document reference prefix.
    pub fn resolved_order_type(&self) -> Option<OrderType> {
        OrderType::from_reference(self.reference.as_deref()?)
    }

    fn latest_history(&self) -> Option<&HistoryData> {
        self.history.last()?.data.as_ref()
    }

    /// Driver first name from the latest history entry.
    pub fn assignee_first_name(&self) -> Option<&str> {
        self.latest_history()?
            .assignment
            .as_ref()?
            .assignee
            .as_ref()?
            .info
            .as_ref()?
            .first_name
            .as_deref()
    }

    /// Stop sequence number from the latest history entry.
    pub fn route_order(&self) -> Option<i64> {
        match self.latest_history()?.assignment.as_ref()?.route_order.as_ref()? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Task date from the latest history entry, in the compact `YYYYMMDD`
    /// form the courier service uses.
    pub fn event_date(&self) -> Option<String> {
        value_to_string(self.latest_history()?.date.as_ref())
    }

    fn has_assignee_info(&self) -> bool {
        self.latest_history()
            .and_then(|d| d.assignment.as_ref())
            .and_then(|a| a.assignee.as_ref())
            .map(|a| a.info.is_some())
            .unwrap_or(false)
    }

    fn has_route_order(&self) -> bool {
        self.latest_history()
            .and_then(|d| d.assignment.as_ref())
            .map(|a| a.route_order.is_some())
            .unwrap_or(false)
    }

    fn has_date(&self) -> bool {
        self.latest_history().map(|d| d.date.is_some()).unwrap_or(false)
    }

    /// Classify the event. Assumes the external id was already checked.
    pub fn classify(&self) -> IntakeDecision {
        let action = match self.action.as_deref() {
            Some(a) if !a.trim().is_empty() => a,
            _ => return IntakeDecision::RecordIgnored,
        };
        if action == DROPPED_ACTION {
            return IntakeDecision::Drop("eta update");
        }
        if !ALLOWED_ACTIONS.contains(&action) {
            return IntakeDecision::RecordIgnored;
        }
        let ready = match action {
            "Tasks.assignManually" => self.has_assignee_info(),
            "Tasks.moveToDate" | "Tasks.update" => self.has_date(),
            // Route and optimization events carry either a stop sequence
            // or a driver assignment depending on how they were produced.
            _ => self.has_route_order() || self.has_assignee_info(),
        };
        if ready {
            IntakeDecision::Enqueue
        } else {
            IntakeDecision::Drop("missing event data")
        }
    }
}

fn value_to_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
