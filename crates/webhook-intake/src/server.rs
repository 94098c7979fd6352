//! Axum routes for the courier webhook endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use sync_database::{ApplyStatus, Database, NewApplyEntry};
use tracing::{info, warn};
use uuid::Uuid;

use crate::event::{IntakeDecision, WebhookEvent};

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct IntakeState {
    pub db: Arc<Database>,
    pub api_key: String,
}

/// Acknowledgement body. The courier service only checks the HTTP status,
/// so post-auth problems are reported in-band rather than as 5xx.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    pub message: String,
}

impl WebhookAck {
    fn ok(message: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            StatusCode::OK,
            Json(Self {
                success: true,
                message: message.into(),
            }),
        )
    }

    fn rejected(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            status,
            Json(Self {
                success: false,
                message: message.into(),
            }),
        )
    }
}

pub fn router(state: IntakeState) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

pub async fn handle_webhook(
    State(state): State<IntakeState>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<WebhookAck>) {
    // Correlation id tying log lines for one delivery together.
    let request_id = Uuid::new_v4();

    let presented = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if presented != state.api_key {
        warn!(request_id = %request_id, "webhook rejected: bad api key");
        return WebhookAck::rejected(StatusCode::FORBIDDEN, "invalid api key");
    }

    let event: WebhookEvent = match serde_json::from_str(&body) {
        Ok(event) => event,
        Err(err) => {
            warn!(request_id = %request_id, error = %err, "webhook rejected: malformed body");
            return WebhookAck::rejected(StatusCode::BAD_REQUEST, "malformed JSON body");
        }
    };

    let external_id = match event.external_id_str() {
        Some(id) => id,
        None => {
            return WebhookAck::rejected(StatusCode::OK, "event has no externalId");
        }
    };

    let action = event.action.clone().unwrap_or_default();
    match event.classify() {
        IntakeDecision::Drop(reason) => {
            info!(request_id = %request_id, action = %action, external_id = %external_id, reason, "webhook dropped");
            WebhookAck::rejected(StatusCode::OK, format!("dropped: {reason}"))
        }
        IntakeDecision::RecordIgnored => {
            let note = format!("ignored webhook action: {action}");
            let entry = new_entry(&event, &body, ApplyStatus::Error, Some(note.clone()));
            match state.db.insert_apply_entry(&entry) {
                Ok(recorded) => {
                    info!(request_id = %request_id, entry_id = recorded.id, action = %action, "webhook recorded as ignored");
                    WebhookAck::rejected(StatusCode::OK, note)
                }
                Err(err) => {
                    warn!(request_id = %request_id, error = %err, "failed to record ignored webhook");
                    WebhookAck::rejected(StatusCode::OK, "failed to record event")
                }
            }
        }
        IntakeDecision::Enqueue => {
            let entry = new_entry(&event, &body, ApplyStatus::Pending, None);
            match state.db.insert_apply_entry(&entry) {
                Ok(recorded) => {
                    info!(
                        request_id = %request_id,
                        entry_id = recorded.id,
                        action = %action,
                        external_id = %external_id,
                        "webhook queued"
                    );
                    WebhookAck::ok("queued")
                }
                Err(err) => {
                    warn!(request_id = %request_id, error = %err, "failed to queue webhook");
                    WebhookAck::rejected(StatusCode::OK, "failed to record event")
                }
            }
        }
    }
}

fn new_entry(
    event: &WebhookEvent,
    raw_body: &str,
    status: ApplyStatus,
    last_error: Option<String>,
) -> NewApplyEntry {
    NewApplyEntry {
        raw_payload: raw_body.to_string(),
        status,
        last_error,
        resolved_order_id: event.resolved_order_id(),
        resolved_order_type: event.resolved_order_type(),
        action: event.action.clone(),
        reference: event.reference.clone(),
        courier_task_id: event.uid_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;
    use sync_database::ApplyStatus;

    fn state() -> IntakeState {
        IntakeState {
            db: Arc::new(Database::open_in_memory().unwrap()),
            api_key: "hook-secret".to_string(),
        }
    }

    fn auth_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("hook-secret"));
        headers
    }

    fn assignment_body() -> String {
        json!({
            "externalId": "45",
            "reference": "SO45",
            "action": "Tasks.assignManually",
            "uid": "task-9",
            "history": [
                { "data": { "assignment": { "assignee": { "info": { "firstName": "Dana" } } } } }
            ]
        })
        .to_string()
    }

    #[tokio::test]
    async fn bad_api_key_is_forbidden() {
        let state = state();
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("wrong"));
        let (status, ack) =
            handle_webhook(State(state), headers, assignment_body()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(!ack.0.success);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let (status, ack) =
            handle_webhook(State(state()), auth_headers(), "{not json".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!ack.0.success);
    }

    #[tokio::test]
    async fn missing_external_id_is_acknowledged_without_an_entry() {
        let state = state();
        let body = json!({ "action": "Tasks.update" }).to_string();
        let (status, ack) =
            handle_webhook(State(state.clone()), auth_headers(), body).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!ack.0.success);
        assert!(state.db.due_apply_ids(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn allowed_event_is_queued_with_metadata() {
        let state = state();
        let (status, ack) =
            handle_webhook(State(state.clone()), auth_headers(), assignment_body()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(ack.0.success);

        let ids = state.db.due_apply_ids(10).unwrap();
        assert_eq!(ids.len(), 1);
        let entry = state.db.get_apply_entry(ids[0]).unwrap().unwrap();
        assert_eq!(entry.status, ApplyStatus::Pending);
        assert_eq!(entry.resolved_order_id, Some(45));
        assert_eq!(
            entry.resolved_order_type,
            Some(sync_database::OrderType::SalesOrder)
        );
        assert_eq!(entry.action.as_deref(), Some("Tasks.assignManually"));
        assert_eq!(entry.courier_task_id.as_deref(), Some("task-9"));
        assert!(entry.raw_payload.contains("Dana"));
    }

    #[tokio::test]
    async fn unknown_action_is_recorded_as_error_entry() {
        let state = state();
        let body = json!({
            "externalId": "45",
            "reference": "SO45",
            "action": "Tasks.delete"
        })
        .to_string();
        let (status, ack) =
            handle_webhook(State(state.clone()), auth_headers(), body).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!ack.0.success);

        // Error entries are audit records; they never become due.
        assert!(state.db.due_apply_ids(10).unwrap().is_empty());
        let entry = state.db.get_apply_entry(1).unwrap().unwrap();
        assert_eq!(entry.status, ApplyStatus::Error);
        assert_eq!(
            entry.last_error.as_deref(),
            Some("ignored webhook action: Tasks.delete")
        );
    }

    #[tokio::test]
    async fn eta_updates_leave_no_trace() {
        let state = state();
        let body = json!({
            "externalId": "45",
            "action": "Routes.updateETAs"
        })
        .to_string();
        let (status, ack) =
            handle_webhook(State(state.clone()), auth_headers(), body).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!ack.0.success);
        assert!(state.db.get_apply_entry(1).unwrap().is_none());
    }
}
