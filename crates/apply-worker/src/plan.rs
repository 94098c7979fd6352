//! Translation of webhook actions into order patches.

use chrono::NaiveDate;
use order_store::OrderPatch;
use webhook_intake::WebhookEvent;

/// Note recorded when an event applies cleanly but changes nothing.
pub const NO_CHANGE_NOTE: &str = "processed but no order fields updated";

/// Why an event could not be turned into a patch.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("unparsable event date: {0}")]
    BadDate(String),
}

/// Public tracking page link for an order, keyed by its external id.
pub fn tracking_link(base_url: &str, external_id: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(external_id.as_bytes()).collect();
    format!("{base_url}?externalId={encoded}")
}

/// Parse the courier service's compact `YYYYMMDD` date form.
pub fn parse_compact_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y%m%d").ok()
}

/// Work out what an event writes back to its order. An empty patch means
/// the event is acknowledged without touching the order.
pub fn plan_patch(
    action: &str,
    event: &WebhookEvent,
    external_id: &str,
    tracking_base_url: &str,
) -> Result<OrderPatch, PlanError> {
    let mut patch = OrderPatch::default();
    match action {
        "Tasks.assignManually" => {
            patch.tracking_link = Some(Some(tracking_link(tracking_base_url, external_id)));
            patch.released = Some(true);
            let driver = event.assignee_first_name().unwrap_or_default().to_string();
            patch.driver = Some(Some(driver));
        }
        "v3.Optimization.optimizeDates" | "v3.Optimization.optimizeRoutes" | "Routes.setOrder" => {
            if let Some(stop) = event.route_order() {
                patch.route_stop = Some(Some(stop));
            }
        }
        "Tasks.moveToDate" | "Tasks.update" => {
            if let Some(raw) = event.event_date() {
                let date =
                    parse_compact_date(&raw).ok_or_else(|| PlanError::BadDate(raw.clone()))?;
                patch.ship_date = Some(Some(date));
            }
        }
        // Routes.reassign and Routes.swap are queued for audit but carry
        // nothing we write back today.
        _ => {}
    }
    Ok(patch)
}
