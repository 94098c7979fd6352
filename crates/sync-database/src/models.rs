//! Queue model types shared by both state machines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of ERP order, resolved once at ingestion and carried as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    SalesOrder,
    ReturnAuthorization,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SalesOrder => "salesorder",
            Self::ReturnAuthorization => "returnauthorization",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "returnauthorization" => Self::ReturnAuthorization,
            _ => Self::SalesOrder,
        }
    }

    /// Resolve from a document reference prefix (`SO…` / `RMA…`).
    pub fn from_reference(reference: &str) -> Option<Self> {
        let r = reference.trim();
        if r.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("rma")) {
            Some(Self::ReturnAuthorization)
        } else if r.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("so")) {
            Some(Self::SalesOrder)
        } else {
            None
        }
    }
}

/// Export queue entry status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    /// Created by trigger logic, awaiting the builder pass.
    Pending,
    /// Claimed by a pass (builder or dispatcher); the claim fence.
    Processing,
    /// Payload built, awaiting remote dispatch.
    Processed,
    /// Dispatch failed with a retryable error; due again at next_run_at.
    Retry,
    /// Delivered (or nothing to deliver). Terminal.
    Success,
    /// Permanent failure, inspectable via last_error. Terminal.
    Error,
}

impl ExportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Retry => "retry",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "processing" => Self::Processing,
            "processed" => Self::Processed,
            "retry" => Self::Retry,
            "success" => Self::Success,
            "error" => Self::Error,
            _ => Self::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }

    /// Statuses that count against the one-outstanding-entry-per-order
    /// invariant enforced by consolidation.
    pub const OUTSTANDING: [ExportStatus; 3] =
        [Self::Pending, Self::Processing, Self::Processed];
}

/// Apply queue entry status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyStatus {
    Pending,
    Retry,
    /// Applied (or terminally skipped with a note). Terminal.
    Processed,
    /// Permanent failure or audit record of an ignored event. Terminal.
    Error,
}

impl ApplyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retry => "retry",
            Self::Processed => "processed",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "retry" => Self::Retry,
            "processed" => Self::Processed,
            "error" => Self::Error,
            _ => Self::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Error)
    }
}

/// What an export entry asks the dispatcher to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportContext {
    Create,
    Edit,
    Copy,
    Delete,
    /// Re-release flow: archive the prior courier linkage, then create.
    /// Rewritten to `Create` by the builder pass.
    Backorder,
}

impl ExportContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Edit => "edit",
            Self::Copy => "copy",
            Self::Delete => "delete",
            Self::Backorder => "backorder",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "edit" => Self::Edit,
            "copy" => Self::Copy,
            "delete" => Self::Delete,
            "backorder" => Self::Backorder,
            _ => Self::Create,
        }
    }
}

/// Outbound queue entry: one requested synchronization of an order to the
/// courier service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportQueueEntry {
    pub id: i64,
    pub order_id: i64,
    pub order_type: OrderType,
    pub context: ExportContext,
    pub courier_task_id: Option<String>,
    pub status: ExportStatus,
    pub attempts: i32,
    pub next_run_at: DateTime<Utc>,
    /// Serialized task payload, attached by the builder pass.
    pub payload: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a new export entry.
#[derive(Debug, Clone)]
pub struct NewExportEntry {
    pub order_id: i64,
    pub order_type: OrderType,
    pub context: ExportContext,
    pub courier_task_id: Option<String>,
    pub payload: Option<String>,
}

/// Inbound queue entry: one webhook event awaiting application to an order.
/// The raw payload is immutable once created; resolved fields are metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyQueueEntry {
    pub id: i64,
    pub raw_payload: String,
    pub status: ApplyStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub resolved_order_id: Option<i64>,
    pub resolved_order_type: Option<OrderType>,
    pub action: Option<String>,
    pub reference: Option<String>,
    pub courier_task_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a new apply entry.
#[derive(Debug, Clone)]
pub struct NewApplyEntry {
    pub raw_payload: String,
    pub status: ApplyStatus,
    pub last_error: Option<String>,
    pub resolved_order_id: Option<i64>,
    pub resolved_order_type: Option<OrderType>,
    pub action: Option<String>,
    pub reference: Option<String>,
    pub courier_task_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_type_from_reference_prefixes() {
        assert_eq!(OrderType::from_reference("SO45"), Some(OrderType::SalesOrder));
        assert_eq!(
            OrderType::from_reference("RMA102"),
            Some(OrderType::ReturnAuthorization)
        );
        assert_eq!(OrderType::from_reference("so9"), Some(OrderType::SalesOrder));
        assert_eq!(OrderType::from_reference("ZO12"), None);
        assert_eq!(OrderType::from_reference(""), None);
    }

    #[test]
    fn order_type_from_reference_multibyte_input() {
        // References arrive from external webhook payloads, so prefix checks
        // must not assume char boundaries at fixed byte offsets.
        assert_eq!(OrderType::from_reference("ééX"), None);
        assert_eq!(OrderType::from_reference("日本語"), None);
        assert_eq!(OrderType::from_reference("é"), None);
    }

    #[test]
    fn export_status_round_trip() {
        for status in [
            ExportStatus::Pending,
            ExportStatus::Processing,
            ExportStatus::Processed,
            ExportStatus::Retry,
            ExportStatus::Success,
            ExportStatus::Error,
        ] {
            assert_eq!(ExportStatus::from_str(status.as_str()), status);
        }
    }

    #[test]
    fn export_status_terminality() {
        assert!(ExportStatus::Success.is_terminal());
        assert!(ExportStatus::Error.is_terminal());
        assert!(!ExportStatus::Processed.is_terminal());
        assert!(!ExportStatus::Retry.is_terminal());
    }

    #[test]
    fn apply_status_round_trip() {
        for status in [
            ApplyStatus::Pending,
            ApplyStatus::Retry,
            ApplyStatus::Processed,
            ApplyStatus::Error,
        ] {
            assert_eq!(ApplyStatus::from_str(status.as_str()), status);
        }
    }

    #[test]
    fn export_context_round_trip() {
        for context in [
            ExportContext::Create,
            ExportContext::Edit,
            ExportContext::Copy,
            ExportContext::Delete,
            ExportContext::Backorder,
        ] {
            assert_eq!(ExportContext::from_str(context.as_str()), context);
        }
    }
}
