//! Webhook intake: the HTTP edge of the inbound sync path.
//!
//! The courier service POSTs task events here. Intake authenticates the
//! caller, filters the event against the allow-list, and records it on the
//! apply queue. It never touches orders itself; the apply worker does that.

mod event;
mod server;

pub use event::{IntakeDecision, WebhookEvent, ALLOWED_ACTIONS};
pub use server::{router, IntakeState, WebhookAck};
