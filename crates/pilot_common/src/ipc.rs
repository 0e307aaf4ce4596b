//! Control-socket protocol between pilotctl and the daemon.
//!
//! Newline-delimited JSON: one `Request` per line in, one `Response` per
//! line out.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Status,
    Chat,
    Pause,
    Resume,
    Diagnostic,
    Cycle,
    /// Confirm and execute a queued action
    Approve,
    /// Reject a queued action
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn new(method: Method) -> Self {
        Self { method, params: Value::Null }
    }

    pub fn chat(message: &str) -> Self {
        Self { method: Method::Chat, params: serde_json::json!({ "message": message }) }
    }

    pub fn queue_decision(method: Method, action_id: &str) -> Self {
        Self { method, params: serde_json::json!({ "action_id": action_id }) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Self { ok: true, data: Some(data), error: None }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self { ok: false, data: None, error: Some(message.into()) }
    }
}

/// Payload of a `status` reply.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StatusData {
    pub version: String,
    pub uptime_secs: u64,
    pub lifecycle: String,
    pub autonomy: String,
    pub leads_found_this_week: u32,
    pub leads_to_find: u32,
    pub emails_sent_this_week: u32,
    pub emails_to_send: u32,
    pub open_diagnostics: usize,
    pub pending_confirmations: usize,
    pub total_brain_cycles: u64,
    pub last_brain_cycle_at: Option<String>,
    /// Counters for this daemon process only
    pub session: crate::metrics::MetricsSnapshot,
}
