// src/persistence/types.rs
// The four record shapes the façade moves in and out of the store (§3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Merchant,
    Pp,
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserType::Merchant => write!(f, "merchant"),
            UserType::Pp => write!(f, "pp"),
        }
    }
}

impl std::str::FromStr for UserType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merchant" => Ok(UserType::Merchant),
            "pp" => Ok(UserType::Pp),
            other => Err(anyhow::anyhow!("unknown user_type: {other}")),
        }
    }
}

/// A single inbound event as it lands on the raw stream.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub messages_id: String,
    pub user_id: String,
    pub username: String,
    pub user_type: UserType,
    pub text: String,
    pub timestamp: f64,
}

/// An in-flight, not-yet-flushed burst for one chat.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub user_id: String,
    pub messages_id: String,
    pub username: String,
    pub user_type: UserType,
    pub text: String,
    pub start_ts: f64,
    pub last_ts: f64,
    pub count: u64,
}

/// A flushed, escalation-eligible fused message.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalMessage {
    pub stream_id: String,
    pub user_id: String,
    pub messages_id: String,
    pub username: String,
    pub user_type: UserType,
    pub text: String,
    pub start_ts: f64,
    pub end_ts: f64,
    pub count: u64,
}

/// Derived introspection snapshot for one chat (supplements the distilled
/// spec; mirrors the original source's `get_chat_status`).
#[derive(Debug, Clone, Serialize)]
pub struct ChatStatus {
    pub has_active_series: bool,
    pub active_series: Option<SeriesView>,
    pub deadline_ts: Option<f64>,
    pub deadline_seconds_left: Option<f64>,
    pub metrics: HashMap<String, u64>,
    pub worker_running: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesView {
    pub user_id: String,
    pub username: String,
    pub user_type: UserType,
    pub count: u64,
    pub start_ts: f64,
    pub last_ts: f64,
}

impl From<&Series> for SeriesView {
    fn from(s: &Series) -> Self {
        Self {
            user_id: s.user_id.clone(),
            username: s.username.clone(),
            user_type: s.user_type,
            count: s.count,
            start_ts: s.start_ts,
            last_ts: s.last_ts,
        }
    }
}
