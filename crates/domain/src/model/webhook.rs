use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Lifecycle of a claimed webhook event. A claimed event is never processed
/// again, whatever its status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WebhookEventStatus {
    Processing,
    Processed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWebhookEvent {
    pub id: String,
    pub event_type: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEventRecord {
    pub id: String,
    pub event_type: String,
    pub payload: String,
    pub status: WebhookEventStatus,
    pub error: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}
