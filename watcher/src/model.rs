use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Telegram chat id of the subscribing user.
pub type UserId = i64;

/// Device key as it appears at the top level of the telemetry database.
pub type DeviceId = String;

/// One user's interest in one device's readings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: UserId,
    pub device: DeviceId,
    /// Timestamp (seconds since epoch) of the newest reading already delivered.
    pub watermark: i64,
}

/// Latest telemetry value of a device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: i64,
    pub moisture: f64,
}

/// Result of a subscribe request, rendered by the command layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    AlreadySubscribed,
    DeviceNotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Unsubscribed,
    NotSubscribed,
}

/// REST API response wrapper
#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub data: Vec<Subscription>,
    pub total: usize,
}

/// Text sent to a subscriber when a new reading arrives.
pub fn format_message(device: &str, reading: &Reading) -> String {
    format!("Moisture {:.1} on {}", reading.moisture, device)
}
