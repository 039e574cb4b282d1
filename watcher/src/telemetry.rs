//! Read access to device telemetry.
//!
//! Devices live as top-level keys of a Firebase Realtime Database; each device
//! node holds readings keyed in chronological order:
//!
//! ```text
//! {
//!   "soil-1": {
//!     "-NxA1...": { "timestamp": 1717430400, "moisture": 41.5 },
//!     "-NxA2...": { "timestamp": 1717430460, "moisture": 42.0 }
//!   }
//! }
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::errors::{Error, Result};
use crate::model::{DeviceId, Reading};
use crate::validate::validate_device;

#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Devices currently present in the telemetry store.
    async fn list_devices(&self) -> Result<BTreeSet<DeviceId>>;

    /// Most recent reading of `device`, or `None` if it has none (or no
    /// longer exists).
    async fn latest_reading(&self, device: &str) -> Result<Option<Reading>>;
}

/// Telemetry source backed by the Firebase Realtime Database REST API.
#[derive(Debug, Clone)]
pub struct FirebaseTelemetry {
    client: reqwest::Client,
    base_url: String,
    auth: Option<String>,
}

impl FirebaseTelemetry {
    pub fn new(database_url: &str, auth: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: database_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}/{}.json", self.base_url, path);
        let mut request = self.client.get(&url).query(query);
        if let Some(auth) = &self.auth {
            request = request.query(&[("auth", auth.as_str())]);
        }

        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl TelemetrySource for FirebaseTelemetry {
    async fn list_devices(&self) -> Result<BTreeSet<DeviceId>> {
        let body = self.get("", &[("shallow", "true")]).await?;
        let devices = parse_devices(body)?;
        debug!(count = devices.len(), "Fetched device list");
        Ok(devices)
    }

    async fn latest_reading(&self, device: &str) -> Result<Option<Reading>> {
        validate_device(device)?;
        let body = self
            .get(device, &[("orderBy", "\"$key\""), ("limitToLast", "1")])
            .await?;
        parse_latest(body)
    }
}

#[derive(Debug, Deserialize)]
struct RawReading {
    timestamp: serde_json::Number,
    moisture: f64,
}

fn parse_devices(body: Value) -> Result<BTreeSet<DeviceId>> {
    match body {
        Value::Null => Ok(BTreeSet::new()),
        Value::Object(map) => Ok(map.into_iter().map(|(key, _)| key).collect()),
        other => Err(Error::Telemetry(format!(
            "Expected device map, got {}",
            other
        ))),
    }
}

fn parse_latest(body: Value) -> Result<Option<Reading>> {
    let map = match body {
        Value::Null => return Ok(None),
        Value::Object(map) => map,
        other => {
            return Err(Error::Telemetry(format!(
                "Expected reading map, got {}",
                other
            )))
        }
    };

    // limitToLast=1 leaves a single entry; keys sort chronologically anyway
    let Some((_, value)) = map.into_iter().last() else {
        return Ok(None);
    };

    let raw: RawReading = serde_json::from_value(value)?;
    let timestamp = raw
        .timestamp
        .as_i64()
        .or_else(|| raw.timestamp.as_f64().map(|t| t.floor() as i64))
        .ok_or_else(|| Error::Telemetry(format!("Bad timestamp {}", raw.timestamp)))?;

    if !raw.moisture.is_finite() {
        return Err(Error::Telemetry(format!("Bad moisture {}", raw.moisture)));
    }

    Ok(Some(Reading {
        timestamp,
        moisture: raw.moisture,
    }))
}
