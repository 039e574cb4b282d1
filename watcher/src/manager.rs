//! Request-side half of the engine: subscribe, unsubscribe and listings.

use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::{Error, Result};
use crate::model::{DeviceId, SubscribeOutcome, UnsubscribeOutcome, UserId};
use crate::store::SubscriptionStore;
use crate::telemetry::TelemetrySource;

/// Source of the current time in seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

pub struct SubscriptionManager {
    store: Arc<dyn SubscriptionStore>,
    telemetry: Arc<dyn TelemetrySource>,
    clock: Arc<dyn Clock>,
}

impl SubscriptionManager {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        telemetry: Arc<dyn TelemetrySource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            telemetry,
            clock,
        }
    }

    /// Devices known to the telemetry source, fetched fresh on every call.
    pub async fn list_devices(&self) -> Result<Vec<DeviceId>> {
        Ok(self.telemetry.list_devices().await?.into_iter().collect())
    }

    pub async fn list_subscriptions(&self, user_id: UserId) -> Result<Vec<DeviceId>> {
        let mut devices: Vec<DeviceId> = self
            .store
            .list_by_user(user_id)
            .await?
            .into_iter()
            .map(|s| s.device)
            .collect();
        devices.sort();
        Ok(devices)
    }

    pub async fn subscribe(&self, user_id: UserId, device: &str) -> Result<SubscribeOutcome> {
        if !self.telemetry.list_devices().await?.contains(device) {
            debug!(user_id, device, "Subscribe to unknown device");
            return Ok(SubscribeOutcome::DeviceNotFound);
        }

        if self
            .store
            .find_by_user_and_device(user_id, device)
            .await?
            .is_some()
        {
            return Ok(SubscribeOutcome::AlreadySubscribed);
        }

        // A concurrent subscribe may win between the lookup and the insert;
        // the store's unique check settles it.
        match self.store.insert(user_id, device, self.clock.now()).await {
            Ok(subscription) => {
                info!(
                    user_id,
                    device,
                    subscription = %subscription.id,
                    watermark = subscription.watermark,
                    "User subscribed"
                );
                Ok(SubscribeOutcome::Subscribed)
            }
            Err(Error::DuplicateSubscription) => Ok(SubscribeOutcome::AlreadySubscribed),
            Err(e) => Err(e),
        }
    }

    pub async fn unsubscribe(&self, user_id: UserId, device: &str) -> Result<UnsubscribeOutcome> {
        let Some(subscription) = self.store.find_by_user_and_device(user_id, device).await? else {
            return Ok(UnsubscribeOutcome::NotSubscribed);
        };

        if self.store.delete_by_id(subscription.id).await? {
            info!(user_id, device, subscription = %subscription.id, "User unsubscribed");
            Ok(UnsubscribeOutcome::Unsubscribed)
        } else {
            // Removed by a concurrent unsubscribe
            Ok(UnsubscribeOutcome::NotSubscribed)
        }
    }
}
