#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;
use watcher::errors::{Error, Result};
use watcher::manager::{Clock, SubscriptionManager};
use watcher::model::{DeviceId, Reading, Subscription, UserId};
use watcher::notify::Notifier;
use watcher::poll::{PollConfig, PollCycle};
use watcher::store::{MemoryStore, SubscriptionStore};
use watcher::telemetry::TelemetrySource;

/// Telemetry whose device list and latest readings are set by the test.
#[derive(Default)]
pub struct ScriptedTelemetry {
    devices: Mutex<BTreeSet<DeviceId>>,
    readings: Mutex<HashMap<DeviceId, Reading>>,
    broken: Mutex<HashSet<DeviceId>>,
}

impl ScriptedTelemetry {
    pub fn with_devices(devices: &[&str]) -> Self {
        let telemetry = Self::default();
        for device in devices {
            telemetry.add_device(device);
        }
        telemetry
    }

    pub fn add_device(&self, device: &str) {
        self.devices.lock().unwrap().insert(device.to_string());
    }

    pub fn remove_device(&self, device: &str) {
        self.devices.lock().unwrap().remove(device);
        self.readings.lock().unwrap().remove(device);
    }

    pub fn set_reading(&self, device: &str, timestamp: i64, moisture: f64) {
        self.readings
            .lock()
            .unwrap()
            .insert(device.to_string(), Reading { timestamp, moisture });
    }

    /// Lookups for `device` fail until further notice.
    pub fn break_device(&self, device: &str) {
        self.broken.lock().unwrap().insert(device.to_string());
    }
}

#[async_trait]
impl TelemetrySource for ScriptedTelemetry {
    async fn list_devices(&self) -> Result<BTreeSet<DeviceId>> {
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn latest_reading(&self, device: &str) -> Result<Option<Reading>> {
        if self.broken.lock().unwrap().contains(device) {
            return Err(Error::Telemetry(format!("{} unreachable", device)));
        }
        Ok(self.readings.lock().unwrap().get(device).copied())
    }
}

/// Records every delivered message; can be told to fail or stall.
#[derive(Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<(UserId, String)>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
    stalled_users: Mutex<HashSet<UserId>>,
}

impl RecordingNotifier {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn stall_user(&self, user_id: UserId) {
        self.stalled_users.lock().unwrap().insert(user_id);
    }

    pub fn delivered(&self) -> Vec<(UserId, String)> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, user_id: UserId, text: &str) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let stalled = self.stalled_users.lock().unwrap().contains(&user_id);
        if stalled {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Telemetry("transport down".to_string()));
        }

        self.delivered
            .lock()
            .unwrap()
            .push((user_id, text.to_string()));
        Ok(())
    }
}

/// Store wrapper whose full scan can be made to fail.
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub scan_fails: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            scan_fails: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SubscriptionStore for FlakyStore {
    async fn find_by_user_and_device(
        &self,
        user_id: UserId,
        device: &str,
    ) -> Result<Option<Subscription>> {
        self.inner.find_by_user_and_device(user_id, device).await
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Subscription>> {
        self.inner.list_by_user(user_id).await
    }

    async fn list_all(&self) -> Result<Vec<Subscription>> {
        if self.scan_fails.load(Ordering::SeqCst) {
            return Err(Error::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.list_all().await
    }

    async fn insert(&self, user_id: UserId, device: &str, watermark: i64) -> Result<Subscription> {
        self.inner.insert(user_id, device, watermark).await
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool> {
        self.inner.delete_by_id(id).await
    }

    async fn update_watermark(&self, id: Uuid, watermark: i64) -> Result<bool> {
        self.inner.update_watermark(id, watermark).await
    }
}

pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0
    }
}

/// Manager and poll cycle sharing one store, telemetry and notifier.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub telemetry: Arc<ScriptedTelemetry>,
    pub notifier: Arc<RecordingNotifier>,
    pub manager: Arc<SubscriptionManager>,
    pub poll: PollCycle,
}

impl Harness {
    pub fn new(devices: &[&str], now: i64) -> Self {
        Self::with_config(devices, now, PollConfig::default())
    }

    pub fn with_config(devices: &[&str], now: i64, config: PollConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let telemetry = Arc::new(ScriptedTelemetry::with_devices(devices));
        let notifier = Arc::new(RecordingNotifier::default());

        let manager = Arc::new(SubscriptionManager::new(
            store.clone(),
            telemetry.clone(),
            Arc::new(FixedClock(now)),
        ));
        let poll = PollCycle::new(store.clone(), telemetry.clone(), notifier.clone(), config);

        Self {
            store,
            telemetry,
            notifier,
            manager,
            poll,
        }
    }

    pub async fn watermark(&self, user_id: UserId, device: &str) -> Option<i64> {
        self.store
            .find_by_user_and_device(user_id, device)
            .await
            .unwrap()
            .map(|s| s.watermark)
    }
}
