//! Subscription storage.
//!
//! Every operation is atomic per record: the (user, device) uniqueness check
//! happens together with the insert, and watermark updates only ever move
//! forward. Callers never need a lock of their own.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::errors::{Error, Result};
use crate::model::{Subscription, UserId};

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn find_by_user_and_device(
        &self,
        user_id: UserId,
        device: &str,
    ) -> Result<Option<Subscription>>;

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Subscription>>;

    /// Snapshot of every subscription, used once per poll tick.
    async fn list_all(&self) -> Result<Vec<Subscription>>;

    /// Fails with [`Error::DuplicateSubscription`] if the pair already exists.
    async fn insert(&self, user_id: UserId, device: &str, watermark: i64) -> Result<Subscription>;

    /// Returns `false` when no record had this id.
    async fn delete_by_id(&self, id: Uuid) -> Result<bool>;

    /// Advances the watermark if `watermark` is newer than the stored one.
    ///
    /// Returns `false` (not an error) when the value is stale or the record
    /// no longer exists.
    async fn update_watermark(&self, id: Uuid, watermark: i64) -> Result<bool>;
}

/// Process-local store, used by tests and `--store memory` runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, Subscription>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn find_by_user_and_device(
        &self,
        user_id: UserId,
        device: &str,
    ) -> Result<Option<Subscription>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|s| s.user_id == user_id && s.device == device)
            .cloned())
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Subscription>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Subscription>> {
        let records = self.records.read().await;
        Ok(records.values().cloned().collect())
    }

    async fn insert(&self, user_id: UserId, device: &str, watermark: i64) -> Result<Subscription> {
        let mut records = self.records.write().await;
        if records
            .values()
            .any(|s| s.user_id == user_id && s.device == device)
        {
            return Err(Error::DuplicateSubscription);
        }

        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id,
            device: device.to_string(),
            watermark,
        };
        records.insert(subscription.id, subscription.clone());
        debug!(subscription = %subscription.id, user_id, device, "Inserted subscription");
        Ok(subscription)
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool> {
        Ok(self.records.write().await.remove(&id).is_some())
    }

    async fn update_watermark(&self, id: Uuid, watermark: i64) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(s) if watermark > s.watermark => {
                s.watermark = watermark;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
