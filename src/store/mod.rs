//! Persistence contracts consumed by the dispatcher and the subscription service.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{AvalancheCenter, SubscriberEmail, Subscription, ZoneId};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database operation failed")]
    Database(#[from] sqlx::Error),
    #[error("stored record is invalid: {0}")]
    CorruptRecord(String),
}

#[derive(thiserror::Error, Debug)]
pub enum LookupError {
    #[error("avalanche center {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// All subscriptions whose zone identifier belongs to one center.
#[derive(Debug, Clone)]
pub struct CenterSubscriptions {
    pub center_id: String,
    pub subscriptions: Vec<Subscription>,
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Active subscriptions grouped by the center segment of their zone id.
    async fn list_active_by_center(&self) -> Result<Vec<CenterSubscriptions>, StoreError>;
    async fn list_by_zone(&self, zone_id: &ZoneId) -> Result<Vec<Subscription>, StoreError>;
    async fn list_by_email(&self, email: &SubscriberEmail)
    -> Result<Vec<Subscription>, StoreError>;
    async fn create(&self, subscription: &Subscription) -> Result<(), StoreError>;
    /// Removes every subscription matching the pair, returning how many were removed.
    async fn delete(&self, email: &SubscriberEmail, zone_id: &ZoneId) -> Result<u64, StoreError>;
    async fn update_last_notified(
        &self,
        subscription_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn get(&self, zone_id: &ZoneId) -> Result<Option<DateTime<Utc>>, StoreError>;
    /// Records `issued_at` for the zone; an older value never replaces a newer one.
    async fn upsert(&self, zone_id: &ZoneId, issued_at: DateTime<Utc>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CenterLookup: Send + Sync {
    async fn get(&self, center_id: &str) -> Result<AvalancheCenter, LookupError>;
    async fn list_active(&self) -> Result<Vec<AvalancheCenter>, StoreError>;
}

/// Groups subscriptions by center, keeping centers in first-seen order.
pub(crate) fn group_by_center(subscriptions: Vec<Subscription>) -> Vec<CenterSubscriptions> {
    let mut groups: Vec<CenterSubscriptions> = Vec::new();
    for subscription in subscriptions {
        match groups
            .iter_mut()
            .find(|g| g.center_id == subscription.center_id())
        {
            Some(group) => group.subscriptions.push(subscription),
            None => groups.push(CenterSubscriptions {
                center_id: subscription.center_id().to_string(),
                subscriptions: vec![subscription],
            }),
        }
    }
    groups
}
