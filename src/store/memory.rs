use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    CenterLookup, CenterSubscriptions, LookupError, StoreError, SubscriptionStore, WatermarkStore,
    group_by_center,
};
use crate::domain::{AvalancheCenter, SubscriberEmail, Subscription, ZoneId};

#[derive(Default)]
struct State {
    subscriptions: Vec<Subscription>,
    watermarks: HashMap<ZoneId, DateTime<Utc>>,
    centers: Vec<AvalancheCenter>,
}

/// Process-local store, used for local runs without Postgres and in tests.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_center(mut self, center: AvalancheCenter) -> Self {
        self.state.get_mut().centers.push(center);
        self
    }

    pub fn with_watermark(mut self, zone_id: ZoneId, issued_at: DateTime<Utc>) -> Self {
        self.state.get_mut().watermarks.insert(zone_id, issued_at);
        self
    }

    pub async fn subscriptions(&self) -> Vec<Subscription> {
        self.state.read().await.subscriptions.clone()
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryStore {
    async fn list_active_by_center(&self) -> Result<Vec<CenterSubscriptions>, StoreError> {
        let subscriptions = self.state.read().await.subscriptions.clone();
        Ok(group_by_center(subscriptions))
    }

    async fn list_by_zone(&self, zone_id: &ZoneId) -> Result<Vec<Subscription>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .iter()
            .filter(|s| &s.zone_id == zone_id)
            .cloned()
            .collect())
    }

    async fn list_by_email(
        &self,
        email: &SubscriberEmail,
    ) -> Result<Vec<Subscription>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .iter()
            .filter(|s| &s.email == email)
            .cloned()
            .collect())
    }

    async fn create(&self, subscription: &Subscription) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .subscriptions
            .push(subscription.clone());
        Ok(())
    }

    async fn delete(&self, email: &SubscriberEmail, zone_id: &ZoneId) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let before = state.subscriptions.len();
        state
            .subscriptions
            .retain(|s| !(&s.email == email && &s.zone_id == zone_id));
        Ok((before - state.subscriptions.len()) as u64)
    }

    async fn update_last_notified(
        &self,
        subscription_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(subscription) = state
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription_id)
        {
            subscription.mark_notified(at);
        }
        Ok(())
    }
}

#[async_trait]
impl WatermarkStore for InMemoryStore {
    async fn get(&self, zone_id: &ZoneId) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.state.read().await.watermarks.get(zone_id).copied())
    }

    async fn upsert(&self, zone_id: &ZoneId, issued_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let entry = state.watermarks.entry(zone_id.clone()).or_insert(issued_at);
        if issued_at > *entry {
            *entry = issued_at;
        }
        Ok(())
    }
}

#[async_trait]
impl CenterLookup for InMemoryStore {
    async fn get(&self, center_id: &str) -> Result<AvalancheCenter, LookupError> {
        self.state
            .read()
            .await
            .centers
            .iter()
            .find(|c| c.id.eq_ignore_ascii_case(center_id))
            .cloned()
            .ok_or_else(|| LookupError::NotFound(center_id.to_string()))
    }

    async fn list_active(&self) -> Result<Vec<AvalancheCenter>, StoreError> {
        Ok(self.state.read().await.centers.clone())
    }
}
