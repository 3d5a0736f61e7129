use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    CenterLookup, CenterSubscriptions, LookupError, StoreError, SubscriptionStore, WatermarkStore,
    group_by_center,
};
use crate::domain::{AvalancheCenter, SubscriberEmail, Subscription, ZoneId};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct SubscriptionRecord {
    id: Uuid,
    email: String,
    zone_id: String,
    created_at: DateTime<Utc>,
    last_notified: Option<DateTime<Utc>>,
}

impl TryFrom<SubscriptionRecord> for Subscription {
    type Error = StoreError;

    fn try_from(r: SubscriptionRecord) -> Result<Self, Self::Error> {
        let email = SubscriberEmail::parse(r.email)
            .map_err(|e| StoreError::CorruptRecord(format!("subscription {}: {e}", r.id)))?;
        let zone_id = ZoneId::parse(&r.zone_id)
            .map_err(|e| StoreError::CorruptRecord(format!("subscription {}: {e}", r.id)))?;
        Ok(Subscription {
            id: r.id,
            email,
            zone_id,
            created_at: r.created_at,
            last_notified: r.last_notified,
        })
    }
}

/// Invalid rows are logged and skipped so one bad record cannot block the rest.
fn into_subscriptions(rows: Vec<SubscriptionRecord>) -> Vec<Subscription> {
    rows.into_iter()
        .filter_map(|r| match Subscription::try_from(r) {
            Ok(s) => Some(s),
            Err(err) => {
                tracing::warn!(
                    err.cause_chain = ?err,
                    "Skipping the subscription. \
                    The stored details are invalid."
                );
                None
            }
        })
        .collect()
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PgStore {
    #[tracing::instrument(name = "List subscriptions grouped by center", skip(self))]
    async fn list_active_by_center(&self) -> Result<Vec<CenterSubscriptions>, StoreError> {
        let rows = sqlx::query_as::<_, SubscriptionRecord>(
            r#"
            SELECT id, email, zone_id, created_at, last_notified
            FROM subscriptions
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(group_by_center(into_subscriptions(rows)))
    }

    #[tracing::instrument(name = "List subscriptions for zone", skip(self, zone_id), fields(zone_id = %zone_id))]
    async fn list_by_zone(&self, zone_id: &ZoneId) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query_as::<_, SubscriptionRecord>(
            r#"
            SELECT id, email, zone_id, created_at, last_notified
            FROM subscriptions
            WHERE zone_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(zone_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(into_subscriptions(rows))
    }

    #[tracing::instrument(name = "List subscriptions for email", skip(self, email))]
    async fn list_by_email(
        &self,
        email: &SubscriberEmail,
    ) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query_as::<_, SubscriptionRecord>(
            r#"
            SELECT id, email, zone_id, created_at, last_notified
            FROM subscriptions
            WHERE email = $1
            ORDER BY created_at
            "#,
        )
        .bind(email.as_ref())
        .fetch_all(&self.pool)
        .await?;

        Ok(into_subscriptions(rows))
    }

    #[tracing::instrument(
        name = "Saving new subscription in the database",
        skip(self, subscription),
        fields(subscription_id = %subscription.id)
    )]
    async fn create(&self, subscription: &Subscription) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (id, email, zone_id, created_at, last_notified)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(subscription.id)
        .bind(subscription.email.as_ref())
        .bind(subscription.zone_id.to_string())
        .bind(subscription.created_at)
        .bind(subscription.last_notified)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(name = "Deleting subscriptions", skip(self, email, zone_id), fields(zone_id = %zone_id))]
    async fn delete(&self, email: &SubscriberEmail, zone_id: &ZoneId) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM subscriptions WHERE email = $1 AND zone_id = $2
            "#,
        )
        .bind(email.as_ref())
        .bind(zone_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(name = "Updating last notified time", skip(self))]
    async fn update_last_notified(
        &self,
        subscription_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE subscriptions SET last_notified = $2 WHERE id = $1
            "#,
        )
        .bind(subscription_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl WatermarkStore for PgStore {
    #[tracing::instrument(name = "Reading forecast watermark", skip(self, zone_id), fields(zone_id = %zone_id))]
    async fn get(&self, zone_id: &ZoneId) -> Result<Option<DateTime<Utc>>, StoreError> {
        let last_issued = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            SELECT last_issued FROM forecast_watermarks WHERE zone_id = $1
            "#,
        )
        .bind(zone_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(last_issued)
    }

    #[tracing::instrument(name = "Advancing forecast watermark", skip(self, zone_id), fields(zone_id = %zone_id))]
    async fn upsert(&self, zone_id: &ZoneId, issued_at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO forecast_watermarks (zone_id, last_issued)
            VALUES ($1, $2)
            ON CONFLICT (zone_id) DO UPDATE
            SET last_issued = GREATEST(forecast_watermarks.last_issued, EXCLUDED.last_issued)
            "#,
        )
        .bind(zone_id.to_string())
        .bind(issued_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CenterLookup for PgStore {
    #[tracing::instrument(name = "Looking up avalanche center", skip(self))]
    async fn get(&self, center_id: &str) -> Result<AvalancheCenter, LookupError> {
        sqlx::query_as::<_, AvalancheCenter>(
            r#"
            SELECT center_id AS id, name, base_url AS url
            FROM avalanche_centers
            WHERE LOWER(center_id) = LOWER($1)
            "#,
        )
        .bind(center_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?
        .ok_or_else(|| LookupError::NotFound(center_id.to_string()))
    }

    #[tracing::instrument(name = "Listing active avalanche centers", skip(self))]
    async fn list_active(&self) -> Result<Vec<AvalancheCenter>, StoreError> {
        let centers = sqlx::query_as::<_, AvalancheCenter>(
            r#"
            SELECT center_id AS id, name, base_url AS url
            FROM avalanche_centers
            WHERE active = TRUE
            ORDER BY center_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(centers)
    }
}
