use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{SubscriberEmail, ValidationError, ZoneId};

/// A validated subscribe request, not yet persisted.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub email: SubscriberEmail,
    pub zone_id: ZoneId,
}

impl NewSubscription {
    pub fn parse(email: String, zone_id: &str) -> Result<Self, ValidationError> {
        let email = SubscriberEmail::parse(email)?;
        let zone_id = ZoneId::parse(zone_id)?;
        Ok(Self { email, zone_id })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub email: SubscriberEmail,
    pub zone_id: ZoneId,
    pub created_at: DateTime<Utc>,
    pub last_notified: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn new(new_subscription: NewSubscription, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: new_subscription.email,
            zone_id: new_subscription.zone_id,
            created_at: now,
            last_notified: None,
        }
    }

    pub fn center_id(&self) -> &str {
        self.zone_id.center()
    }

    pub fn is_center_level(&self) -> bool {
        self.zone_id.is_center_level()
    }

    pub fn is_specific_zone(&self) -> bool {
        self.zone_id.is_specific_zone()
    }

    /// A subscription that was never notified is always due.
    pub fn is_due_for_notification(&self, min_interval: Duration, now: DateTime<Utc>) -> bool {
        match self.last_notified {
            None => true,
            Some(last) => now - last >= min_interval,
        }
    }

    pub fn mark_notified(&mut self, at: DateTime<Utc>) {
        self.last_notified = Some(at);
    }
}
