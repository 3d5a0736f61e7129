//! Subscribe, unsubscribe and listing, plus the welcome email sent on subscribe.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::Instrument;

use crate::aggregator::aggregate;
use crate::configuration::NotifierSettings;
use crate::domain::{
    AvalancheCenter, CenterDigest, EmailContent, NewSubscription, SubscriberEmail, Subscription,
    ValidationError, ZoneEmail, ZoneId,
};
use crate::email_client::{EmailSender, deliver};
use crate::forecast_source::ForecastSource;
use crate::routes::error_chain_fmt;
use crate::startup::Dependencies;
use crate::store::{CenterLookup, SubscriptionStore};

#[derive(thiserror::Error)]
pub enum SubscriptionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl std::fmt::Debug for SubscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

pub struct SubscriptionService {
    subscriptions: Arc<dyn SubscriptionStore>,
    welcome: Arc<WelcomeMailer>,
    welcome_permits: Arc<Semaphore>,
}

impl SubscriptionService {
    pub fn new(dependencies: &Dependencies, settings: &NotifierSettings) -> Self {
        Self {
            subscriptions: dependencies.subscriptions.clone(),
            welcome: Arc::new(WelcomeMailer {
                forecasts: dependencies.forecasts.clone(),
                centers: dependencies.centers.clone(),
                email_sender: dependencies.email_sender.clone(),
                fallback_center_link: settings.fallback_center_link.clone(),
            }),
            welcome_permits: Arc::new(Semaphore::new(settings.welcome_email_concurrency.max(1))),
        }
    }

    /// Persists the subscription and sends the welcome email in the background.
    ///
    /// The welcome email never affects the outcome: its failures are only logged.
    #[tracing::instrument(
        name = "Adding a new subscription",
        skip(self, email),
        fields(subscriber_email = %email)
    )]
    pub async fn subscribe(
        &self,
        email: String,
        zone_id: &str,
    ) -> Result<Subscription, SubscriptionError> {
        let new_subscription = NewSubscription::parse(email, zone_id)?;
        let subscription = Subscription::new(new_subscription, Utc::now());

        self.subscriptions
            .create(&subscription)
            .await
            .context("Failed to store the new subscription.")?;

        self.spawn_welcome_email(subscription.clone());
        Ok(subscription)
    }

    /// Removes every matching subscription; removing nothing is not an error.
    #[tracing::instrument(
        name = "Removing subscriptions",
        skip(self, email),
        fields(subscriber_email = %email)
    )]
    pub async fn unsubscribe(&self, email: String, zone_id: &str) -> Result<u64, SubscriptionError> {
        let email = SubscriberEmail::parse(email)?;
        let zone_id = ZoneId::parse(zone_id)?;

        let removed = self
            .subscriptions
            .delete(&email, &zone_id)
            .await
            .context("Failed to delete subscriptions.")?;
        if removed == 0 {
            tracing::info!("No matching subscription to remove");
        }
        Ok(removed)
    }

    #[tracing::instrument(name = "Listing subscriptions by email", skip(self, email))]
    pub async fn list_by_email(&self, email: String) -> Result<Vec<Subscription>, SubscriptionError> {
        let email = SubscriberEmail::parse(email)?;
        let subscriptions = self
            .subscriptions
            .list_by_email(&email)
            .await
            .context("Failed to list subscriptions for email.")?;
        Ok(subscriptions)
    }

    #[tracing::instrument(name = "Listing subscriptions by zone", skip(self))]
    pub async fn list_by_zone(&self, zone_id: &str) -> Result<Vec<Subscription>, SubscriptionError> {
        let zone_id = ZoneId::parse(zone_id)?;
        let subscriptions = self
            .subscriptions
            .list_by_zone(&zone_id)
            .await
            .context("Failed to list subscriptions for zone.")?;
        Ok(subscriptions)
    }

    fn spawn_welcome_email(&self, subscription: Subscription) {
        let mailer = self.welcome.clone();
        let permits = self.welcome_permits.clone();
        let span = tracing::info_span!(
            "Sending welcome email",
            subscription_id = %subscription.id,
            zone_id = %subscription.zone_id
        );

        tokio::spawn(
            async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                if let Err(e) = mailer.send(&subscription).await {
                    tracing::warn!(
                        error.cause_chain = ?e,
                        error.message = %e,
                        "Failed to send welcome email"
                    );
                }
            }
            .instrument(span),
        );
    }
}

struct WelcomeMailer {
    forecasts: Arc<dyn ForecastSource>,
    centers: Arc<dyn CenterLookup>,
    email_sender: Arc<dyn EmailSender>,
    fallback_center_link: String,
}

impl WelcomeMailer {
    async fn send(&self, subscription: &Subscription) -> Result<(), anyhow::Error> {
        let center_id = subscription.center_id();
        let forecasts = self
            .forecasts
            .fetch(center_id)
            .await
            .context("Failed to fetch forecasts for the welcome email.")?;
        let zones = aggregate(&forecasts, Utc::now());
        let center = self.resolve_center(center_id).await;
        let link = center.link().unwrap_or(self.fallback_center_link.as_str());

        let content = match subscription.zone_id.zone() {
            None => {
                if zones.is_empty() {
                    tracing::info!("No current forecasts for the center, skipping welcome email");
                    return Ok(());
                }
                EmailContent::CenterDigest(CenterDigest::new(&center.name, link, &zones))
            }
            Some(_) => {
                let current = zones.iter().find(|z| {
                    ZoneId::parse(&z.zone_id)
                        .map(|id| id == subscription.zone_id)
                        .unwrap_or(false)
                });
                let Some(forecast) = current else {
                    tracing::info!("No current forecast for the zone, skipping welcome email");
                    return Ok(());
                };
                EmailContent::Zone(ZoneEmail::from_forecast(forecast, forecast.issued_time, link))
            }
        };

        deliver(self.email_sender.as_ref(), &subscription.email, &content)
            .await
            .context("Failed to deliver the welcome email.")
    }

    /// Falls back to the center id as its name when the center is unknown.
    async fn resolve_center(&self, center_id: &str) -> AvalancheCenter {
        match self.centers.get(center_id).await {
            Ok(center) if !center.name.trim().is_empty() => center,
            Ok(center) => AvalancheCenter {
                name: center_id.to_string(),
                ..center
            },
            Err(e) => {
                tracing::warn!(
                    error.cause_chain = ?e,
                    "Center lookup failed, using fallback center details"
                );
                AvalancheCenter {
                    id: center_id.to_string(),
                    name: center_id.to_string(),
                    url: None,
                }
            }
        }
    }
}
