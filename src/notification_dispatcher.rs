//! Periodic poll loop that emails subscribers when a zone gets a new forecast.
//!
//! Each zone carries a persisted watermark: the issuance time of the last
//! forecast that triggered notifications. A zone is notified only when its
//! latest published forecast is strictly newer than the watermark, and the
//! watermark is advanced once every subscriber of the zone was attempted.
//! A subscriber whose delivery failed is therefore not retried for the same
//! issuance once the watermark has moved.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use crate::aggregator::aggregate;
use crate::configuration::Settings;
use crate::domain::{
    AvalancheCenter, CenterDigest, DayDanger, EmailContent, RawForecast, Subscription, ValidDay,
    ZoneEmail, ZoneForecast, ZoneId, ZoneSummary,
};
use crate::email_client::{EmailSender, deliver};
use crate::forecast_source::ForecastSource;
use crate::startup::Dependencies;
use crate::store::{CenterLookup, CenterSubscriptions, SubscriptionStore, WatermarkStore};

/// Counters describing one poll cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub centers_processed: usize,
    pub centers_skipped: usize,
    pub zones_notified: usize,
    pub emails_sent: usize,
    pub emails_failed: usize,
}

pub struct NotificationDispatcher {
    subscriptions: Arc<dyn SubscriptionStore>,
    watermarks: Arc<dyn WatermarkStore>,
    centers: Arc<dyn CenterLookup>,
    forecasts: Arc<dyn ForecastSource>,
    email_sender: Arc<dyn EmailSender>,
    poll_interval: Duration,
}

impl NotificationDispatcher {
    pub fn new(dependencies: &Dependencies, poll_interval: Duration) -> Self {
        Self {
            subscriptions: dependencies.subscriptions.clone(),
            watermarks: dependencies.watermarks.clone(),
            centers: dependencies.centers.clone(),
            forecasts: dependencies.forecasts.clone(),
            email_sender: dependencies.email_sender.clone(),
            poll_interval,
        }
    }

    /// Polls once immediately, then on every tick, until `shutdown` resolves.
    ///
    /// A cycle in progress always runs to completion before shutdown is observed.
    pub async fn run_poll_loop<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "Notification dispatcher started"
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Notification dispatcher stopping");
                    return;
                }
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }
    }

    #[tracing::instrument(name = "Polling subscribed centers", skip(self))]
    pub async fn poll_once(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let centers = match self.subscriptions.list_active_by_center().await {
            Ok(centers) => centers,
            Err(e) => {
                tracing::error!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    "Failed to list subscribed centers"
                );
                return report;
            }
        };

        for group in &centers {
            let span = tracing::info_span!("Processing center", center_id = %group.center_id);
            self.process_center(group, &mut report)
                .instrument(span)
                .await;
        }

        tracing::info!(
            centers_processed = report.centers_processed,
            centers_skipped = report.centers_skipped,
            zones_notified = report.zones_notified,
            emails_sent = report.emails_sent,
            emails_failed = report.emails_failed,
            "Poll cycle finished"
        );
        report
    }

    async fn process_center(&self, group: &CenterSubscriptions, report: &mut CycleReport) {
        let center_id = group.center_id.as_str();

        let forecasts: Vec<RawForecast> = match self.forecasts.fetch(center_id).await {
            Ok(forecasts) => forecasts
                .into_iter()
                .map(|f| f.with_fallback_center(center_id))
                .collect(),
            Err(e) => {
                tracing::warn!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    "Forecast fetch failed, skipping center for this cycle"
                );
                report.centers_skipped += 1;
                return;
            }
        };

        let center = match self.centers.get(center_id).await {
            Ok(center) => center,
            Err(e) => {
                tracing::warn!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    "Center lookup failed, skipping center for this cycle"
                );
                report.centers_skipped += 1;
                return;
            }
        };
        let Some(center_link) = center.link() else {
            tracing::warn!("Center has no link configured, skipping center for this cycle");
            report.centers_skipped += 1;
            return;
        };
        report.centers_processed += 1;

        let latest = latest_issued_per_zone(group, &forecasts);
        let pending = self.pending_zones(latest).await;
        if pending.is_empty() {
            tracing::debug!("No new forecasts");
            return;
        }

        let center_zone = group
            .subscriptions
            .iter()
            .find(|s| s.is_center_level())
            .map(|s| &s.zone_id);
        let center_level_subscribers = match center_zone {
            Some(zone) => match self.subscriptions.list_by_zone(zone).await {
                Ok(subscribers) => subscribers,
                Err(e) => {
                    tracing::warn!(
                        error.cause_chain = ?e,
                        "Failed to load center-level subscribers, retrying next cycle"
                    );
                    return;
                }
            },
            None => Vec::new(),
        };

        let now = Utc::now();
        let zone_forecasts = aggregate(&forecasts, now);
        let mut attempted = Vec::with_capacity(pending.len());

        for (zone_id, issued_at) in &pending {
            let subscribers = match self.subscriptions.list_by_zone(zone_id).await {
                Ok(subscribers) => subscribers,
                Err(e) => {
                    tracing::warn!(
                        error.cause_chain = ?e,
                        zone_id = %zone_id,
                        "Failed to load zone subscribers, retrying next cycle"
                    );
                    continue;
                }
            };

            let content = EmailContent::Zone(zone_email(
                zone_id,
                *issued_at,
                &zone_forecasts,
                &forecasts,
                center_link,
            ));
            for subscriber in &subscribers {
                self.notify(subscriber, &content, report).await;
            }
            attempted.push((zone_id, *issued_at));
        }

        if !center_level_subscribers.is_empty() {
            let mut zones: Vec<ZoneSummary> = attempted
                .iter()
                .map(|(zone_id, issued_at)| {
                    ZoneSummary::from(&zone_email(
                        zone_id,
                        *issued_at,
                        &zone_forecasts,
                        &forecasts,
                        center_link,
                    ))
                })
                .collect();
            zones.sort_by(|a, b| {
                a.zone_name
                    .cmp(&b.zone_name)
                    .then_with(|| a.zone_id.cmp(&b.zone_id))
            });

            if zones.is_empty() {
                tracing::debug!("No zones left for the center digest");
            } else {
                let content = EmailContent::CenterDigest(CenterDigest {
                    center_name: center_display_name(&center).to_string(),
                    center_link: center_link.to_string(),
                    zones,
                });
                for subscriber in &center_level_subscribers {
                    self.notify(subscriber, &content, report).await;
                }
            }
        }

        for (zone_id, issued_at) in attempted {
            match self.watermarks.upsert(zone_id, issued_at).await {
                Ok(()) => report.zones_notified += 1,
                Err(e) => tracing::warn!(
                    error.cause_chain = ?e,
                    zone_id = %zone_id,
                    "Failed to advance forecast watermark, zone will be retried next cycle"
                ),
            }
        }
    }

    /// Zones whose latest issuance is strictly newer than their watermark.
    async fn pending_zones(
        &self,
        latest: BTreeMap<ZoneId, DateTime<Utc>>,
    ) -> Vec<(ZoneId, DateTime<Utc>)> {
        let mut pending = Vec::new();
        for (zone_id, issued_at) in latest {
            match self.watermarks.get(&zone_id).await {
                Ok(Some(watermark)) if issued_at <= watermark => {
                    tracing::debug!(zone_id = %zone_id, "No new forecast");
                }
                Ok(_) => pending.push((zone_id, issued_at)),
                Err(e) => tracing::warn!(
                    error.cause_chain = ?e,
                    zone_id = %zone_id,
                    "Failed to read forecast watermark, skipping zone for this cycle"
                ),
            }
        }
        pending
    }

    async fn notify(
        &self,
        subscriber: &Subscription,
        content: &EmailContent,
        report: &mut CycleReport,
    ) {
        match deliver(self.email_sender.as_ref(), &subscriber.email, content).await {
            Ok(()) => {
                report.emails_sent += 1;
                if let Err(e) = self
                    .subscriptions
                    .update_last_notified(subscriber.id, Utc::now())
                    .await
                {
                    tracing::warn!(
                        error.cause_chain = ?e,
                        subscription_id = %subscriber.id,
                        "Failed to record notification time"
                    );
                }
            }
            Err(e) => {
                report.emails_failed += 1;
                tracing::warn!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    subscription_id = %subscriber.id,
                    "Failed to deliver forecast notification"
                );
            }
        }
    }
}

/// Latest publication time per zone, restricted to zones someone subscribed to.
///
/// A center-level subscription makes every zone of the center relevant.
fn latest_issued_per_zone(
    group: &CenterSubscriptions,
    forecasts: &[RawForecast],
) -> BTreeMap<ZoneId, DateTime<Utc>> {
    let wants_all_zones = group.subscriptions.iter().any(|s| s.is_center_level());
    let subscribed: HashSet<&ZoneId> = group
        .subscriptions
        .iter()
        .filter(|s| s.is_specific_zone())
        .map(|s| &s.zone_id)
        .collect();

    let mut latest: BTreeMap<ZoneId, DateTime<Utc>> = BTreeMap::new();
    for forecast in forecasts {
        for zone in &forecast.forecast_zone {
            let Ok(zone_id) = ZoneId::for_zone(&forecast.avalanche_center.id, &zone.zone_id)
            else {
                continue;
            };
            if zone_id.center() != group.center_id {
                continue;
            }
            if !wants_all_zones && !subscribed.contains(&zone_id) {
                continue;
            }
            latest
                .entry(zone_id)
                .and_modify(|t| *t = (*t).max(forecast.published_time))
                .or_insert(forecast.published_time);
        }
    }
    latest
}

fn zone_email(
    zone_id: &ZoneId,
    issued_at: DateTime<Utc>,
    zone_forecasts: &[ZoneForecast],
    raw_forecasts: &[RawForecast],
    center_link: &str,
) -> ZoneEmail {
    let current = zone_forecasts.iter().find(|z| {
        ZoneId::parse(&z.zone_id)
            .map(|id| &id == zone_id)
            .unwrap_or(false)
    });
    if let Some(forecast) = current {
        return ZoneEmail::from_forecast(forecast, issued_at, center_link);
    }

    // Published, but not valid today: announce it without ratings.
    let zone_name = raw_forecasts
        .iter()
        .flat_map(|f| f.forecast_zone.iter())
        .find(|z| zone_id.zone() == Some(z.zone_id.as_str()))
        .map(|z| z.name.clone())
        .unwrap_or_default();
    ZoneEmail {
        zone_id: zone_id.to_string(),
        zone_name,
        issued_at,
        today: DayDanger::unavailable(ValidDay::Current),
        tomorrow: DayDanger::unavailable(ValidDay::Tomorrow),
        center_link: center_link.to_string(),
    }
}

fn center_display_name(center: &AvalancheCenter) -> &str {
    if center.name.trim().is_empty() {
        &center.id
    } else {
        &center.name
    }
}

/// Builds the dispatcher from configuration and runs it until Ctrl-C.
pub async fn run_dispatcher_until_stopped(config: Settings) -> Result<(), anyhow::Error> {
    let dependencies = Dependencies::from_config(&config)?;
    let dispatcher = NotificationDispatcher::new(&dependencies, config.notifier.poll_interval());
    dispatcher
        .run_poll_loop(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error.message = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}
