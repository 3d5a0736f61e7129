use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{DayDanger, ZoneForecast};

/// Content of a single-zone forecast notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneEmail {
    pub zone_id: String,
    pub zone_name: String,
    pub issued_at: DateTime<Utc>,
    pub today: DayDanger,
    pub tomorrow: DayDanger,
    pub center_link: String,
}

impl ZoneEmail {
    pub fn from_forecast(forecast: &ZoneForecast, issued_at: DateTime<Utc>, center_link: &str) -> Self {
        Self {
            zone_id: forecast.zone_id.clone(),
            zone_name: forecast.zone_name.clone(),
            issued_at,
            today: forecast.today_danger.clone(),
            tomorrow: forecast.future_danger.clone(),
            center_link: center_link.to_string(),
        }
    }

    /// Zone name when known, the identifier otherwise.
    pub fn label(&self) -> &str {
        if self.zone_name.trim().is_empty() {
            &self.zone_id
        } else {
            &self.zone_name
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneSummary {
    pub zone_id: String,
    pub zone_name: String,
    pub today: String,
    pub tomorrow: String,
}

impl From<&ZoneForecast> for ZoneSummary {
    fn from(forecast: &ZoneForecast) -> Self {
        Self {
            zone_id: forecast.zone_id.clone(),
            zone_name: forecast.zone_name.clone(),
            today: format_danger(&forecast.today_danger),
            tomorrow: format_danger(&forecast.future_danger),
        }
    }
}

impl From<&ZoneEmail> for ZoneSummary {
    fn from(email: &ZoneEmail) -> Self {
        Self {
            zone_id: email.zone_id.clone(),
            zone_name: email.zone_name.clone(),
            today: format_danger(&email.today),
            tomorrow: format_danger(&email.tomorrow),
        }
    }
}

/// Aggregated notification covering every listed zone of one center.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CenterDigest {
    pub center_name: String,
    pub center_link: String,
    pub zones: Vec<ZoneSummary>,
}

impl CenterDigest {
    pub fn new(center_name: &str, center_link: &str, forecasts: &[ZoneForecast]) -> Self {
        Self {
            center_name: center_name.to_string(),
            center_link: center_link.to_string(),
            zones: forecasts.iter().map(ZoneSummary::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EmailContent {
    Zone(ZoneEmail),
    CenterDigest(CenterDigest),
}

/// Renders a day's danger as `U:3/M:2/L:1`, omitting zero bands.
pub fn format_danger(danger: &DayDanger) -> String {
    match danger {
        DayDanger::Unavailable { message, .. } => message.clone(),
        DayDanger::Rated(rating) => {
            let parts: Vec<String> = [("U", rating.upper), ("M", rating.middle), ("L", rating.lower)]
                .into_iter()
                .filter(|(_, level)| *level != 0)
                .map(|(band, level)| format!("{band}:{level}"))
                .collect();
            if parts.is_empty() {
                "No rating".to_string()
            } else {
                parts.join("/")
            }
        }
    }
}
