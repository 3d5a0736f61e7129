use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_aux::field_attributes::deserialize_default_from_null;

/// An avalanche forecasting organization, e.g. NWAC or IPAC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AvalancheCenter {
    #[serde(default, deserialize_with = "deserialize_default_from_null")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_default_from_null")]
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl AvalancheCenter {
    /// The external link for this center, if one is configured.
    pub fn link(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastZone {
    pub zone_id: String,
    #[serde(default, deserialize_with = "deserialize_default_from_null")]
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidDay {
    Current,
    Tomorrow,
    #[serde(other)]
    Other,
}

/// Elevation-banded danger levels for one validity day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DangerRating {
    #[serde(default, deserialize_with = "deserialize_default_from_null")]
    pub upper: i32,
    #[serde(default, deserialize_with = "deserialize_default_from_null")]
    pub middle: i32,
    #[serde(default, deserialize_with = "deserialize_default_from_null")]
    pub lower: i32,
    pub valid_day: ValidDay,
}

/// One forecast document as published by a center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawForecast {
    pub avalanche_center: AvalancheCenter,
    #[serde(default)]
    pub id: i64,
    pub published_time: DateTime<Utc>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_default_from_null")]
    pub status: String,
    #[serde(default)]
    pub bottom_line: Option<String>,
    #[serde(default, deserialize_with = "deserialize_default_from_null")]
    pub forecast_zone: Vec<ForecastZone>,
    #[serde(default, deserialize_with = "deserialize_default_from_null")]
    pub danger: Vec<DangerRating>,
}

impl RawForecast {
    pub fn is_published(&self) -> bool {
        self.status == "published"
    }

    /// Whether the validity window, truncated to UTC days, includes `day`.
    pub fn is_valid_on(&self, day: NaiveDate) -> bool {
        self.start_date.date_naive() <= day && day <= self.end_date.date_naive()
    }

    pub fn danger_for(&self, day: ValidDay) -> Option<&DangerRating> {
        self.danger.iter().find(|d| d.valid_day == day)
    }

    /// Fills in the center id when the upstream document omitted it.
    pub fn with_fallback_center(mut self, center_id: &str) -> Self {
        if self.avalanche_center.id.trim().is_empty() {
            self.avalanche_center.id = center_id.to_string();
        }
        self
    }
}

/// The danger outlook for one day of a zone forecast.
///
/// `Unavailable` is a placeholder and is never rendered as a zero rating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DayDanger {
    Rated(DangerRating),
    Unavailable { valid_day: ValidDay, message: String },
}

impl DayDanger {
    pub fn unavailable(day: ValidDay) -> Self {
        let message = match day {
            ValidDay::Tomorrow => "No forecast available tomorrow",
            _ => "No forecast available today",
        };
        DayDanger::Unavailable {
            valid_day: day,
            message: message.to_string(),
        }
    }

    pub fn rating(&self) -> Option<&DangerRating> {
        match self {
            DayDanger::Rated(rating) => Some(rating),
            DayDanger::Unavailable { .. } => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, DayDanger::Unavailable { .. })
    }
}

/// Normalized forecast for a single zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneForecast {
    pub zone_id: String,
    pub zone_name: String,
    pub center: String,
    pub issued_time: DateTime<Utc>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub bottom_line: String,
    pub today_danger: DayDanger,
    pub future_danger: DayDanger,
}
