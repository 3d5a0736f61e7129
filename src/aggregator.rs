//! Normalizes raw center forecasts into one forecast per zone.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::domain::{DayDanger, RawForecast, ValidDay, ZoneForecast};

const DEFAULT_BOTTOM_LINE: &str = "No bottom line available";

/// Builds the deduplicated, sorted zone forecasts valid on `as_of`'s UTC day.
///
/// When several published forecasts cover the same zone, the most recently
/// published one wins. Days without a rating get a placeholder.
pub fn aggregate(raw_forecasts: &[RawForecast], as_of: DateTime<Utc>) -> Vec<ZoneForecast> {
    let day = as_of.date_naive();
    let mut eligible: Vec<&RawForecast> = raw_forecasts
        .iter()
        .filter(|f| f.is_published() && f.is_valid_on(day))
        .collect();

    eligible.sort_by(|a, b| b.published_time.cmp(&a.published_time));

    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for forecast in eligible {
        let center_id = &forecast.avalanche_center.id;
        for zone in &forecast.forecast_zone {
            let zone_id = format!("{center_id}_{}", zone.zone_id);
            if !seen.insert(zone_id.clone()) {
                continue;
            }
            result.push(ZoneForecast {
                zone_id,
                zone_name: zone.name.clone(),
                center: forecast.avalanche_center.name.clone(),
                issued_time: forecast.published_time,
                start_date: forecast.start_date,
                end_date: forecast.end_date,
                bottom_line: bottom_line_or_default(forecast),
                today_danger: day_danger(forecast, ValidDay::Current),
                future_danger: day_danger(forecast, ValidDay::Tomorrow),
            });
        }
    }

    result.sort_by(|a, b| {
        a.center
            .cmp(&b.center)
            .then_with(|| a.zone_name.cmp(&b.zone_name))
    });
    result
}

fn day_danger(forecast: &RawForecast, day: ValidDay) -> DayDanger {
    forecast
        .danger_for(day)
        .cloned()
        .map(DayDanger::Rated)
        .unwrap_or_else(|| DayDanger::unavailable(day))
}

fn bottom_line_or_default(forecast: &RawForecast) -> String {
    forecast
        .bottom_line
        .as_deref()
        .filter(|b| !b.trim().is_empty())
        .unwrap_or(DEFAULT_BOTTOM_LINE)
        .to_string()
}
