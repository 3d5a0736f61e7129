use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};

use crate::aggregator::aggregate;
use crate::domain::{RawForecast, ZoneForecast};
use crate::forecast_source::{FetchError, ForecastSource};
use crate::routes::error_chain_fmt;
use crate::startup::Dependencies;
use crate::store::CenterLookup;

#[derive(thiserror::Error)]
pub enum ForecastError {
    #[error("Failed to fetch forecasts for {center_id}")]
    Upstream {
        center_id: String,
        #[source]
        source: FetchError,
    },
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl std::fmt::Debug for ForecastError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Read path: current zone forecasts for a set of centers.
pub struct ForecastService {
    forecasts: Arc<dyn ForecastSource>,
    centers: Arc<dyn CenterLookup>,
}

impl ForecastService {
    pub fn new(dependencies: &Dependencies) -> Self {
        Self {
            forecasts: dependencies.forecasts.clone(),
            centers: dependencies.centers.clone(),
        }
    }

    /// Aggregated forecasts valid on `as_of`'s day, for `center_ids` or every
    /// active center when none are given. Any failed fetch fails the request.
    #[tracing::instrument(name = "Loading forecasts for centers", skip(self))]
    pub async fn forecasts_for_centers(
        &self,
        center_ids: &[String],
        as_of: DateTime<Utc>,
    ) -> Result<Vec<ZoneForecast>, ForecastError> {
        let center_ids: Vec<String> = if center_ids.is_empty() {
            self.centers
                .list_active()
                .await
                .context("Failed to list active avalanche centers.")?
                .into_iter()
                .map(|c| c.id)
                .collect()
        } else {
            center_ids.to_vec()
        };

        let mut raw: Vec<RawForecast> = Vec::new();
        for center_id in &center_ids {
            let fetched = self
                .forecasts
                .fetch(center_id)
                .await
                .map_err(|source| ForecastError::Upstream {
                    center_id: center_id.clone(),
                    source,
                })?;
            raw.extend(fetched.into_iter().map(|f| f.with_fallback_center(center_id)));
        }

        Ok(aggregate(&raw, as_of))
    }
}
