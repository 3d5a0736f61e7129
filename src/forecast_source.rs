use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

use crate::domain::RawForecast;

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("forecast request failed")]
    Http(#[from] reqwest::Error),
    #[error("forecast API answered {status}: {body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Anything able to produce the raw forecasts of one avalanche center.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn fetch(&self, center_id: &str) -> Result<Vec<RawForecast>, FetchError>;
}

/// Client for the public avalanche.org products API.
#[derive(Clone)]
pub struct AvalancheApiClient {
    http_client: Client,
    base_url: Url,
}

const ERROR_BODY_LIMIT: usize = 256;

impl AvalancheApiClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http_client: Client::builder().timeout(timeout).build()?,
            base_url,
        })
    }

    fn products_url(&self) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("products");
        }
        url
    }
}

#[async_trait]
impl ForecastSource for AvalancheApiClient {
    #[tracing::instrument(name = "Fetching forecasts for center", skip(self))]
    async fn fetch(&self, center_id: &str) -> Result<Vec<RawForecast>, FetchError> {
        let response = self
            .http_client
            .get(self.products_url())
            .query(&[("avalanche_center_id", center_id)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > ERROR_BODY_LIMIT {
                let mut cut = ERROR_BODY_LIMIT;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(FetchError::UnexpectedStatus { status, body });
        }

        let forecasts: Vec<RawForecast> = response.json().await?;
        Ok(forecasts
            .into_iter()
            .map(|f| f.with_fallback_center(center_id))
            .collect())
    }
}
