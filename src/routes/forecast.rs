use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError, web};
use chrono::{NaiveDate, NaiveTime, Utc};

use super::helpers::ErrorBody;
use crate::forecast_service::{ForecastError, ForecastService};

#[derive(serde::Deserialize, Debug)]
pub struct ForecastQuery {
    pub date: Option<NaiveDate>,
    /// Comma separated center ids.
    pub centers: Option<String>,
}

impl ForecastQuery {
    fn center_ids(&self) -> Vec<String> {
        self.centers
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .collect()
    }
}

impl ResponseError for ForecastError {
    fn status_code(&self) -> StatusCode {
        match self {
            ForecastError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            ForecastError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ForecastError::Upstream { .. } => self.to_string(),
            ForecastError::Unexpected(_) => "Internal server error".to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorBody::new(message))
    }
}

#[tracing::instrument(name = "Getting zone forecasts", skip(service))]
pub async fn get_forecast(
    query: web::Query<ForecastQuery>,
    service: web::Data<ForecastService>,
) -> Result<HttpResponse, ForecastError> {
    let as_of = query
        .date
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .unwrap_or_else(Utc::now);

    let zones = service
        .forecasts_for_centers(&query.center_ids(), as_of)
        .await?;

    Ok(HttpResponse::Ok().json(zones))
}
