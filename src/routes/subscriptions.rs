mod errors;

use actix_web::{HttpResponse, web};

use super::helpers::ErrorBody;
use crate::subscription_service::{SubscriptionError, SubscriptionService};

#[derive(serde::Deserialize)]
pub struct SubscriptionRequest {
    pub email: String,
    pub zone_id: String,
}

#[derive(serde::Deserialize)]
pub struct SubscriptionFilter {
    pub email: Option<String>,
    pub zone_id: Option<String>,
}

#[tracing::instrument(
    name = "Subscribing to forecast emails",
    skip(body, service),
    fields(
        subscriber_email = %body.email,
        zone_id = %body.zone_id
    )
)]
pub async fn subscribe(
    body: web::Json<SubscriptionRequest>,
    service: web::Data<SubscriptionService>,
) -> Result<HttpResponse, SubscriptionError> {
    let SubscriptionRequest { email, zone_id } = body.into_inner();
    let subscription = service.subscribe(email, &zone_id).await?;

    Ok(HttpResponse::Created().json(subscription))
}

#[tracing::instrument(
    name = "Unsubscribing from forecast emails",
    skip(query, service),
    fields(
        subscriber_email = %query.email,
        zone_id = %query.zone_id
    )
)]
pub async fn unsubscribe(
    query: web::Query<SubscriptionRequest>,
    service: web::Data<SubscriptionService>,
) -> Result<HttpResponse, SubscriptionError> {
    let SubscriptionRequest { email, zone_id } = query.into_inner();
    service.unsubscribe(email, &zone_id).await?;

    Ok(HttpResponse::NoContent().finish())
}

/// Lists by email when given, otherwise by zone.
#[tracing::instrument(name = "Listing subscriptions", skip(query, service))]
pub async fn list_subscriptions(
    query: web::Query<SubscriptionFilter>,
    service: web::Data<SubscriptionService>,
) -> Result<HttpResponse, SubscriptionError> {
    let SubscriptionFilter { email, zone_id } = query.into_inner();

    let subscriptions = match (email, zone_id) {
        (Some(email), _) => service.list_by_email(email).await?,
        (None, Some(zone_id)) => service.list_by_zone(&zone_id).await?,
        (None, None) => {
            return Ok(HttpResponse::BadRequest()
                .json(ErrorBody::new("either email or zone_id is required")));
        }
    };

    Ok(HttpResponse::Ok().json(subscriptions))
}
