use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use super::super::helpers::ErrorBody;
use crate::subscription_service::SubscriptionError;

impl ResponseError for SubscriptionError {
    fn status_code(&self) -> StatusCode {
        match self {
            SubscriptionError::Validation(_) => StatusCode::BAD_REQUEST,
            SubscriptionError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            SubscriptionError::Validation(e) => e.to_string(),
            SubscriptionError::Unexpected(_) => "Internal server error".to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorBody::new(message))
    }
}
