mod email_content;
mod forecast;
mod subscriber_email;
mod subscription;
mod zone_id;

pub use email_content::{CenterDigest, EmailContent, ZoneEmail, ZoneSummary, format_danger};
pub use forecast::{
    AvalancheCenter, DangerRating, DayDanger, ForecastZone, RawForecast, ValidDay, ZoneForecast,
};
pub use subscriber_email::SubscriberEmail;
pub use subscription::{NewSubscription, Subscription};
pub use zone_id::ZoneId;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid zone_id: {0}")]
    InvalidZone(String),
    #[error("invalid email: {0}")]
    InvalidEmail(String),
}
