pub mod aggregator;
pub mod configuration;
pub mod domain;
pub mod email_client;
pub mod forecast_service;
pub mod forecast_source;
pub mod notification_dispatcher;
pub mod routes;
pub mod startup;
pub mod store;
pub mod subscription_service;
pub mod telemetry;
