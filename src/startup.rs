use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use actix_web::dev::Server;
use actix_web::{App, HttpServer, web};
use anyhow::Context;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing_actix_web::TracingLogger;

use crate::configuration::{DatabaseSettings, NotifierSettings, Settings};
use crate::email_client::EmailSender;
use crate::forecast_service::ForecastService;
use crate::forecast_source::ForecastSource;
use crate::routes::{get_forecast, health_check, list_subscriptions, subscribe, unsubscribe};
use crate::store::{CenterLookup, PgStore, SubscriptionStore, WatermarkStore};
use crate::subscription_service::SubscriptionService;

/// The collaborators shared by the HTTP API and the notification dispatcher.
#[derive(Clone)]
pub struct Dependencies {
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub watermarks: Arc<dyn WatermarkStore>,
    pub centers: Arc<dyn CenterLookup>,
    pub forecasts: Arc<dyn ForecastSource>,
    pub email_sender: Arc<dyn EmailSender>,
}

impl Dependencies {
    /// Postgres-backed stores plus the HTTP clients described by `config`.
    pub fn from_config(config: &Settings) -> Result<Self, anyhow::Error> {
        let store = Arc::new(PgStore::new(get_connection_pool(&config.database)));
        let forecasts = config.forecast_api.client()?;
        let email_client = config.email_client.client()?;

        Ok(Self {
            subscriptions: store.clone(),
            watermarks: store.clone(),
            centers: store,
            forecasts: Arc::new(forecasts),
            email_sender: Arc::new(email_client),
        })
    }
}

pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, anyhow::Error> {
        let dependencies = Dependencies::from_config(&config)?;
        Self::build_with_dependencies(config, dependencies).await
    }

    pub async fn build_with_dependencies(
        config: Settings,
        dependencies: Dependencies,
    ) -> Result<Self, anyhow::Error> {
        let address = format!("{}:{}", config.app.host, config.app.port);
        let listener =
            TcpListener::bind(&address).with_context(|| format!("Failed to bind {address}"))?;
        let port = listener.local_addr()?.port();
        let server = run(listener, &dependencies, &config.notifier)?;

        Ok(Self { port, server })
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

pub fn run(
    listener: TcpListener,
    dependencies: &Dependencies,
    notifier: &NotifierSettings,
) -> Result<Server, anyhow::Error> {
    let subscription_service = web::Data::new(SubscriptionService::new(dependencies, notifier));
    let forecast_service = web::Data::new(ForecastService::new(dependencies));

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api")
                    .route("/forecast", web::get().to(get_forecast))
                    .route("/subscriptions", web::post().to(subscribe))
                    .route("/subscriptions", web::delete().to(unsubscribe))
                    .route("/subscriptions", web::get().to(list_subscriptions)),
            )
            .app_data(subscription_service.clone())
            .app_data(forecast_service.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}

pub fn get_connection_pool(db_config: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(Duration::from_secs(2))
        .connect_lazy_with(db_config.with_db())
}
