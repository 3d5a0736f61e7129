use std::sync::Arc;
use std::time::Duration;

use avy_alerts::{
    configuration::{Settings, get_configuration},
    domain::AvalancheCenter,
    notification_dispatcher::NotificationDispatcher,
    startup::{Application, Dependencies},
    store::InMemoryStore,
    telemetry::{get_subscriber, init_subscriber},
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();

    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_subscriber(subscriber);
    } else {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_subscriber(subscriber);
    }
});

pub struct TestApp {
    pub address: String,
    pub store: Arc<InMemoryStore>,
    pub email_server: MockServer,
    pub forecast_server: MockServer,
    pub api_client: reqwest::Client,
    pub config: Settings,
    pub dependencies: Dependencies,
}

impl TestApp {
    pub async fn post_subscription(&self, body: &serde_json::Value) -> reqwest::Response {
        self.api_client
            .post(format!("{}/api/subscriptions", &self.address))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn delete_subscription(&self, email: &str, zone_id: &str) -> reqwest::Response {
        self.api_client
            .delete(format!("{}/api/subscriptions", &self.address))
            .query(&[("email", email), ("zone_id", zone_id)])
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn list_subscriptions(&self, query: &[(&str, &str)]) -> reqwest::Response {
        self.api_client
            .get(format!("{}/api/subscriptions", &self.address))
            .query(query)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_forecast(&self, query: &[(&str, &str)]) -> reqwest::Response {
        self.api_client
            .get(format!("{}/api/forecast", &self.address))
            .query(query)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub fn dispatcher(&self) -> NotificationDispatcher {
        NotificationDispatcher::new(&self.dependencies, self.config.notifier.poll_interval())
    }

    /// Serves `products` for `center_id` on the fake forecast API.
    pub async fn mount_products(&self, center_id: &str, products: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/v2/public/products"))
            .and(query_param("avalanche_center_id", center_id))
            .respond_with(ResponseTemplate::new(200).set_body_json(products))
            .mount(&self.forecast_server)
            .await;
    }

    /// Waits until the email server has seen `count` requests, or gives up after a few seconds.
    pub async fn wait_for_emails(&self, count: usize) -> Vec<wiremock::Request> {
        for _ in 0..50 {
            let received = self.email_server.received_requests().await.unwrap();
            if received.len() >= count {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.email_server.received_requests().await.unwrap()
    }
}

pub fn nwac() -> AvalancheCenter {
    AvalancheCenter {
        id: "NWAC".into(),
        name: "Northwest Avalanche Center".into(),
        url: Some("https://nwac.us/".into()),
    }
}

/// A published forecast valid today for the given `(zone_id, name)` pairs.
pub fn product(
    id: i64,
    published_time: DateTime<Utc>,
    zones: &[(&str, &str)],
) -> serde_json::Value {
    let now = Utc::now();
    let zones: Vec<serde_json::Value> = zones
        .iter()
        .map(|(zone_id, name)| serde_json::json!({"zone_id": zone_id, "name": name}))
        .collect();

    serde_json::json!({
        "id": id,
        "published_time": published_time.to_rfc3339(),
        "start_date": (now - chrono::Duration::hours(6)).to_rfc3339(),
        "end_date": (now + chrono::Duration::hours(18)).to_rfc3339(),
        "status": "published",
        "bottom_line": "Wind slabs on lee slopes.",
        "avalanche_center": {"id": "NWAC", "name": "Northwest Avalanche Center"},
        "forecast_zone": zones,
        "danger": [
            {"upper": 3, "middle": 2, "lower": 1, "valid_day": "current"},
            {"upper": 2, "middle": 2, "lower": 1, "valid_day": "tomorrow"}
        ]
    })
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with_store(InMemoryStore::new().with_center(nwac())).await
}

pub async fn spawn_app_with_store(store: InMemoryStore) -> TestApp {
    Lazy::force(&TRACING);

    let email_server = MockServer::start().await;
    let forecast_server = MockServer::start().await;

    let config = {
        let mut c = get_configuration().expect("Failed to read configuration");
        c.app.port = 0;
        c.email_client.base_url = email_server.uri();
        c.forecast_api.base_url = format!("{}/v2/public", forecast_server.uri());
        c
    };

    let store = Arc::new(store);
    let dependencies = Dependencies {
        subscriptions: store.clone(),
        watermarks: store.clone(),
        centers: store.clone(),
        forecasts: Arc::new(
            config
                .forecast_api
                .client()
                .expect("Failed to build forecast client"),
        ),
        email_sender: Arc::new(
            config
                .email_client
                .client()
                .expect("Failed to build email client"),
        ),
    };

    let application = Application::build_with_dependencies(config.clone(), dependencies.clone())
        .await
        .expect("Failed to build application.");
    let address = format!("http://127.0.0.1:{}", application.get_port());
    let _ = tokio::spawn(application.run_until_stopped());

    TestApp {
        address,
        store,
        email_server,
        forecast_server,
        api_client: reqwest::Client::new(),
        config,
        dependencies,
    }
}
