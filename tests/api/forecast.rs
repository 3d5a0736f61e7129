use chrono::{Duration, Utc};
use wiremock::{
    Mock, ResponseTemplate,
    matchers::{method, path},
};

use crate::helpers::{product, spawn_app};

#[tokio::test]
async fn forecast_returns_the_latest_forecast_per_zone() {
    let app = spawn_app().await;
    let now = Utc::now();
    app.mount_products(
        "NWAC",
        serde_json::json!([
            product(1, now - Duration::hours(3), &[("10", "Mt Hood"), ("2", "Stevens Pass")]),
            product(2, now - Duration::hours(1), &[("10", "Mt Hood")]),
        ]),
    )
    .await;

    let response = app.get_forecast(&[("centers", "nwac")]).await;

    assert_eq!(200, response.status().as_u16());
    let zones: Vec<serde_json::Value> = response.json().await.unwrap();
    assert_eq!(zones.len(), 2);
    assert_eq!(zones[0]["zone_id"], "NWAC_10");
    assert_eq!(zones[0]["zone_name"], "Mt Hood");
    assert_eq!(zones[1]["zone_id"], "NWAC_2");
    assert_eq!(zones[0]["today_danger"]["upper"], 3);
    assert_eq!(zones[0]["future_danger"]["upper"], 2);
}

#[tokio::test]
async fn forecast_defaults_to_active_centers() {
    let app = spawn_app().await;
    app.mount_products(
        "NWAC",
        serde_json::json!([product(1, Utc::now(), &[("10", "Mt Hood")])]),
    )
    .await;

    let response = app.get_forecast(&[]).await;

    assert_eq!(200, response.status().as_u16());
    let zones: Vec<serde_json::Value> = response.json().await.unwrap();
    assert_eq!(zones.len(), 1);
}

#[tokio::test]
async fn forecast_for_another_day_is_empty() {
    let app = spawn_app().await;
    app.mount_products(
        "NWAC",
        serde_json::json!([product(1, Utc::now(), &[("10", "Mt Hood")])]),
    )
    .await;
    let next_week = (Utc::now() + Duration::days(7)).date_naive().to_string();

    let response = app
        .get_forecast(&[("centers", "NWAC"), ("date", next_week.as_str())])
        .await;

    assert_eq!(200, response.status().as_u16());
    let zones: Vec<serde_json::Value> = response.json().await.unwrap();
    assert!(zones.is_empty());
}

#[tokio::test]
async fn forecast_returns_502_when_upstream_fails() {
    let app = spawn_app().await;
    Mock::given(method("GET"))
        .and(path("/v2/public/products"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&app.forecast_server)
        .await;

    let response = app.get_forecast(&[("centers", "NWAC")]).await;

    assert_eq!(502, response.status().as_u16());
}

#[tokio::test]
async fn forecast_returns_400_for_a_malformed_date() {
    let app = spawn_app().await;

    let response = app.get_forecast(&[("date", "yesterday")]).await;

    assert_eq!(400, response.status().as_u16());
}
