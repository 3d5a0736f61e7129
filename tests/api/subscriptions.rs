use chrono::Utc;
use fake::{Fake, faker::internet::en::SafeEmail};
use wiremock::{
    Mock, ResponseTemplate,
    matchers::{method, path},
};

use crate::helpers::{product, spawn_app};

#[tokio::test]
async fn subscribe_returns_201_and_the_subscription() {
    let app = spawn_app().await;
    let email: String = SafeEmail().fake();

    let response = app
        .post_subscription(&serde_json::json!({"email": email, "zone_id": "nwac_10"}))
        .await;

    assert_eq!(201, response.status().as_u16());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["zone_id"], "NWAC_10");
    assert_eq!(body["email"], email.to_lowercase());
    assert!(body["last_notified"].is_null());
}

#[tokio::test]
async fn subscribe_persists_the_subscription() {
    let app = spawn_app().await;

    app.post_subscription(&serde_json::json!({"email": "skier@example.com", "zone_id": "NWAC"}))
        .await;

    let saved = app.store.subscriptions().await;
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].email.as_ref(), "skier@example.com");
    assert!(saved[0].is_center_level());
}

#[tokio::test]
async fn subscribe_returns_400_for_invalid_data() {
    let app = spawn_app().await;
    let test_cases = vec![
        (
            serde_json::json!({"email": "definitely-not-an-email", "zone_id": "NWAC_10"}),
            "invalid email",
        ),
        (
            serde_json::json!({"email": "skier@example.com", "zone_id": ""}),
            "empty zone",
        ),
        (
            serde_json::json!({"email": "skier@example.com", "zone_id": "_10"}),
            "empty center",
        ),
        (serde_json::json!({"email": "skier@example.com"}), "missing zone"),
    ];

    for (body, description) in test_cases {
        let response = app.post_subscription(&body).await;

        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not return a 400 Bad Request when the payload had {}.",
            description
        );
    }
    assert!(app.store.subscriptions().await.is_empty());
}

#[tokio::test]
async fn subscribe_sends_a_welcome_email_with_the_current_forecast() {
    let app = spawn_app().await;
    app.mount_products(
        "NWAC",
        serde_json::json!([product(1, Utc::now(), &[("10", "Mt Hood")])]),
    )
    .await;

    Mock::given(path("/v1/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.email_server)
        .await;

    let response = app
        .post_subscription(&serde_json::json!({"email": "skier@example.com", "zone_id": "NWAC_10"}))
        .await;
    assert_eq!(201, response.status().as_u16());

    let received = app.wait_for_emails(1).await;
    assert_eq!(received.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["to"][0]["email"], "skier@example.com");
    assert_eq!(body["subject"], "New Avalanche Forecast for Mt Hood");
    assert!(body["text"].as_str().unwrap().contains("https://nwac.us/"));
}

#[tokio::test]
async fn subscribe_succeeds_when_the_welcome_email_fails() {
    let app = spawn_app().await;
    app.mount_products(
        "NWAC",
        serde_json::json!([product(1, Utc::now(), &[("10", "Mt Hood")])]),
    )
    .await;

    Mock::given(path("/v1/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&app.email_server)
        .await;

    let response = app
        .post_subscription(&serde_json::json!({"email": "skier@example.com", "zone_id": "NWAC_10"}))
        .await;

    assert_eq!(201, response.status().as_u16());
    assert_eq!(app.store.subscriptions().await.len(), 1);
}

#[tokio::test]
async fn unsubscribe_returns_204_with_or_without_a_match() {
    let app = spawn_app().await;
    app.post_subscription(&serde_json::json!({"email": "skier@example.com", "zone_id": "NWAC_10"}))
        .await;
    app.post_subscription(&serde_json::json!({"email": "skier@example.com", "zone_id": "NWAC_2"}))
        .await;

    let response = app.delete_subscription("skier@example.com", "NWAC_10").await;
    assert_eq!(204, response.status().as_u16());

    let remaining = app.store.subscriptions().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].zone_id.to_string(), "NWAC_2");

    let response = app.delete_subscription("skier@example.com", "NWAC_10").await;
    assert_eq!(204, response.status().as_u16());
}

#[tokio::test]
async fn unsubscribe_returns_400_for_an_invalid_email() {
    let app = spawn_app().await;

    let response = app.delete_subscription("skier", "NWAC_10").await;

    assert_eq!(400, response.status().as_u16());
}

#[tokio::test]
async fn list_prefers_email_over_zone() {
    let app = spawn_app().await;
    for (email, zone_id) in [
        ("a@example.com", "NWAC_10"),
        ("a@example.com", "NWAC"),
        ("b@example.com", "NWAC_10"),
    ] {
        app.post_subscription(&serde_json::json!({"email": email, "zone_id": zone_id}))
            .await;
    }

    let by_zone: Vec<serde_json::Value> = app
        .list_subscriptions(&[("zone_id", "NWAC_10")])
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(by_zone.len(), 2);

    let by_email: Vec<serde_json::Value> = app
        .list_subscriptions(&[("email", "a@example.com"), ("zone_id", "NWAC_10")])
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(by_email.len(), 2);
    assert!(by_email.iter().all(|s| s["email"] == "a@example.com"));
}

#[tokio::test]
async fn list_without_a_filter_returns_400() {
    let app = spawn_app().await;

    let response = app.list_subscriptions(&[]).await;

    assert_eq!(400, response.status().as_u16());
}
