use avy_alerts::domain::{NewSubscription, Subscription, ZoneId};
use avy_alerts::store::{InMemoryStore, SubscriptionStore, WatermarkStore};
use chrono::{Duration, Utc};
use wiremock::{
    Mock, ResponseTemplate,
    matchers::{method, path},
};

use crate::helpers::{nwac, product, spawn_app_with_store};

async fn subscribe(store: &InMemoryStore, email: &str, zone_id: &str) {
    let subscription = Subscription::new(
        NewSubscription::parse(email.into(), zone_id).unwrap(),
        Utc::now(),
    );
    store.create(&subscription).await.unwrap();
}

#[tokio::test]
async fn new_forecast_is_emailed_once_to_each_subscriber() {
    let t0 = Utc::now() - Duration::hours(5);
    let zone = ZoneId::parse("NWAC_10").unwrap();
    let store = InMemoryStore::new()
        .with_center(nwac())
        .with_watermark(zone.clone(), t0);
    subscribe(&store, "first@example.com", "NWAC_10").await;
    subscribe(&store, "second@example.com", "NWAC_10").await;
    let app = spawn_app_with_store(store).await;

    let issued = t0 + Duration::hours(1);
    app.mount_products(
        "NWAC",
        serde_json::json!([product(1, issued, &[("10", "Mt Hood")])]),
    )
    .await;
    Mock::given(path("/v1/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&app.email_server)
        .await;

    let dispatcher = app.dispatcher();
    let report = dispatcher.poll_once().await;
    assert_eq!(report.emails_sent, 2);

    // Restarting with the same persisted watermark sends nothing new.
    let report = app.dispatcher().poll_once().await;
    assert_eq!(report.emails_sent, 0);

    let watermark = WatermarkStore::get(app.store.as_ref(), &zone).await.unwrap();
    assert_eq!(
        watermark.map(|w| w.timestamp()),
        Some(issued.timestamp())
    );
    assert!(app
        .store
        .subscriptions()
        .await
        .iter()
        .all(|s| s.last_notified.is_some()));
}

#[tokio::test]
async fn failed_emails_do_not_hold_back_the_watermark() {
    let zone = ZoneId::parse("NWAC_10").unwrap();
    let store = InMemoryStore::new().with_center(nwac());
    subscribe(&store, "first@example.com", "NWAC_10").await;
    let app = spawn_app_with_store(store).await;

    app.mount_products(
        "NWAC",
        serde_json::json!([product(1, Utc::now() - Duration::hours(1), &[("10", "Mt Hood")])]),
    )
    .await;
    Mock::given(path("/v1/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&app.email_server)
        .await;

    let report = app.dispatcher().poll_once().await;

    assert_eq!(report.emails_failed, 1);
    assert!(WatermarkStore::get(app.store.as_ref(), &zone)
        .await
        .unwrap()
        .is_some());
    assert!(app.store.subscriptions().await[0].last_notified.is_none());
}

#[tokio::test]
async fn center_subscriber_receives_a_single_digest() {
    let store = InMemoryStore::new().with_center(nwac());
    subscribe(&store, "everything@example.com", "NWAC").await;
    let app = spawn_app_with_store(store).await;

    app.mount_products(
        "NWAC",
        serde_json::json!([product(
            1,
            Utc::now() - Duration::hours(1),
            &[("10", "Mt Hood"), ("2", "Stevens Pass")]
        )]),
    )
    .await;
    Mock::given(path("/v1/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.email_server)
        .await;

    app.dispatcher().poll_once().await;

    let received = app.email_server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(
        body["subject"],
        "Northwest Avalanche Center Avalanche Center Forecast Summary"
    );
    let text = body["text"].as_str().unwrap();
    assert!(text.contains("Mt Hood"));
    assert!(text.contains("Stevens Pass"));
}
