mod common;

use axum::http::{HeaderName, HeaderValue};
use chrono::Utc;
use common::{harness, harness_with, Harness, Options, WEBHOOK_SECRET};
use serde_json::{json, Value};
use storescore_server::billing::sign_payload;

async fn user_id(h: &Harness, token: &str) -> String {
    h.me(token).await["id"].as_str().unwrap().to_string()
}

async fn deliver(h: &Harness, event: &Value, secret: &str) -> axum_test::TestResponse {
    let payload = event.to_string();
    let now = Utc::now().timestamp();
    let signature = format!("t={},v1={}", now, sign_payload(secret, now, payload.as_bytes()).unwrap());
    h.server
        .post("/api/billing/webhook")
        .add_header(
            HeaderName::from_static("stripe-signature"),
            HeaderValue::from_str(&signature).unwrap(),
        )
        .text(payload)
        .await
}

#[tokio::test]
async fn trial_runs_once() {
    let h = harness();
    let token = h.register("owner@example.com").await;

    let overview: Value = h.server.get("/api/billing").authorization_bearer(&token).await.json();
    assert_eq!(overview["effectiveStatus"], "free");
    assert_eq!(overview["checkoutAvailable"], false);

    let started = h
        .server
        .post("/api/billing/trial")
        .authorization_bearer(&token)
        .await;
    assert_eq!(started.status_code(), 200);
    let user: Value = started.json();
    assert_eq!(user["credits"], 3);
    assert_eq!(user["effectiveStatus"], "trialing");
    assert_eq!(user["plan"]["trialUsed"], true);

    let overview: Value = h.server.get("/api/billing").authorization_bearer(&token).await.json();
    assert_eq!(overview["trialDaysRemaining"], 7);

    let again = h
        .server
        .post("/api/billing/trial")
        .authorization_bearer(&token)
        .await;
    assert_eq!(again.status_code(), 409);
    assert_eq!(h.me(&token).await["credits"], 3);
}

#[tokio::test]
async fn checkout_requires_stripe() {
    let h = harness();
    let token = h.register("owner@example.com").await;
    let resp = h
        .server
        .post("/api/billing/checkout")
        .authorization_bearer(&token)
        .await;
    assert_eq!(resp.status_code(), 503);
}

#[tokio::test]
async fn checkout_session_redirects_to_dashboard() {
    let h = harness_with(Options {
        with_payments: true,
        ..Options::default()
    });
    let token = h.register("owner@example.com").await;
    let id = user_id(&h, &token).await;

    let resp = h
        .server
        .post("/api/billing/checkout")
        .authorization_bearer(&token)
        .await;
    assert_eq!(resp.status_code(), 200);
    let body: Value = resp.json();
    assert_eq!(body["id"], "cs_test_1");
    assert_eq!(body["url"], "https://checkout.stripe.com/c/pay/cs_test_1");

    let requests = h.payments.as_ref().unwrap().requests.lock().unwrap().clone();
    assert_eq!(
        requests,
        vec![(
            id,
            "https://app.storescore.test/billing?status=success".to_string(),
            "https://app.storescore.test/billing?status=cancel".to_string(),
        )]
    );
}

#[tokio::test]
async fn webhook_activates_and_grants_once() {
    let h = harness();
    let token = h.register("owner@example.com").await;
    let id = user_id(&h, &token).await;

    let event = json!({
        "id": "evt_checkout_1",
        "type": "checkout.session.completed",
        "data": { "object": {
            "client_reference_id": id,
            "customer": "cus_123",
            "subscription": "sub_123"
        }}
    });

    let first = deliver(&h, &event, WEBHOOK_SECRET).await;
    assert_eq!(first.status_code(), 200);
    assert_eq!(first.json::<Value>(), json!({ "received": true, "duplicate": false }));

    let again = deliver(&h, &event, WEBHOOK_SECRET).await;
    assert_eq!(again.status_code(), 200);
    assert_eq!(again.json::<Value>()["duplicate"], true);

    let me = h.me(&token).await;
    assert_eq!(me["credits"], 50);
    assert_eq!(me["effectiveStatus"], "active");
    assert_eq!(me["plan"]["stripeCustomerId"], "cus_123");

    let canceled = json!({
        "id": "evt_sub_deleted_1",
        "type": "customer.subscription.deleted",
        "data": { "object": { "id": "sub_123", "customer": "cus_123" } }
    });
    assert_eq!(deliver(&h, &canceled, WEBHOOK_SECRET).await.status_code(), 200);
    assert_eq!(h.me(&token).await["effectiveStatus"], "canceled");
}

#[tokio::test]
async fn webhook_rejects_bad_signatures() {
    let h = harness();
    let event = json!({ "id": "evt_1", "type": "invoice.paid", "data": { "object": {} } });

    let forged = deliver(&h, &event, "whsec_attacker").await;
    assert_eq!(forged.status_code(), 400);

    let unsigned = h
        .server
        .post("/api/billing/webhook")
        .text(event.to_string())
        .await;
    assert_eq!(unsigned.status_code(), 400);

    // Nothing was recorded, so a properly signed delivery still applies.
    let genuine = deliver(&h, &event, WEBHOOK_SECRET).await;
    assert_eq!(genuine.json::<Value>()["duplicate"], false);
}

#[tokio::test]
async fn unknown_events_are_acknowledged() {
    let h = harness();
    let event = json!({ "id": "evt_misc", "type": "charge.refunded", "data": { "object": {} } });
    let resp = deliver(&h, &event, WEBHOOK_SECRET).await;
    assert_eq!(resp.status_code(), 200);
    assert_eq!(resp.json::<Value>()["received"], true);
}
