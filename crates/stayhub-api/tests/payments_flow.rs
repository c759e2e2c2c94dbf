mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};

use stayhub_api::webhook::{SIGNATURE_HEADER, signature_header};
use stayhub_types::models::PaymentStatus;

use common::{TestApp, WEBHOOK_SECRET};

fn signed(payload: &str) -> Option<String> {
    let now = chrono::Utc::now().timestamp();
    Some(signature_header(WEBHOOK_SECRET, now, payload.as_bytes()).unwrap())
}

async fn open_intent(app: &TestApp, guest: &str, booking_id: &str) -> (StatusCode, Value) {
    app.post("/api/payments/intent", guest, json!({ "booking_id": booking_id })).await
}

fn intent_id_for(app: &TestApp, booking_id: &str) -> String {
    app.state
        .db
        .get_payment_by_booking(booking_id)
        .unwrap()
        .unwrap()
        .provider_intent_id
        .unwrap()
}

fn webhook_request(payload: &str, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/payments/webhook")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(payload.to_string())).unwrap()
}

#[tokio::test]
async fn config_is_public() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::GET, "/api/payments/config", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider"], "mock");
    assert_eq!(body["publishable_key"], "pk_test_123");
}

#[tokio::test]
async fn intent_is_created_once_and_reused() {
    let (app, _host, guest, booking) = TestApp::with_booking().await;
    let booking_id = booking["id"].as_str().unwrap();

    let (status, first) = open_intent(&app, &guest, booking_id).await;
    assert_eq!(status, StatusCode::CREATED, "{}", first);
    assert_eq!(first["amount"], 32_500);
    assert_eq!(first["status"], "REQUIRES_PAYMENT_METHOD");
    assert!(first["client_secret"].as_str().unwrap().contains("_secret_"));

    let (status, second) = open_intent(&app, &guest, booking_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["client_secret"], first["client_secret"]);
    assert_eq!(second["payment_id"], first["payment_id"]);
    assert_eq!(app.provider.intent_count(), 1);

    let stranger = app.register("stranger@example.com", "GUEST").await;
    let (status, _) = open_intent(&app, &stranger, booking_id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn intent_without_client_secret_is_populated() {
    let (app, _host, guest, booking) = TestApp::with_booking().await;
    let booking_id = booking["id"].as_str().unwrap().to_string();

    let (_, first) = open_intent(&app, &guest, &booking_id).await;
    let payment_id = first["payment_id"].as_str().unwrap().to_string();

    let id = payment_id.clone();
    app.state
        .db
        .with_conn_mut(move |conn| {
            conn.execute("UPDATE payments SET client_secret = NULL WHERE id = ?1", [&id])?;
            Ok(())
        })
        .unwrap();
    assert!(app.state.db.get_payment(&payment_id).unwrap().unwrap().client_secret.is_none());

    let (status, refreshed) = open_intent(&app, &guest, &booking_id).await;
    assert_eq!(status, StatusCode::OK, "{}", refreshed);
    assert_eq!(refreshed["payment_id"], payment_id.as_str());
    let secret = refreshed["client_secret"].as_str().unwrap();
    assert!(!secret.is_empty());
    assert_ne!(refreshed["client_secret"], first["client_secret"]);

    let stored = app.state.db.get_payment(&payment_id).unwrap().unwrap();
    assert_eq!(stored.client_secret.as_deref(), Some(secret));
    assert_eq!(app.provider.intent_count(), 2);
}

#[tokio::test]
async fn confirm_then_cancel_refunds() {
    let (app, host, guest, booking) = TestApp::with_booking().await;
    let booking_id = booking["id"].as_str().unwrap();

    let (_, intent) = open_intent(&app, &guest, booking_id).await;
    let payment_id = intent["payment_id"].as_str().unwrap();

    let (status, confirmed) = app
        .post(&format!("/api/payments/{}/confirm", payment_id), &guest, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", confirmed);
    assert_eq!(confirmed["payment"]["status"], "SUCCEEDED");
    assert_eq!(confirmed["booking"]["status"], "CONFIRMED");

    // Confirming twice is harmless.
    let (status, again) = app
        .post(&format!("/api/payments/{}/confirm", payment_id), &guest, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["booking"]["status"], "CONFIRMED");

    // Paid bookings cannot get a second intent.
    let (status, _) = open_intent(&app, &guest, booking_id).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The stay has not happened yet.
    let (status, _) = app
        .post(&format!("/api/bookings/{}/complete", booking_id), &host, json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, cancelled) = app
        .post(&format!("/api/bookings/{}/cancel", booking_id), &guest, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", cancelled);
    assert_eq!(cancelled["status"], "REFUNDED");

    let (status, payment) = app
        .get(&format!("/api/payments/booking/{}", booking_id), &guest)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payment["status"], "REFUNDED");
    assert!(payment["refund_id"].as_str().unwrap().starts_with("re_mock_"));

    // The provider still reports the intent as succeeded; the refund stands.
    let (status, again) = app
        .post(&format!("/api/payments/{}/confirm", payment_id), &guest, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", again);
    assert_eq!(again["payment"]["status"], "REFUNDED");
    assert_eq!(again["booking"]["status"], "REFUNDED");
}

#[tokio::test]
async fn unfinished_checkout_leaves_booking_pending() {
    let (app, _host, guest, booking) = TestApp::with_booking().await;
    let booking_id = booking["id"].as_str().unwrap();

    let (_, intent) = open_intent(&app, &guest, booking_id).await;
    let payment_id = intent["payment_id"].as_str().unwrap();
    app.provider
        .set_status(&intent_id_for(&app, booking_id), PaymentStatus::RequiresAction)
        .unwrap();

    let (status, body) = app
        .post(&format!("/api/payments/{}/confirm", payment_id), &guest, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment"]["status"], "REQUIRES_ACTION");
    assert_eq!(body["booking"]["status"], "PENDING");

    // Cancelling now voids the open intent.
    let (_, cancelled) = app
        .post(&format!("/api/bookings/{}/cancel", booking_id), &guest, json!({}))
        .await;
    assert_eq!(cancelled["status"], "CANCELLED");
    let (_, payment) = app
        .get(&format!("/api/payments/booking/{}", booking_id), &guest)
        .await;
    assert_eq!(payment["status"], "CANCELED");

    // A later confirm does not revive the voided intent.
    let (status, again) = app
        .post(&format!("/api/payments/{}/confirm", payment_id), &guest, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["payment"]["status"], "CANCELED");
    assert_eq!(again["booking"]["status"], "CANCELLED");
}

#[tokio::test]
async fn webhook_checks_signatures_and_settles() {
    let (app, _host, guest, booking) = TestApp::with_booking().await;
    let booking_id = booking["id"].as_str().unwrap();
    open_intent(&app, &guest, booking_id).await;
    let intent_id = intent_id_for(&app, booking_id);

    let payload = json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": intent_id, "status": "succeeded" } }
    })
    .to_string();
    let now = chrono::Utc::now().timestamp();

    let (status, _) = app.send(webhook_request(&payload, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let wrong = signature_header("whsec_wrong", now, payload.as_bytes()).unwrap();
    let (status, _) = app.send(webhook_request(&payload, Some(wrong))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let stale = signature_header(WEBHOOK_SECRET, now - 3_600, payload.as_bytes()).unwrap();
    let (status, _) = app.send(webhook_request(&payload, Some(stale))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let good = signature_header(WEBHOOK_SECRET, now, payload.as_bytes()).unwrap();
    let (status, body) = app.send(webhook_request(&payload, Some(good.clone()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);

    let (_, current) = app.get(&format!("/api/bookings/{}", booking_id), &guest).await;
    assert_eq!(current["status"], "CONFIRMED");

    // Redelivery is acknowledged and changes nothing.
    let (status, _) = app.send(webhook_request(&payload, Some(good))).await;
    assert_eq!(status, StatusCode::OK);

    // Unknown event types and intents are acknowledged.
    let other = json!({
        "id": "evt_2",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_unknown" } }
    })
    .to_string();
    let signed = signature_header(WEBHOOK_SECRET, now, other.as_bytes()).unwrap();
    let (status, _) = app.send(webhook_request(&other, Some(signed))).await;
    assert_eq!(status, StatusCode::OK);

    // A refund from the dashboard lands on the booking too.
    let refund = json!({
        "id": "evt_3",
        "type": "charge.refunded",
        "data": { "object": { "id": "ch_1", "payment_intent": intent_id } }
    })
    .to_string();
    let signed = signature_header(WEBHOOK_SECRET, now, refund.as_bytes()).unwrap();
    let (status, _) = app.send(webhook_request(&refund, Some(signed))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, current) = app.get(&format!("/api/bookings/{}", booking_id), &guest).await;
    assert_eq!(current["status"], "REFUNDED");
}

#[tokio::test]
async fn webhook_is_unavailable_without_a_secret() {
    let app = TestApp::without_webhooks();
    let payload = json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_1" } }
    })
    .to_string();

    let (status, body) = app.send(webhook_request(&payload, signed(&payload))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn webhook_failure_and_cancel_keep_booking_pending() {
    let (app, _host, guest, booking) = TestApp::with_booking().await;
    let booking_id = booking["id"].as_str().unwrap();
    let (_, intent) = open_intent(&app, &guest, booking_id).await;
    let payment_id = intent["payment_id"].as_str().unwrap();
    let intent_id = intent_id_for(&app, booking_id);

    app.provider.set_status(&intent_id, PaymentStatus::Processing).unwrap();
    let (_, body) = app
        .post(&format!("/api/payments/{}/confirm", payment_id), &guest, json!({}))
        .await;
    assert_eq!(body["payment"]["status"], "PROCESSING");

    let failed = json!({
        "id": "evt_fail",
        "type": "payment_intent.payment_failed",
        "data": { "object": { "id": intent_id, "status": "requires_payment_method" } }
    })
    .to_string();
    let (status, _) = app.send(webhook_request(&failed, signed(&failed))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, payment) = app.get(&format!("/api/payments/booking/{}", booking_id), &guest).await;
    assert_eq!(payment["status"], "REQUIRES_PAYMENT_METHOD");
    let (_, current) = app.get(&format!("/api/bookings/{}", booking_id), &guest).await;
    assert_eq!(current["status"], "PENDING");

    let canceled = json!({
        "id": "evt_cancel",
        "type": "payment_intent.canceled",
        "data": { "object": { "id": intent_id, "status": "canceled" } }
    })
    .to_string();
    let (status, _) = app.send(webhook_request(&canceled, signed(&canceled))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, payment) = app.get(&format!("/api/payments/booking/{}", booking_id), &guest).await;
    assert_eq!(payment["status"], "CANCELED");
    let (_, current) = app.get(&format!("/api/bookings/{}", booking_id), &guest).await;
    assert_eq!(current["status"], "PENDING");

    // A stray success after the cancel is ignored.
    let late = json!({
        "id": "evt_late",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": intent_id, "status": "succeeded" } }
    })
    .to_string();
    let (status, _) = app.send(webhook_request(&late, signed(&late))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, payment) = app.get(&format!("/api/payments/booking/{}", booking_id), &guest).await;
    assert_eq!(payment["status"], "CANCELED");

    // The guest can start over with a fresh intent.
    let (status, fresh) = open_intent(&app, &guest, booking_id).await;
    assert_eq!(status, StatusCode::OK, "{}", fresh);
    assert_eq!(fresh["status"], "REQUIRES_PAYMENT_METHOD");
}
