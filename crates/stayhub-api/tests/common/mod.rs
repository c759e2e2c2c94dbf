#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::{Days, NaiveDate, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use stayhub_api::provider::MockPaymentProvider;
use stayhub_api::state::{AppState, AppStateInner};
use stayhub_db::Database;

pub const WEBHOOK_SECRET: &str = "whsec_test";

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub provider: Arc<MockPaymentProvider>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(Some(WEBHOOK_SECRET))
    }

    /// An app whose webhook endpoint has no signing secret.
    pub fn without_webhooks() -> Self {
        Self::build(None)
    }

    fn build(webhook_secret: Option<&str>) -> Self {
        let provider = Arc::new(MockPaymentProvider::new());
        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: "test-secret".into(),
            provider: provider.clone(),
            publishable_key: "pk_test_123".into(),
            webhook_secret: webhook_secret.map(String::from),
        });
        Self { app: stayhub_api::router(state.clone()), state, provider }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(token), Some(body)).await
    }

    /// Register an account and return its token.
    pub async fn register(&self, email: &str, role: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "email": email, "password": "password123", "name": "Test User", "role": role })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn create_property(&self, host: &str) -> String {
        let (status, body) = self
            .post(
                "/api/properties",
                host,
                json!({
                    "title": "Loft by the river",
                    "location": "Lisbon, Portugal",
                    "price_per_night": 10_000,
                    "cleaning_fee": 2_500,
                    "max_guests": 3
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["id"].as_str().unwrap().to_string()
    }

    /// A four-seat tasting at 50.00 per person.
    pub async fn create_experience(&self, host: &str) -> String {
        let (status, body) = self
            .post(
                "/api/experiences",
                host,
                json!({
                    "title": "Port wine tasting",
                    "location": "Porto, Portugal",
                    "price_per_person": 5_000,
                    "duration_minutes": 90,
                    "max_participants": 4
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["id"].as_str().unwrap().to_string()
    }

    pub async fn book(&self, guest: &str, property_id: &str, from: u64, to: u64) -> (StatusCode, Value) {
        self.post(
            "/api/bookings",
            guest,
            json!({
                "property_id": property_id,
                "check_in": days_from_now(from),
                "check_out": days_from_now(to),
                "guests": 2
            }),
        )
        .await
    }

    /// Host, guest, property and one pending three-night booking.
    pub async fn with_booking() -> (Self, String, String, Value) {
        let app = Self::new();
        let host = app.register("host@example.com", "HOST").await;
        let guest = app.register("guest@example.com", "GUEST").await;
        let property_id = app.create_property(&host).await;
        let (status, booking) = app.book(&guest, &property_id, 10, 13).await;
        assert_eq!(status, StatusCode::CREATED, "{}", booking);
        (app, host, guest, booking)
    }
}

pub fn days_from_now(days: u64) -> NaiveDate {
    Utc::now().date_naive().checked_add_days(Days::new(days)).unwrap()
}
