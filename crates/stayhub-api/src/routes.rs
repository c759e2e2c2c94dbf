use axum::{
    Json, Router, middleware,
    routing::{delete, get, patch, post},
};
use serde_json::{Value, json};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, bookings, experiences, favorites, organizations, payments, properties, reviews, webhook};

/// The full HTTP surface. Callers add CORS and tracing layers.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/public/organizations/{slug}", get(organizations::get_by_slug))
        .route("/api/public/properties", get(properties::list_public))
        .route("/api/public/properties/{id}", get(properties::get_public))
        .route("/api/public/properties/{id}/reviews", get(properties::reviews))
        .route("/api/public/properties/{id}/booked-dates", get(properties::booked_dates))
        .route("/api/public/experiences", get(experiences::list_public))
        .route("/api/public/experiences/{id}", get(experiences::get_public))
        .route("/api/public/experiences/{id}/reviews", get(experiences::reviews))
        .route("/api/payments/config", get(payments::config))
        .route("/api/payments/webhook", post(webhook::receive))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        // Listings
        .route("/api/properties", post(properties::create))
        .route("/api/properties/mine", get(properties::mine))
        .route("/api/properties/{id}", patch(properties::update).delete(properties::delete))
        .route("/api/experiences", post(experiences::create))
        .route("/api/experiences/mine", get(experiences::mine))
        .route("/api/experiences/{id}", patch(experiences::update).delete(experiences::delete))
        // Bookings
        .route("/api/bookings", post(bookings::create).get(bookings::list_mine))
        .route("/api/bookings/host", get(bookings::list_host))
        .route("/api/bookings/{id}", get(bookings::get))
        .route("/api/bookings/{id}/cancel", post(bookings::cancel))
        .route("/api/bookings/{id}/reject", post(bookings::reject))
        .route("/api/bookings/{id}/complete", post(bookings::complete))
        // Payments
        .route("/api/payments/intent", post(payments::create_intent))
        .route("/api/payments/{id}/confirm", post(payments::confirm))
        .route("/api/payments/booking/{booking_id}", get(payments::get_by_booking))
        // Reviews & favorites
        .route("/api/reviews", post(reviews::create))
        .route("/api/reviews/mine", get(reviews::mine))
        .route("/api/reviews/{id}", delete(reviews::delete))
        .route("/api/favorites", get(favorites::list))
        .route("/api/favorites/toggle", post(favorites::toggle))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
