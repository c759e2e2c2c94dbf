use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Booking, Payment, PaymentStatus, User, UserRole};

// -- JWT Claims --

/// JWT claims issued at login and checked by the REST middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub org: Uuid,
    pub role: UserRole,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Option<UserRole>,
    /// Organization slug. Missing means the default organization.
    pub organization: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

// -- Listings --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePropertyRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub location: String,
    pub price_per_night: i64,
    #[serde(default)]
    pub cleaning_fee: i64,
    pub currency: Option<String>,
    pub max_guests: u32,
    #[serde(default = "one")]
    pub bedrooms: u32,
    #[serde(default = "one")]
    pub bathrooms: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePropertyRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub price_per_night: Option<i64>,
    pub cleaning_fee: Option<i64>,
    pub currency: Option<String>,
    pub max_guests: Option<u32>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateExperienceRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub location: String,
    pub price_per_person: i64,
    pub currency: Option<String>,
    pub duration_minutes: u32,
    pub max_participants: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateExperienceRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub price_per_person: Option<i64>,
    pub currency: Option<String>,
    pub duration_minutes: Option<u32>,
    pub max_participants: Option<u32>,
}

/// Query string accepted by the public listing endpoints.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ListingQuery {
    pub org: Option<String>,
    pub location: Option<String>,
    pub guests: Option<u32>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// -- Bookings --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateBookingRequest {
    pub property_id: Option<Uuid>,
    pub experience_id: Option<Uuid>,
    pub check_in: NaiveDate,
    pub check_out: Option<NaiveDate>,
    pub guests: u32,
}

// -- Payments --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateIntentRequest {
    pub booking_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IntentResponse {
    pub payment_id: Uuid,
    pub client_secret: String,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmPaymentResponse {
    pub payment: Payment,
    pub booking: Booking,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentConfigResponse {
    pub provider: String,
    pub publishable_key: String,
}

// -- Reviews --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateReviewRequest {
    pub booking_id: Uuid,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

// -- Favorites --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToggleFavoriteRequest {
    pub property_id: Option<Uuid>,
    pub experience_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleFavoriteResponse {
    pub added: bool,
}

fn one() -> u32 {
    1
}
