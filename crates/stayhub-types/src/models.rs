use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error returned when a persisted enum column holds an unknown value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

// -- Roles --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Guest,
    Host,
    Admin,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Guest => "GUEST",
            Self::Host => "HOST",
            Self::Admin => "ADMIN",
        }
    }

    /// Hosts and admins may publish listings.
    pub fn can_host(self) -> bool {
        matches!(self, Self::Host | Self::Admin)
    }
}

impl FromStr for UserRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GUEST" => Ok(Self::Guest),
            "HOST" => Ok(Self::Host),
            "ADMIN" => Ok(Self::Admin),
            other => Err(UnknownVariant { kind: "role", value: other.to_string() }),
        }
    }
}

// -- Booking lifecycle --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
    Completed,
    Refunded,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
            Self::Completed => "COMPLETED",
            Self::Refunded => "REFUNDED",
        }
    }

    /// Allowed status edges. Everything not listed here, self-edges included,
    /// is rejected.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, Refunded)
                | (Cancelled, Refunded)
        )
    }

    /// Active bookings hold their dates against other guests.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "REJECTED" => Ok(Self::Rejected),
            "CANCELLED" => Ok(Self::Cancelled),
            "COMPLETED" => Ok(Self::Completed),
            "REFUNDED" => Ok(Self::Refunded),
            other => Err(UnknownVariant { kind: "booking status", value: other.to_string() }),
        }
    }
}

// -- Payment lifecycle --

/// Mirrors the processor's PaymentIntent statuses, plus `Refunded` once a
/// succeeded charge has been paid back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Succeeded,
    Canceled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RequiresPaymentMethod => "REQUIRES_PAYMENT_METHOD",
            Self::RequiresConfirmation => "REQUIRES_CONFIRMATION",
            Self::RequiresAction => "REQUIRES_ACTION",
            Self::Processing => "PROCESSING",
            Self::RequiresCapture => "REQUIRES_CAPTURE",
            Self::Succeeded => "SUCCEEDED",
            Self::Canceled => "CANCELED",
            Self::Refunded => "REFUNDED",
        }
    }

    /// Map a processor status string (`requires_payment_method`, ...).
    pub fn from_provider(status: &str) -> Option<Self> {
        match status {
            "requires_payment_method" => Some(Self::RequiresPaymentMethod),
            "requires_confirmation" => Some(Self::RequiresConfirmation),
            "requires_action" => Some(Self::RequiresAction),
            "processing" => Some(Self::Processing),
            "requires_capture" => Some(Self::RequiresCapture),
            "succeeded" => Some(Self::Succeeded),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Canceled | Self::Refunded)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REQUIRES_PAYMENT_METHOD" => Ok(Self::RequiresPaymentMethod),
            "REQUIRES_CONFIRMATION" => Ok(Self::RequiresConfirmation),
            "REQUIRES_ACTION" => Ok(Self::RequiresAction),
            "PROCESSING" => Ok(Self::Processing),
            "REQUIRES_CAPTURE" => Ok(Self::RequiresCapture),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "CANCELED" => Ok(Self::Canceled),
            "REFUNDED" => Ok(Self::Refunded),
            other => Err(UnknownVariant { kind: "payment status", value: other.to_string() }),
        }
    }
}

// -- Entities as served by the API --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub host_id: Uuid,
    pub title: String,
    pub description: String,
    pub location: String,
    pub price_per_night: i64,
    pub cleaning_fee: i64,
    pub currency: String,
    pub max_guests: u32,
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub average_rating: Option<f64>,
    pub review_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub host_id: Uuid,
    pub title: String,
    pub description: String,
    pub location: String,
    pub price_per_person: i64,
    pub currency: String,
    pub duration_minutes: u32,
    pub max_participants: u32,
    pub average_rating: Option<f64>,
    pub review_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub guest_id: Uuid,
    pub property_id: Option<Uuid>,
    pub experience_id: Option<Uuid>,
    pub listing_title: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    pub total_price: i64,
    pub currency: String,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub provider: String,
    pub provider_intent_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub refund_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub property_id: Option<Uuid>,
    pub experience_id: Option<Uuid>,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Favorite {
    pub id: Uuid,
    pub property_id: Option<Uuid>,
    pub experience_id: Option<Uuid>,
    pub listing_title: String,
    pub created_at: DateTime<Utc>,
}

/// A date range held by an active booking, `[check_in, check_out)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookedRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_booking_can_be_cancelled() {
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Cancelled));
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Confirmed));
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Rejected));
    }

    #[test]
    fn final_states_are_closed() {
        let all = [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Rejected,
            BookingStatus::Cancelled,
            BookingStatus::Completed,
            BookingStatus::Refunded,
        ];
        for from in [BookingStatus::Rejected, BookingStatus::Completed, BookingStatus::Refunded] {
            for to in all {
                assert!(!from.can_transition_to(to), "{from} -> {to} should be rejected");
            }
        }
        for s in all {
            assert!(!s.can_transition_to(s));
        }
    }

    #[test]
    fn pending_cannot_complete_or_refund() {
        assert!(!BookingStatus::Pending.can_transition_to(BookingStatus::Completed));
        assert!(!BookingStatus::Pending.can_transition_to(BookingStatus::Refunded));
        assert!(BookingStatus::Cancelled.can_transition_to(BookingStatus::Refunded));
    }

    #[test]
    fn status_text_roundtrip() {
        for s in ["PENDING", "CONFIRMED", "REJECTED", "CANCELLED", "COMPLETED", "REFUNDED"] {
            assert_eq!(s.parse::<BookingStatus>().unwrap().as_str(), s);
        }
        assert!("pending".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn provider_statuses_map() {
        assert_eq!(PaymentStatus::from_provider("succeeded"), Some(PaymentStatus::Succeeded));
        assert_eq!(
            PaymentStatus::from_provider("requires_payment_method"),
            Some(PaymentStatus::RequiresPaymentMethod)
        );
        assert_eq!(PaymentStatus::from_provider("refunded"), None);
        assert!(PaymentStatus::Canceled.is_terminal());
        assert!(!PaymentStatus::Processing.is_terminal());
    }

    #[test]
    fn status_serializes_screaming_case() {
        let json = serde_json::to_string(&PaymentStatus::RequiresAction).unwrap();
        assert_eq!(json, "\"REQUIRES_ACTION\"");
        let role: UserRole = serde_json::from_str("\"HOST\"").unwrap();
        assert_eq!(role, UserRole::Host);
    }
}
