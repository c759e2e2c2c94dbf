//! Database row types. These map directly to SQLite rows and are kept
//! distinct from the stayhub-types API models; `TryFrom` impls convert.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use stayhub_types::models::{
    Booking, Experience, Favorite, Organization, Payment, Property, Review, User,
};

/// A bookable or favoritable listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingRef {
    Property(String),
    Experience(String),
}

impl ListingRef {
    /// Build from a pair of optional ids; exactly one must be present.
    pub fn from_ids(property_id: Option<Uuid>, experience_id: Option<Uuid>) -> Option<Self> {
        match (property_id, experience_id) {
            (Some(p), None) => Some(Self::Property(p.to_string())),
            (None, Some(e)) => Some(Self::Experience(e.to_string())),
            _ => None,
        }
    }

    pub fn property_id(&self) -> Option<&str> {
        match self {
            Self::Property(id) => Some(id),
            Self::Experience(_) => None,
        }
    }

    pub fn experience_id(&self) -> Option<&str> {
        match self {
            Self::Property(_) => None,
            Self::Experience(id) => Some(id),
        }
    }
}

pub struct OrganizationRow {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub created_at: String,
}

pub struct UserRow {
    pub id: String,
    pub organization_id: String,
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: String,
    pub created_at: String,
}

pub struct PropertyRow {
    pub id: String,
    pub organization_id: String,
    pub host_id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub price_per_night: i64,
    pub cleaning_fee: i64,
    pub currency: String,
    pub max_guests: i64,
    pub bedrooms: i64,
    pub bathrooms: i64,
    pub average_rating: Option<f64>,
    pub review_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

pub struct ExperienceRow {
    pub id: String,
    pub organization_id: String,
    pub host_id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub price_per_person: i64,
    pub currency: String,
    pub duration_minutes: i64,
    pub max_participants: i64,
    pub average_rating: Option<f64>,
    pub review_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Booking joined with the listing it points at, so handlers can authorize
/// hosts without a second lookup.
pub struct BookingRow {
    pub id: String,
    pub guest_id: String,
    pub property_id: Option<String>,
    pub experience_id: Option<String>,
    pub listing_title: String,
    pub listing_host_id: String,
    pub listing_organization_id: String,
    pub check_in: String,
    pub check_out: String,
    pub guests: i64,
    pub total_price: i64,
    pub currency: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct PaymentRow {
    pub id: String,
    pub booking_id: String,
    pub provider: String,
    pub provider_intent_id: Option<String>,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub refund_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct ReviewRow {
    pub id: String,
    pub booking_id: String,
    pub author_id: String,
    pub author_name: String,
    pub property_id: Option<String>,
    pub experience_id: Option<String>,
    pub listing_organization_id: String,
    pub rating: i64,
    pub comment: String,
    pub created_at: String,
}

pub struct FavoriteRow {
    pub id: String,
    pub user_id: String,
    pub property_id: Option<String>,
    pub experience_id: Option<String>,
    pub listing_title: String,
    pub created_at: String,
}

// -- Column parsing --

pub fn parse_uuid(value: &str) -> Result<Uuid> {
    value.parse().with_context(|| format!("corrupt id '{}'", value))
}

fn parse_opt_uuid(value: Option<&str>) -> Result<Option<Uuid>> {
    value.map(parse_uuid).transpose()
}

/// SQLite stores `datetime('now')` as "YYYY-MM-DD HH:MM:SS" without timezone.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .with_context(|| format!("corrupt timestamp '{}'", value))
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").with_context(|| format!("corrupt date '{}'", value))
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).with_context(|| format!("{} out of range: {}", column, value))
}

// -- Conversions --

impl TryFrom<OrganizationRow> for Organization {
    type Error = anyhow::Error;

    fn try_from(row: OrganizationRow) -> Result<Self> {
        Ok(Self {
            id: parse_uuid(&row.id)?,
            name: row.name,
            slug: row.slug,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(Self {
            id: parse_uuid(&row.id)?,
            organization_id: parse_uuid(&row.organization_id)?,
            email: row.email,
            name: row.name,
            role: row.role.parse()?,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

impl TryFrom<PropertyRow> for Property {
    type Error = anyhow::Error;

    fn try_from(row: PropertyRow) -> Result<Self> {
        Ok(Self {
            id: parse_uuid(&row.id)?,
            organization_id: parse_uuid(&row.organization_id)?,
            host_id: parse_uuid(&row.host_id)?,
            title: row.title,
            description: row.description,
            location: row.location,
            price_per_night: row.price_per_night,
            cleaning_fee: row.cleaning_fee,
            currency: row.currency,
            max_guests: to_u32(row.max_guests, "max_guests")?,
            bedrooms: to_u32(row.bedrooms, "bedrooms")?,
            bathrooms: to_u32(row.bathrooms, "bathrooms")?,
            average_rating: row.average_rating,
            review_count: to_u32(row.review_count, "review_count")?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

impl TryFrom<ExperienceRow> for Experience {
    type Error = anyhow::Error;

    fn try_from(row: ExperienceRow) -> Result<Self> {
        Ok(Self {
            id: parse_uuid(&row.id)?,
            organization_id: parse_uuid(&row.organization_id)?,
            host_id: parse_uuid(&row.host_id)?,
            title: row.title,
            description: row.description,
            location: row.location,
            price_per_person: row.price_per_person,
            currency: row.currency,
            duration_minutes: to_u32(row.duration_minutes, "duration_minutes")?,
            max_participants: to_u32(row.max_participants, "max_participants")?,
            average_rating: row.average_rating,
            review_count: to_u32(row.review_count, "review_count")?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

impl TryFrom<BookingRow> for Booking {
    type Error = anyhow::Error;

    fn try_from(row: BookingRow) -> Result<Self> {
        Ok(Self {
            id: parse_uuid(&row.id)?,
            guest_id: parse_uuid(&row.guest_id)?,
            property_id: parse_opt_uuid(row.property_id.as_deref())?,
            experience_id: parse_opt_uuid(row.experience_id.as_deref())?,
            listing_title: row.listing_title,
            check_in: parse_date(&row.check_in)?,
            check_out: parse_date(&row.check_out)?,
            guests: to_u32(row.guests, "guests")?,
            total_price: row.total_price,
            currency: row.currency,
            status: row.status.parse()?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

impl TryFrom<PaymentRow> for Payment {
    type Error = anyhow::Error;

    fn try_from(row: PaymentRow) -> Result<Self> {
        Ok(Self {
            id: parse_uuid(&row.id)?,
            booking_id: parse_uuid(&row.booking_id)?,
            provider: row.provider,
            provider_intent_id: row.provider_intent_id,
            amount: row.amount,
            currency: row.currency,
            status: row.status.parse()?,
            refund_id: row.refund_id,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

impl TryFrom<ReviewRow> for Review {
    type Error = anyhow::Error;

    fn try_from(row: ReviewRow) -> Result<Self> {
        let rating = u8::try_from(row.rating).with_context(|| format!("rating out of range: {}", row.rating))?;
        Ok(Self {
            id: parse_uuid(&row.id)?,
            booking_id: parse_uuid(&row.booking_id)?,
            author_id: parse_uuid(&row.author_id)?,
            author_name: row.author_name,
            property_id: parse_opt_uuid(row.property_id.as_deref())?,
            experience_id: parse_opt_uuid(row.experience_id.as_deref())?,
            rating,
            comment: row.comment,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

impl TryFrom<FavoriteRow> for Favorite {
    type Error = anyhow::Error;

    fn try_from(row: FavoriteRow) -> Result<Self> {
        Ok(Self {
            id: parse_uuid(&row.id)?,
            property_id: parse_opt_uuid(row.property_id.as_deref())?,
            experience_id: parse_opt_uuid(row.experience_id.as_deref())?,
            listing_title: row.listing_title,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_timestamps_parse_as_utc() {
        let ts = parse_timestamp("2026-03-01 12:30:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-03-01T12:30:00+00:00");
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn listing_ref_requires_exactly_one_id() {
        let id = Uuid::new_v4();
        assert_eq!(ListingRef::from_ids(Some(id), None), Some(ListingRef::Property(id.to_string())));
        assert!(ListingRef::from_ids(Some(id), Some(id)).is_none());
        assert!(ListingRef::from_ids(None, None).is_none());
    }
}
