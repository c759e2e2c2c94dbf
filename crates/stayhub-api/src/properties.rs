use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use stayhub_db::listings::{DeleteOutcome, ListingFilter, NewProperty, PropertyChanges};
use stayhub_db::models::{ListingRef, parse_date};
use stayhub_types::api::{Claims, CreatePropertyRequest, ListingQuery, UpdatePropertyRequest};
use stayhub_types::models::{BookedRange, Property, Review};

use crate::error::ApiError;
use crate::middleware::{can_manage, require_host};
use crate::state::{AppState, blocking};
use crate::validation;

const DEFAULT_PAGE: u32 = 20;
const MAX_PAGE: u32 = 100;

pub(crate) fn listing_filter(query: ListingQuery) -> Result<ListingFilter, ApiError> {
    if let (Some(min), Some(max)) = (query.min_price, query.max_price) {
        if min > max {
            return Err(ApiError::bad_request("min_price cannot exceed max_price"));
        }
    }

    Ok(ListingFilter {
        org_slug: query.org.filter(|s| !s.is_empty()),
        location: query.location.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        min_capacity: query.guests.map(i64::from),
        min_price: query.min_price,
        max_price: query.max_price,
        limit: i64::from(query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE)),
        offset: i64::from(query.offset.unwrap_or(0)),
    })
}

// -- Public --

pub async fn list_public(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = listing_filter(query)?;
    let rows = blocking(&state, move |db| db.list_properties(&filter)).await?;
    let properties = rows
        .into_iter()
        .map(Property::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(properties))
}

pub async fn get_public(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(load(&state, property_id).await?))
}

pub async fn reviews(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    load(&state, property_id).await?;
    let listing = ListingRef::Property(property_id.to_string());
    let rows = blocking(&state, move |db| db.list_reviews_for_listing(&listing)).await?;
    let reviews = rows
        .into_iter()
        .map(Review::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(reviews))
}

/// Ranges a booking form should grey out.
pub async fn booked_dates(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    load(&state, property_id).await?;
    let id = property_id.to_string();
    let today = chrono::Utc::now().date_naive().to_string();
    let rows = blocking(&state, move |db| db.booked_ranges(&id, &today)).await?;

    let ranges = rows
        .into_iter()
        .map(|(check_in, check_out)| -> anyhow::Result<BookedRange> {
            Ok(BookedRange {
                check_in: parse_date(&check_in)?,
                check_out: parse_date(&check_out)?,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(ranges))
}

// -- Host --

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePropertyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_host(&claims)?;

    let property_id = Uuid::new_v4();
    let new = NewProperty {
        id: property_id.to_string(),
        organization_id: claims.org.to_string(),
        host_id: claims.sub.to_string(),
        title: validation::title(&req.title)?,
        description: validation::description(&req.description)?,
        location: validation::location(&req.location)?,
        price_per_night: validation::amount("price_per_night", req.price_per_night)?,
        cleaning_fee: validation::amount("cleaning_fee", req.cleaning_fee)?,
        currency: validation::currency(req.currency.as_deref())?,
        max_guests: validation::capacity("max_guests", req.max_guests)?,
        bedrooms: i64::from(req.bedrooms),
        bathrooms: i64::from(req.bathrooms),
    };

    blocking(&state, move |db| db.insert_property(&new)).await?;
    info!("Host {} listed property {}", claims.sub, property_id);

    Ok((StatusCode::CREATED, Json(load(&state, property_id).await?)))
}

pub async fn mine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_host(&claims)?;
    let host_id = claims.sub.to_string();
    let rows = blocking(&state, move |db| db.list_properties_by_host(&host_id)).await?;
    let properties = rows
        .into_iter()
        .map(Property::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(properties))
}

pub async fn update(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdatePropertyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = load(&state, property_id).await?;
    ensure_manager(&claims, &existing)?;

    let changes = PropertyChanges {
        title: validation::optional(req.title.as_deref(), validation::title)?,
        description: validation::optional(req.description.as_deref(), validation::description)?,
        location: validation::optional(req.location.as_deref(), validation::location)?,
        price_per_night: validation::optional(req.price_per_night, |v| validation::amount("price_per_night", v))?,
        cleaning_fee: validation::optional(req.cleaning_fee, |v| validation::amount("cleaning_fee", v))?,
        currency: validation::optional(req.currency.as_deref(), |v| validation::currency(Some(v)))?,
        max_guests: validation::optional(req.max_guests, |v| validation::capacity("max_guests", v))?,
        bedrooms: req.bedrooms.map(i64::from),
        bathrooms: req.bathrooms.map(i64::from),
    };

    let id = property_id.to_string();
    if !blocking(&state, move |db| db.update_property(&id, &changes)).await? {
        return Err(ApiError::not_found("Property"));
    }

    Ok(Json(load(&state, property_id).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = load(&state, property_id).await?;
    ensure_manager(&claims, &existing)?;

    let id = property_id.to_string();
    match blocking(&state, move |db| db.delete_property(&id)).await? {
        DeleteOutcome::Deleted => {
            info!("Property {} deleted by {}", property_id, claims.sub);
            Ok(StatusCode::NO_CONTENT)
        }
        DeleteOutcome::HasBookings => Err(ApiError::conflict("Property has bookings and cannot be deleted")),
        DeleteOutcome::NotFound => Err(ApiError::not_found("Property")),
    }
}

pub(crate) async fn load(state: &AppState, property_id: Uuid) -> Result<Property, ApiError> {
    let id = property_id.to_string();
    let row = blocking(state, move |db| db.get_property(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("Property"))?;
    Ok(Property::try_from(row)?)
}

fn ensure_manager(claims: &Claims, property: &Property) -> Result<(), ApiError> {
    require_host(claims)?;
    if can_manage(claims, &property.host_id.to_string(), &property.organization_id.to_string()) {
        Ok(())
    } else {
        Err(ApiError::forbidden("You do not manage this property"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_clamped() {
        let filter = listing_filter(ListingQuery { limit: Some(1_000), ..Default::default() }).unwrap();
        assert_eq!(filter.limit, i64::from(MAX_PAGE));

        let filter = listing_filter(ListingQuery::default()).unwrap();
        assert_eq!(filter.limit, i64::from(DEFAULT_PAGE));
        assert_eq!(filter.offset, 0);
    }

    #[test]
    fn inverted_price_range_is_rejected() {
        let query = ListingQuery { min_price: Some(500), max_price: Some(100), ..Default::default() };
        assert!(listing_filter(query).is_err());
    }

    #[test]
    fn blank_filters_are_dropped() {
        let query = ListingQuery {
            org: Some(String::new()),
            location: Some("   ".into()),
            ..Default::default()
        };
        let filter = listing_filter(query).unwrap();
        assert!(filter.org_slug.is_none());
        assert!(filter.location.is_none());
    }
}
