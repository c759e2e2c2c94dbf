use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use stayhub_db::models::ListingRef;
use stayhub_db::reviews::{NewReview, ReviewInsert};
use stayhub_types::api::{Claims, CreateReviewRequest};
use stayhub_types::models::{BookingStatus, Review, UserRole};

use crate::bookings::{current_status, load_row};
use crate::error::ApiError;
use crate::middleware::is_self;
use crate::state::{AppState, blocking};

const MAX_COMMENT_CHARS: usize = 2_000;

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !(1..=5).contains(&req.rating) {
        return Err(ApiError::bad_request("Rating must be between 1 and 5"));
    }
    let comment = req.comment.trim().to_string();
    if comment.chars().count() > MAX_COMMENT_CHARS {
        return Err(ApiError::bad_request(format!(
            "Comment must be at most {} characters",
            MAX_COMMENT_CHARS
        )));
    }

    // Someone else's booking looks the same as a missing one.
    let booking = load_row(&state, req.booking_id).await?;
    if !is_self(&claims, &booking.guest_id) {
        return Err(ApiError::not_found("Booking"));
    }
    let status = current_status(&booking)?;
    if status != BookingStatus::Completed {
        return Err(ApiError::conflict(format!(
            "Only completed bookings can be reviewed (booking is {})",
            status
        )));
    }

    let listing = match (booking.property_id, booking.experience_id) {
        (Some(id), _) => ListingRef::Property(id),
        (None, Some(id)) => ListingRef::Experience(id),
        (None, None) => return Err(ApiError::Internal(anyhow::anyhow!("booking {} has no listing", booking.id))),
    };

    let review_id = Uuid::new_v4();
    let new = NewReview {
        id: review_id.to_string(),
        booking_id: booking.id,
        author_id: claims.sub.to_string(),
        listing,
        rating: i64::from(req.rating),
        comment,
    };

    match blocking(&state, move |db| db.insert_review(&new)).await? {
        ReviewInsert::Created => {}
        ReviewInsert::AlreadyReviewed => return Err(ApiError::conflict("This booking has already been reviewed")),
    }
    info!("Review {} posted by {}", review_id, claims.sub);

    let id = review_id.to_string();
    let row = blocking(&state, move |db| db.get_review(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("Review"))?;

    Ok((StatusCode::CREATED, Json(Review::try_from(row)?)))
}

pub async fn mine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let author_id = claims.sub.to_string();
    let rows = blocking(&state, move |db| db.list_reviews_by_author(&author_id)).await?;
    let reviews = rows
        .into_iter()
        .map(Review::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(reviews))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(review_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let id = review_id.to_string();
    let review = blocking(&state, move |db| db.get_review(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("Review"))?;

    let org_admin = claims.role == UserRole::Admin && claims.org.to_string() == review.listing_organization_id;
    if !is_self(&claims, &review.author_id) && !org_admin {
        return Err(ApiError::forbidden("You can only delete your own reviews"));
    }

    let id = review_id.to_string();
    if !blocking(&state, move |db| db.delete_review(&id)).await? {
        return Err(ApiError::not_found("Review"));
    }
    info!("Review {} deleted by {}", review_id, claims.sub);

    Ok(StatusCode::NO_CONTENT)
}
