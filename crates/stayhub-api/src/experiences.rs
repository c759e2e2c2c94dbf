use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use stayhub_db::listings::{DeleteOutcome, ExperienceChanges, NewExperience};
use stayhub_db::models::ListingRef;
use stayhub_types::api::{Claims, CreateExperienceRequest, ListingQuery, UpdateExperienceRequest};
use stayhub_types::models::{Experience, Review};

use crate::error::ApiError;
use crate::middleware::{can_manage, require_host};
use crate::properties::listing_filter;
use crate::state::{AppState, blocking};
use crate::validation;

pub async fn list_public(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = listing_filter(query)?;
    let rows = blocking(&state, move |db| db.list_experiences(&filter)).await?;
    let experiences = rows
        .into_iter()
        .map(Experience::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(experiences))
}

pub async fn get_public(
    State(state): State<AppState>,
    Path(experience_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(load(&state, experience_id).await?))
}

pub async fn reviews(
    State(state): State<AppState>,
    Path(experience_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    load(&state, experience_id).await?;
    let listing = ListingRef::Experience(experience_id.to_string());
    let rows = blocking(&state, move |db| db.list_reviews_for_listing(&listing)).await?;
    let reviews = rows
        .into_iter()
        .map(Review::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(reviews))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateExperienceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_host(&claims)?;

    if req.duration_minutes == 0 {
        return Err(ApiError::bad_request("duration_minutes must be at least 1"));
    }

    let experience_id = Uuid::new_v4();
    let new = NewExperience {
        id: experience_id.to_string(),
        organization_id: claims.org.to_string(),
        host_id: claims.sub.to_string(),
        title: validation::title(&req.title)?,
        description: validation::description(&req.description)?,
        location: validation::location(&req.location)?,
        price_per_person: validation::amount("price_per_person", req.price_per_person)?,
        currency: validation::currency(req.currency.as_deref())?,
        duration_minutes: i64::from(req.duration_minutes),
        max_participants: validation::capacity("max_participants", req.max_participants)?,
    };

    blocking(&state, move |db| db.insert_experience(&new)).await?;
    info!("Host {} listed experience {}", claims.sub, experience_id);

    Ok((StatusCode::CREATED, Json(load(&state, experience_id).await?)))
}

pub async fn mine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_host(&claims)?;
    let host_id = claims.sub.to_string();
    let rows = blocking(&state, move |db| db.list_experiences_by_host(&host_id)).await?;
    let experiences = rows
        .into_iter()
        .map(Experience::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(experiences))
}

pub async fn update(
    State(state): State<AppState>,
    Path(experience_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateExperienceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = load(&state, experience_id).await?;
    ensure_manager(&claims, &existing)?;

    if req.duration_minutes == Some(0) {
        return Err(ApiError::bad_request("duration_minutes must be at least 1"));
    }

    let changes = ExperienceChanges {
        title: validation::optional(req.title.as_deref(), validation::title)?,
        description: validation::optional(req.description.as_deref(), validation::description)?,
        location: validation::optional(req.location.as_deref(), validation::location)?,
        price_per_person: validation::optional(req.price_per_person, |v| validation::amount("price_per_person", v))?,
        currency: validation::optional(req.currency.as_deref(), |v| validation::currency(Some(v)))?,
        duration_minutes: req.duration_minutes.map(i64::from),
        max_participants: validation::optional(req.max_participants, |v| {
            validation::capacity("max_participants", v)
        })?,
    };

    let id = experience_id.to_string();
    if !blocking(&state, move |db| db.update_experience(&id, &changes)).await? {
        return Err(ApiError::not_found("Experience"));
    }

    Ok(Json(load(&state, experience_id).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(experience_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = load(&state, experience_id).await?;
    ensure_manager(&claims, &existing)?;

    let id = experience_id.to_string();
    match blocking(&state, move |db| db.delete_experience(&id)).await? {
        DeleteOutcome::Deleted => {
            info!("Experience {} deleted by {}", experience_id, claims.sub);
            Ok(StatusCode::NO_CONTENT)
        }
        DeleteOutcome::HasBookings => Err(ApiError::conflict("Experience has bookings and cannot be deleted")),
        DeleteOutcome::NotFound => Err(ApiError::not_found("Experience")),
    }
}

pub(crate) async fn load(state: &AppState, experience_id: Uuid) -> Result<Experience, ApiError> {
    let id = experience_id.to_string();
    let row = blocking(state, move |db| db.get_experience(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("Experience"))?;
    Ok(Experience::try_from(row)?)
}

fn ensure_manager(claims: &Claims, experience: &Experience) -> Result<(), ApiError> {
    require_host(claims)?;
    if can_manage(claims, &experience.host_id.to_string(), &experience.organization_id.to_string()) {
        Ok(())
    } else {
        Err(ApiError::forbidden("You do not manage this experience"))
    }
}
