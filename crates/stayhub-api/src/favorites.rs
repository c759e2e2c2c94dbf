use axum::{
    Extension, Json,
    extract::State,
    response::IntoResponse,
};
use uuid::Uuid;

use stayhub_db::models::ListingRef;
use stayhub_types::api::{Claims, ToggleFavoriteRequest, ToggleFavoriteResponse};
use stayhub_types::models::Favorite;

use crate::error::ApiError;
use crate::state::{AppState, blocking};

pub async fn toggle(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ToggleFavoriteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = ListingRef::from_ids(req.property_id, req.experience_id)
        .ok_or_else(|| ApiError::bad_request("Provide exactly one of property_id or experience_id"))?;

    let favorite_id = Uuid::new_v4().to_string();
    let user_id = claims.sub.to_string();
    let added = blocking(&state, move |db| {
        if !db.listing_exists(&listing)? {
            return Ok(None);
        }
        db.toggle_favorite(&favorite_id, &user_id, &listing).map(Some)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Listing"))?;

    Ok(Json(ToggleFavoriteResponse { added }))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let rows = blocking(&state, move |db| db.list_favorites(&user_id)).await?;
    let favorites = rows
        .into_iter()
        .map(Favorite::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(favorites))
}
