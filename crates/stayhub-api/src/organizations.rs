use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use stayhub_types::models::Organization;

use crate::error::ApiError;
use crate::state::{AppState, blocking};

/// Resolve a tenant slug for storefronts scoped to one organization.
pub async fn get_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let row = blocking(&state, move |db| db.get_organization_by_slug(&slug))
        .await?
        .ok_or_else(|| ApiError::not_found("Organization"))?;

    Ok(Json(Organization::try_from(row)?))
}
