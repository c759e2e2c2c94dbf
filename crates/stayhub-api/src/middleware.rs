use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use stayhub_types::api::Claims;
use stayhub_types::models::UserRole;

use crate::error::ApiError;
use crate::state::AppState;

/// Extract and validate the JWT from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".into()))?;

    let token_data = decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized("Invalid or expired token".into()))?;

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}

/// Only hosts and admins publish listings.
pub fn require_host(claims: &Claims) -> Result<(), ApiError> {
    if claims.role.can_host() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only hosts can manage listings"))
    }
}

/// The listing's host, or an admin of the listing's organization.
pub fn can_manage(claims: &Claims, host_id: &str, organization_id: &str) -> bool {
    claims.sub.to_string() == host_id
        || (claims.role == UserRole::Admin && claims.org.to_string() == organization_id)
}

pub fn is_self(claims: &Claims, user_id: &str) -> bool {
    user_id.parse::<Uuid>().is_ok_and(|id| id == claims.sub)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: UserRole, org: Uuid) -> Claims {
        Claims { sub: Uuid::new_v4(), org, role, exp: 0 }
    }

    #[test]
    fn admins_manage_only_their_organization() {
        let org = Uuid::new_v4();
        let admin = claims(UserRole::Admin, org);
        let host = Uuid::new_v4().to_string();

        assert!(can_manage(&admin, &host, &org.to_string()));
        assert!(!can_manage(&admin, &host, &Uuid::new_v4().to_string()));
    }

    #[test]
    fn hosts_manage_their_own_listings() {
        let org = Uuid::new_v4();
        let host = claims(UserRole::Host, org);

        assert!(can_manage(&host, &host.sub.to_string(), &org.to_string()));
        assert!(!can_manage(&host, &Uuid::new_v4().to_string(), &org.to_string()));
        assert!(require_host(&host).is_ok());
        assert!(require_host(&claims(UserRole::Guest, org)).is_err());
    }
}
