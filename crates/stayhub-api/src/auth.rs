use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use stayhub_db::DEFAULT_ORGANIZATION_ID;
use stayhub_db::queries::UserInsert;
use stayhub_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};
use stayhub_types::models::{User, UserRole};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    let name = req.name.trim().to_string();

    // Validate input
    if email.len() > 254 || !email.contains('@') {
        return Err(ApiError::bad_request("A valid email is required"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::bad_request("Password must be at least 8 characters"));
    }
    if name.is_empty() || name.chars().count() > 80 {
        return Err(ApiError::bad_request("Name must be 1 to 80 characters"));
    }
    let role = req.role.unwrap_or(UserRole::Guest);
    if role == UserRole::Admin {
        return Err(ApiError::bad_request("Admin accounts cannot be self-registered"));
    }

    let organization_id = match req.organization {
        Some(slug) => {
            blocking(&state, move |db| db.get_organization_by_slug(&slug))
                .await?
                .ok_or_else(|| ApiError::not_found("Organization"))?
                .id
        }
        None => DEFAULT_ORGANIZATION_ID.to_string(),
    };

    let password_hash = hash_password(&req.password)?;
    let user_id = Uuid::new_v4().to_string();

    // The UNIQUE email index decides; a racing duplicate still gets a 409.
    let user = blocking(&state, move |db| {
        match db.create_user(&user_id, &organization_id, &email, &name, &password_hash, role)? {
            UserInsert::Created => db
                .get_user_by_id(&user_id)?
                .map(Some)
                .ok_or_else(|| anyhow::anyhow!("user vanished after insert")),
            UserInsert::EmailTaken => Ok(None),
        }
    })
    .await?
    .ok_or_else(|| ApiError::conflict("An account with this email already exists"))?;
    let user = User::try_from(user)?;

    let token = create_token(&state.jwt_secret, &user)?;
    info!("Registered {} user {}", user.role.as_str(), user.id);

    Ok((StatusCode::CREATED, Json(AuthResponse { user, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    let row = blocking(&state, move |db| db.get_user_by_email(&email))
        .await?
        .ok_or_else(|| ApiError::Unauthorized(INVALID_CREDENTIALS.into()))?;

    // Verify password
    let parsed_hash = PasswordHash::new(&row.password)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored hash unreadable: {}", e)))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized(INVALID_CREDENTIALS.into()))?;

    let user = User::try_from(row)?;
    let token = create_token(&state.jwt_secret, &user)?;

    Ok(Json(AuthResponse { user, token }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let id = claims.sub.to_string();
    let row = blocking(&state, move |db| db.get_user_by_id(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    Ok(Json(User::try_from(row)?))
}

/// Hash a password with Argon2id.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

pub fn create_token(secret: &str, user: &User) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        org: user.organization_id,
        role: user.role,
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
