//! Signup/login/logout/session-check/profile route handlers.
//!
//! Boundary plumbing around the presence core: each handler is a plain
//! request/response call whose only signal the session layer cares about is
//! success-with-identity vs. failure-with-message.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    Json,
};

use crate::auth::Claims;
use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::users::Profile;

use super::types::{AuthResponse, LoginRequest, SignupRequest, UpdateProfileRequest};

/// POST /api/auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let (identity, profile) =
        state
            .users
            .create(&body.username, &body.password, &body.display_name)?;
    let token = state.jwt_keys.issue(&identity)?;

    tracing::info!(identity = %identity, username = %body.username, "Signup completed");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            identity,
            token: Some(token),
            profile,
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let (identity, profile) = state.users.authenticate(&body.username, &body.password)?;
    let token = state.jwt_keys.issue(&identity)?;

    tracing::info!(identity = %identity, username = %body.username, "Login completed");

    Ok(Json(AuthResponse {
        identity,
        token: Some(token),
        profile,
    }))
}

/// POST /api/auth/logout
///
/// Tokens are stateless, so invalidation happens client-side (the persisted
/// token is discarded) and the live connection teardown removes the presence
/// record. This endpoint acknowledges so clients have a single logout call.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode> {
    let claims = bearer_claims(&state, &headers)?;

    tracing::info!(identity = %claims.sub, "Logout requested");

    Ok(StatusCode::OK)
}

/// GET /api/auth/check
pub async fn check_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AuthResponse>> {
    let claims = bearer_claims(&state, &headers)?;
    let profile = state.users.profile(&claims.sub)?;

    Ok(Json(AuthResponse {
        identity: claims.sub,
        token: None,
        profile,
    }))
}

/// PUT /api/auth/profile
pub async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>> {
    let claims = bearer_claims(&state, &headers)?;
    let profile = state
        .users
        .update_profile(&claims.sub, body.display_name, body.avatar_url)?;

    tracing::info!(identity = %claims.sub, "Profile updated");

    Ok(Json(profile))
}

/// Validate the Authorization bearer token and return its claims.
fn bearer_claims(state: &AppState, headers: &HeaderMap) -> Result<Claims> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Auth("Missing authentication token".to_string()))?;

    state.jwt_keys.validate(token)
}
