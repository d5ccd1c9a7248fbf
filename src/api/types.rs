//! Request/response bodies for the auth/profile API.
//!
//! Shared by the server handlers and the client session controller so both
//! sides agree on the wire shapes.

use serde::{Deserialize, Serialize};

use crate::users::Profile;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Returned by signup, login and session check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub identity: String,
    /// Present on signup/login; absent on session check (the caller already
    /// holds the token it authenticated with).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub profile: Profile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Error envelope, mirrored from the server's `AppError` responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
