use axum::{
    routing::{get, post, put},
    Router,
};

use crate::server::AppState;

use super::auth::{check_session, login, logout, signup, update_profile};
use super::health::{health, stats};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        // Auth & profile endpoints
        .nest(
            "/api/auth",
            Router::new()
                .route("/signup", post(signup))
                .route("/login", post(login))
                .route("/logout", post(logout))
                .route("/check", get(check_session))
                .route("/profile", put(update_profile)),
        )
}
