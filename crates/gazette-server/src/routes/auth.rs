//! Login endpoint.

use axum::{
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::session_cookie;
use crate::error::AppError;
use crate::AppState;

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    /// Accepted but not verified.
    pub password: String,
}

/// Auth routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/auth", post(login))
}

async fn login(Json(request): Json<LoginRequest>) -> Result<Response, AppError> {
    let cookie = session_cookie(&request.username)?;
    info!(user = %request.username, "logged in");

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "message": "Logged in successfully" })),
    )
        .into_response())
}
