//! Newsletter CRUD endpoints.

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::info;

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::store::{self, NewNewsletter, Newsletter};
use crate::AppState;

/// Newsletter routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/newsletters", get(list_newsletters).post(create_newsletter))
        .route("/newsletters/:id", put(update_newsletter))
}

async fn create_newsletter(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<NewNewsletter>,
) -> Result<Json<Newsletter>, AppError> {
    store::validate(&body).map_err(AppError::BadRequest)?;
    let row = state.store.create(&body).await?;
    info!(user = %user.username, id = row.id, "newsletter created");
    Ok(Json(row))
}

async fn list_newsletters(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<Vec<Newsletter>>, AppError> {
    Ok(Json(state.store.list().await?))
}

async fn update_newsletter(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i32>,
    Json(body): Json<NewNewsletter>,
) -> Result<Json<Value>, AppError> {
    store::validate(&body).map_err(AppError::BadRequest)?;
    match state.store.update(id, &body).await? {
        Some(_) => {
            info!(user = %user.username, id, "newsletter updated");
            Ok(Json(json!({ "message": "Newsletter updated successfully" })))
        }
        None => Err(AppError::NotFound("Newsletter not found".to_string())),
    }
}
