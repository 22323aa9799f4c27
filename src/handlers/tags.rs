// src/handlers/tags.rs

use axum::{Json, extract::State, response::IntoResponse};

use crate::{error::AppError, state::AppState};

/// All tags, ordered by name.
pub async fn list_tags(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let store = state.store.as_ref();
    let tags = state
        .calls()
        .run("list_tags", move || store.list_tags())
        .await?;
    Ok(Json(tags))
}
