use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;

use crate::error::AppError;
use crate::route::AppState;

pub fn route() -> Router<AppState> {
    Router::new()
        .route(api::path::STREAMS, get(index))
        .route("/api/streams", get(index))
        .route("/api/streams/:stream", get(show).delete(destroy))
}

async fn index(State(state): State<AppState>) -> Json<Vec<api::response::Session>> {
    Json(state.orchestrator.registry().infos().await)
}

async fn show(
    State(state): State<AppState>,
    Path(stream): Path<String>,
) -> crate::result::Result<Json<api::response::Session>> {
    match state.orchestrator.registry().get(&stream).await {
        Some(session) => Ok(Json(session.info())),
        None => Err(AppError::stream_not_found(stream)),
    }
}

async fn destroy(
    State(state): State<AppState>,
    Path(stream): Path<String>,
) -> crate::result::Result<StatusCode> {
    state.orchestrator.stop_stream(&stream).await?;
    Ok(StatusCode::NO_CONTENT)
}
