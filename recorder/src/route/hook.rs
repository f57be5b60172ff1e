use std::collections::HashMap;

use axum::extract::State;
use axum::routing::post;
use axum::{Form, Router};
use http::StatusCode;

use api::request::PublishHook;

use crate::route::AppState;

pub fn route() -> Router<AppState> {
    Router::new()
        .route(api::path::HOOK_PUBLISH, post(publish))
        .route(api::path::HOOK_PUBLISH_DONE, post(publish_done))
}

/// Any non-2xx reply makes the ingest server drop the publisher.
async fn publish(
    State(state): State<AppState>,
    Form(req): Form<PublishHook>,
) -> crate::result::Result<StatusCode> {
    state
        .orchestrator
        .on_publish(&req.path(), &params(&req))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn publish_done(
    State(state): State<AppState>,
    Form(req): Form<PublishHook>,
) -> crate::result::Result<StatusCode> {
    state
        .orchestrator
        .on_unpublish(&req.path(), &params(&req))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

fn params(req: &PublishHook) -> HashMap<String, String> {
    [
        ("addr", &req.addr),
        ("call", &req.call),
        ("clientid", &req.clientid),
        ("tcurl", &req.tc_url),
    ]
    .into_iter()
    .filter_map(|(k, v)| v.clone().map(|v| (k.to_string(), v)))
    .collect()
}
