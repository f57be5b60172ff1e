use std::future::Future;
use std::sync::Arc;

use axum::extract::Request;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, Level};

use crate::config::Config;
use crate::hook::{log::LogHook, EventHook};
use crate::orchestrator::Orchestrator;
use crate::route::AppState;
use crate::segment::{FfmpegSegmenter, Segmenter};

pub mod config;
pub mod error;
pub mod hook;
pub mod orchestrator;
pub mod result;
pub mod route;
pub mod segment;
pub mod stream;

mod r#macro;

/// Serve the ingest hooks until `signal` resolves, recording with ffmpeg.
pub async fn serve<F>(cfg: Config, listener: TcpListener, signal: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let segmenter = Arc::new(FfmpegSegmenter::new(&cfg.recorder));
    serve_with_segmenter(cfg, listener, signal, segmenter).await
}

pub async fn serve_with_segmenter<F>(
    cfg: Config,
    listener: TcpListener,
    signal: F,
    segmenter: Arc<dyn Segmenter>,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let orchestrator = Arc::new(Orchestrator::new(&cfg, segmenter));
    orchestrator.prepare().await?;

    let event_receiver = orchestrator.registry().subscribe_event();
    tokio::spawn(async move { LogHook.hook(event_receiver).await });

    let app_state = AppState {
        orchestrator: orchestrator.clone(),
    };
    let app = Router::new()
        .merge(route::hook::route())
        .merge(route::stream::route())
        .with_state(app_state)
        .layer(if cfg.http.cors {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
        })
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    info_span!(
                        "http_request",
                        uri = ?request.uri(),
                        method = ?request.method(),
                    )
                })
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO))
                .on_failure(tower_http::trace::DefaultOnFailure::new().level(Level::INFO)),
        );

    orchestrator.start();
    info!("[recorder] hook server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await
        .unwrap_or_else(|e| error!("Application error: {e}"));

    orchestrator.shutdown().await;
    Ok(())
}
