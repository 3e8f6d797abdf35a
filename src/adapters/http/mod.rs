//! HTTP inbound adapter.
//!
//! Two routes: `GET /stream` opens (or attaches to) a session and answers with its
//! master manifest, `GET /:session/:file` serves manifests and segments through the
//! dispatcher. CORS is wide open, as players load manifests cross-origin.

mod error;
mod handlers;

use crate::application::{Dispatcher, StreamOpener};
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub opener: Arc<StreamOpener>,
    pub dispatcher: Arc<Dispatcher>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/stream", get(handlers::open_stream))
        .route("/:session/:file", get(handlers::serve_file))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
