pub mod install;

use axum::{
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};

use crate::state::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .with_state(state.clone())
        .nest("/api", api_routes(state.clone()))
        .nest("/install", install::install_routes(state))
}

/// API routes under /api/*
fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/system/version", get(get_version))
        .with_state(state)
}

/// Until the installed marker exists, the site root hands visitors to the
/// wizard. Afterwards the installed platform takes over this route.
async fn index(State(state): State<AppState>) -> Response {
    if state.config.installed_marker_path().exists() {
        Html(
            "<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">\
             <title>GameDev Academy</title></head>\
             <body><h1>GameDev Academy</h1>\
             <p>Installation is complete.</p></body></html>\n",
        )
        .into_response()
    } else {
        Redirect::to("/install").into_response()
    }
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Version info endpoint
async fn get_version(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "version": state.config.version,
        "backend": "rust",
    }))
}
