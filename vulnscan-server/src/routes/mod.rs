use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;
use vulnscan_config::CorsConfig;

use crate::{
    handlers::{
        get_scan_handler, health_handler, list_findings_handler,
        list_scans_handler, submit_scan_handler,
    },
    infra::app_state::AppState,
};

/// Scan API routes, without middleware.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_handler))
        .route("/scan", post(submit_scan_handler))
        .route("/scans", get(list_scans_handler))
        .route("/scans/{id}", get(get_scan_handler))
        .route("/scans/{id}/vulnerabilities", get(list_findings_handler))
}

pub fn create_app(state: AppState) -> Router {
    let cors_layer = cors_layer(&state.config().cors, state.config().dev_mode);

    create_api_router()
        .layer(TraceLayer::new_for_http())
        // CORS (outermost)
        .layer(cors_layer)
        .with_state(state)
}

/// Permissive in dev mode or when `*` is listed, allow-list otherwise.
fn cors_layer(cors: &CorsConfig, dev_mode: bool) -> CorsLayer {
    if dev_mode || cors.is_wildcard_included() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
