use axum::Json;
use vulnscan_model::HealthResponse;

/// `GET /`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}
