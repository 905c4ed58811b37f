use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
};
use tracing::{info, warn};
use vulnscan_model::{
    FindingView, ScanDetailView, ScanId, ScanSummaryView, SubmitScanRequest,
    SubmitScanResponse,
};

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

/// `POST /scan`
pub async fn submit_scan_handler(
    State(state): State<AppState>,
    body: Result<Json<SubmitScanRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<SubmitScanResponse>)> {
    let Json(request) = body?;

    let submitted = state.dispatcher.submit_scan(&request.image_name).await?;
    info!(
        scan_id = %submitted.scan_id,
        image = %request.image_name,
        "scan submitted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitScanResponse::queued(submitted.scan_id)),
    ))
}

/// `GET /scans`: newest first; an empty list when the store is unavailable.
pub async fn list_scans_handler(
    State(state): State<AppState>,
) -> Json<Vec<ScanSummaryView>> {
    match state.store().list_scans().await {
        Ok(scans) => Json(scans.into_iter().map(ScanSummaryView::from).collect()),
        Err(err) => {
            warn!(error = %err, "listing scans failed; returning empty list");
            Json(Vec::new())
        }
    }
}

/// `GET /scans/{id}`
pub async fn get_scan_handler(
    State(state): State<AppState>,
    scan_id: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<ScanDetailView>> {
    let Path(scan_id) = scan_id
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let scan_id = ScanId(scan_id);

    let record = state
        .store()
        .get_scan(scan_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("scan {scan_id} not found")))?;

    Ok(Json(ScanDetailView::from(record)))
}

/// `GET /scans/{id}/vulnerabilities`: empty for unknown scans, malformed ids
/// and store failures alike.
pub async fn list_findings_handler(
    State(state): State<AppState>,
    scan_id: Result<Path<i64>, PathRejection>,
) -> Json<Vec<FindingView>> {
    let Ok(Path(scan_id)) = scan_id else {
        return Json(Vec::new());
    };
    let scan_id = ScanId(scan_id);

    match state.store().list_findings(scan_id).await {
        Ok(findings) => {
            Json(findings.into_iter().map(FindingView::from).collect())
        }
        Err(err) => {
            warn!(
                scan_id = %scan_id,
                error = %err,
                "listing findings failed; returning empty list"
            );
            Json(Vec::new())
        }
    }
}
