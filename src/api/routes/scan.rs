//! On-demand sweep

use axum::{Json, extract::State};
use tracing::info;

use crate::actors::messages::ScanReport;
use crate::api::{error::ApiResult, state::ApiState};

/// POST /api/v1/scan
///
/// Runs a sweep and returns its report once finished
pub async fn trigger_scan(State(state): State<ApiState>) -> ApiResult<Json<ScanReport>> {
    info!("on-demand scan requested");
    let report = state.scanner.scan_now().await?;

    Ok(Json(report))
}
