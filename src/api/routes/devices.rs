//! Device registry endpoints

use axum::{
    Json,
    extract::{Path, State},
};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::DevicesResponse,
};
use crate::registry::DeviceRecord;

/// GET /api/v1/devices
///
/// Snapshot of every known device, ordered by id
pub async fn list_devices(State(state): State<ApiState>) -> Json<DevicesResponse> {
    Json(DevicesResponse::from(state.registry.snapshot()))
}

/// GET /api/v1/devices/:id
pub async fn get_device(
    State(state): State<ApiState>,
    Path(device_id): Path<String>,
) -> ApiResult<Json<DeviceRecord>> {
    state
        .registry
        .get(&device_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("device '{}' not found", device_id)))
}
