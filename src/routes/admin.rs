use axum::{extract::State, Json};

use crate::error::AppResult;
use crate::middleware::AdminUser;
use crate::state::AppState;
use crate::types::SyncResponse;

/// Runs the directory sync and waits for its report.
pub async fn trigger_sync(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> AppResult<Json<SyncResponse>> {
    state.metrics.inc_sync_triggered();
    let result = state.sync.trigger(&admin.login).await?;
    Ok(Json(SyncResponse { requested_by: admin.login, result }))
}
