use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use blood_store::{BloodBankStore, StoreStats};

use super::AppState;
use crate::error::ApiError;

/// GET /admin/stats counts requests and low-stock blood types.
#[tracing::instrument(skip(state))]
pub async fn get<S: BloodBankStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<StoreStats>, ApiError> {
    let stats = state.store().stats(state.low_stock_threshold).await?;
    Ok(Json(stats))
}
