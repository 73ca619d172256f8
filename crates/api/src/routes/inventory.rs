//! Stock listing and admin stock updates.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use blood_store::{BloodBankStore, BloodType, InventoryRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AppState, parse_json, parse_units};
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct InventoryResponse {
    pub blood_type: BloodType,
    pub units: u32,
    pub last_updated: DateTime<Utc>,
}

impl From<InventoryRecord> for InventoryResponse {
    fn from(record: InventoryRecord) -> Self {
        Self {
            blood_type: record.blood_type,
            units: record.units,
            last_updated: record.last_updated,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateInventoryRequest {
    pub blood_type: Option<String>,
    pub new_units: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// GET /inventory lists all stock ordered by blood type.
#[tracing::instrument(skip(state))]
pub async fn list<S: BloodBankStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<InventoryResponse>>, ApiError> {
    let records = state.store().list_inventory().await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

/// POST /admin/inventory sets the stock for one blood type.
#[tracing::instrument(skip(state, body))]
pub async fn update<S: BloodBankStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    let req: UpdateInventoryRequest = parse_json(&body)?;
    let (Some(blood_type), Some(new_units)) = (req.blood_type, req.new_units) else {
        return Err(ApiError::BadRequest(
            "Missing blood_type or new_units".to_string(),
        ));
    };

    let blood_type: BloodType = blood_type
        .parse()
        .map_err(|e: common::ParseBloodTypeError| ApiError::BadRequest(e.to_string()))?;
    let units = parse_units("new_units", new_units, false)?;

    let record = state.store().set_inventory(blood_type, units).await?;
    tracing::info!(%blood_type, units = record.units, "inventory updated");

    Ok(Json(MessageResponse {
        message: format!("Updated {} to {} units.", record.blood_type, record.units),
    }))
}
