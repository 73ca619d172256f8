//! Admin endpoint that fulfills a pending request.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use blood_store::BloodBankStore;
use common::{BloodType, Caller, RequestId};
use fulfillment::parse_allocated_units;
use serde::{Deserialize, Serialize};

use super::{AppState, parse_json, parse_request_id};
use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct FulfillRequest {
    pub allocated_units: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct FulfillResponse {
    pub message: String,
    pub units_deducted: u32,
    pub blood_group: BloodType,
    pub request_id: RequestId,
}

/// POST /admin/fulfill/{id} deducts stock and marks the request fulfilled.
///
/// The body is optional; an empty body deducts the request's required units.
#[tracing::instrument(skip(state, caller, body))]
pub async fn fulfill<S: BloodBankStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<FulfillResponse>, ApiError> {
    let request_id = parse_request_id(&id)?;
    let req: FulfillRequest = if body.iter().all(u8::is_ascii_whitespace) {
        FulfillRequest::default()
    } else {
        parse_json(&body)?
    };
    let allocated_units = parse_allocated_units(req.allocated_units)?;

    let outcome = state
        .coordinator
        .fulfill(&caller, request_id, allocated_units)
        .await?;

    Ok(Json(FulfillResponse {
        message: format!(
            "Request {} fulfilled. Deducted {} units from {} stock.",
            outcome.request_id, outcome.units_deducted, outcome.blood_type
        ),
        units_deducted: outcome.units_deducted,
        blood_group: outcome.blood_type,
        request_id: outcome.request_id,
    }))
}
