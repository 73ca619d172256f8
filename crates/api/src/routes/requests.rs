//! Blood request creation, listing and admin deletion.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use blood_store::{BloodBankStore, BloodRequest, NewBloodRequest, RequestQuery, RequestStatus};
use chrono::NaiveDate;
use common::{BloodType, RequestId, Role, UserId};
use serde::{Deserialize, Serialize};

use super::inventory::MessageResponse;
use super::{AppState, parse_json, parse_request_id, parse_units};
use crate::auth::{Session, require_role};
use crate::error::ApiError;

const MISSING_FIELDS: &str =
    "Missing required fields: date, required_units, request_type, blood_group";

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub date: Option<String>,
    pub required_units: Option<i64>,
    pub request_type: Option<String>,
    pub blood_group: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub recipient_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RequestResponse {
    pub request_id: RequestId,
    pub date: NaiveDate,
    pub required_units: u32,
    pub status: RequestStatus,
    pub recipient_id: UserId,
    pub recipient_region: Option<String>,
    pub request_type: String,
    pub blood_group: BloodType,
}

impl From<BloodRequest> for RequestResponse {
    fn from(request: BloodRequest) -> Self {
        Self {
            request_id: request.request_id,
            date: request.requested_on,
            required_units: request.required_units,
            status: request.status,
            recipient_id: request.recipient_id,
            recipient_region: request.recipient_region,
            request_type: request.request_type,
            blood_group: request.blood_type,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RequestCreatedResponse {
    pub message: &'static str,
    pub request_id: RequestId,
}

impl CreateRequestBody {
    fn into_new_request(self, session: &Session) -> Result<NewBloodRequest, ApiError> {
        let (Some(date), Some(required_units), Some(request_type), Some(blood_group)) = (
            self.date,
            self.required_units,
            self.request_type,
            self.blood_group,
        ) else {
            return Err(ApiError::BadRequest(MISSING_FIELDS.to_string()));
        };

        let requested_on = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|_| ApiError::BadRequest(format!("Invalid date: {date}")))?;
        let required_units = parse_units("required_units", required_units, true)?;
        let blood_type: BloodType = blood_group
            .parse()
            .map_err(|e: common::ParseBloodTypeError| ApiError::BadRequest(e.to_string()))?;
        let request_type = request_type.trim().to_string();
        if request_type.is_empty() {
            return Err(ApiError::BadRequest(MISSING_FIELDS.to_string()));
        }

        Ok(NewBloodRequest {
            blood_type,
            required_units,
            recipient_id: session.caller.user_id,
            recipient_region: session.region.clone(),
            request_type,
            requested_on,
        })
    }
}

/// POST /requests files a new `Pending` request for the calling recipient.
#[tracing::instrument(skip(state, session, body))]
pub async fn create<S: BloodBankStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Extension(session): Extension<Session>,
    body: Bytes,
) -> Result<(StatusCode, Json<RequestCreatedResponse>), ApiError> {
    require_role(&session.caller, Role::Recipient)?;
    let body: CreateRequestBody = parse_json(&body)?;
    let new_request = body.into_new_request(&session)?;

    let request = state.store().create_request(new_request).await?;
    tracing::info!(
        request_id = %request.request_id,
        recipient_id = %session.caller.user_id,
        "request added"
    );

    Ok((
        StatusCode::CREATED,
        Json(RequestCreatedResponse {
            message: "Request added successfully",
            request_id: request.request_id,
        }),
    ))
}

/// GET /requests lists requests, optionally for one recipient.
#[tracing::instrument(skip(state))]
pub async fn list<S: BloodBankStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<RequestResponse>>, ApiError> {
    let query = match params.recipient_id {
        Some(id) => RequestQuery::for_recipient(UserId::new(id)),
        None => RequestQuery::new(),
    };
    let requests = state.store().list_requests(query).await?;
    Ok(Json(requests.into_iter().map(Into::into).collect()))
}

/// GET /admin/requests lists every request, newest first.
#[tracing::instrument(skip(state))]
pub async fn list_all<S: BloodBankStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<RequestResponse>>, ApiError> {
    let requests = state.store().list_requests(RequestQuery::new()).await?;
    Ok(Json(requests.into_iter().map(Into::into).collect()))
}

/// DELETE /admin/requests/{id}
#[tracing::instrument(skip(state))]
pub async fn delete<S: BloodBankStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let request_id = parse_request_id(&id)?;
    if !state.store().delete_request(request_id).await? {
        return Err(ApiError::NotFound("Request not found".to_string()));
    }
    tracing::info!(%request_id, "request deleted");

    Ok(Json(MessageResponse {
        message: format!("Request {request_id} deleted."),
    }))
}
