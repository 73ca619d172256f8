//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use blood_store::StoreError;
use fulfillment::FulfillmentError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or unknown session token.
    Unauthorized,
    /// Authenticated caller lacks the required role.
    Forbidden,
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Fulfillment rejected or failed.
    Fulfillment(FulfillmentError),
    /// Storage error outside a fulfillment.
    Store(StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Login required".to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Role not authorized".to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Fulfillment(err) => fulfillment_error_to_response(err),
            ApiError::Store(err) => {
                tracing::error!(error = %err, "storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {err}"))
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn fulfillment_error_to_response(err: FulfillmentError) -> (StatusCode, String) {
    let status = match &err {
        FulfillmentError::NotFound(_) => StatusCode::NOT_FOUND,
        FulfillmentError::InsufficientStock { .. } | FulfillmentError::InvalidInput(_) => {
            StatusCode::BAD_REQUEST
        }
        FulfillmentError::AlreadyFulfilled(_) => StatusCode::CONFLICT,
        FulfillmentError::StorageFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        ApiError::Fulfillment(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{BloodType, RequestId};

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn fulfillment_errors_map_to_contract_statuses() {
        assert_eq!(
            status_of(FulfillmentError::NotFound(RequestId::new(1)).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(
                FulfillmentError::InsufficientStock {
                    blood_type: BloodType::OPositive,
                    available: 0,
                    requested: 1,
                }
                .into()
            ),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(FulfillmentError::AlreadyFulfilled(RequestId::new(1)).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(FulfillmentError::InvalidInput("bad".to_string()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(
                FulfillmentError::StorageFailure(StoreError::LockTimeout { waited_ms: 5 }).into()
            ),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn auth_errors_map_to_401_and_403() {
        assert_eq!(status_of(ApiError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(ApiError::Forbidden), StatusCode::FORBIDDEN);
    }
}
