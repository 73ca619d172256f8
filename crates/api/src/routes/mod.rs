//! HTTP handlers and shared request state.

pub mod fulfill;
pub mod inventory;
pub mod requests;
pub mod stats;
pub mod system;

use blood_store::{BloodBankStore, MAX_UNITS};
use common::RequestId;
use fulfillment::FulfillmentCoordinator;
use serde::de::DeserializeOwned;

use crate::auth::SessionRegistry;
use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: BloodBankStore> {
    pub coordinator: FulfillmentCoordinator<S>,
    pub sessions: SessionRegistry,
    pub low_stock_threshold: u32,
}

impl<S: BloodBankStore> AppState<S> {
    pub fn store(&self) -> &S {
        self.coordinator.store()
    }
}

/// Parses a JSON body, mapping malformed input to 400.
fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))
}

fn parse_request_id(id: &str) -> Result<RequestId, ApiError> {
    id.trim()
        .parse::<i64>()
        .map(RequestId::new)
        .map_err(|_| ApiError::BadRequest(format!("Invalid request id: {id}")))
}

/// Converts a wire unit count, accepting `0..=MAX_UNITS` (or `1..` when
/// `positive`).
fn parse_units(field: &str, units: i64, positive: bool) -> Result<u32, ApiError> {
    let min = i64::from(positive);
    u32::try_from(units)
        .ok()
        .filter(|u| i64::from(*u) >= min && *u <= MAX_UNITS)
        .ok_or_else(|| {
            ApiError::BadRequest(format!(
                "{field} must be an integer between {min} and {MAX_UNITS}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_must_be_integers() {
        assert_eq!(parse_request_id("42").unwrap(), RequestId::new(42));
        assert!(matches!(parse_request_id("abc"), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn unit_counts_are_bounded_by_column_range() {
        assert_eq!(parse_units("new_units", 0, false).unwrap(), 0);
        assert!(parse_units("required_units", 0, true).is_err());
        assert_eq!(parse_units("new_units", i64::from(MAX_UNITS), false).unwrap(), MAX_UNITS);
        assert!(parse_units("new_units", i64::from(MAX_UNITS) + 1, false).is_err());
        assert!(parse_units("new_units", -1, false).is_err());
    }
}
