use blood_store::RequestStatus;
use common::{BloodType, RequestId};
use serde::Serialize;

/// Result of a successful fulfillment. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FulfillmentOutcome {
    pub request_id: RequestId,
    pub units_deducted: u32,
    pub blood_type: BloodType,
    pub status: RequestStatus,
}
