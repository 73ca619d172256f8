use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{BloodType, RequestId, StoreError, UserId};

/// Lifecycle state of a blood request.
///
/// ```text
/// Pending ──► Fulfilled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RequestStatus {
    /// Submitted and waiting for stock to be allocated.
    #[default]
    Pending,

    /// Stock has been deducted for this request (terminal state).
    Fulfilled,
}

impl RequestStatus {
    /// Returns true if a request in this state may be fulfilled.
    pub fn can_fulfill(&self) -> bool {
        matches!(self, RequestStatus::Pending)
    }

    /// Returns the status as stored in the `requests.status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "Pending",
            RequestStatus::Fulfilled => "Fulfilled",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(RequestStatus::Pending),
            "Fulfilled" => Ok(RequestStatus::Fulfilled),
            other => Err(StoreError::InvalidRecord(format!(
                "unknown request status '{other}'"
            ))),
        }
    }
}

/// Largest unit count a store accepts; the SQL columns are `INTEGER`.
pub const MAX_UNITS: u32 = i32::MAX as u32;

/// Available stock for one blood type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub blood_type: BloodType,
    pub units: u32,
    pub last_updated: DateTime<Utc>,
}

impl InventoryRecord {
    pub fn new(blood_type: BloodType, units: u32) -> Self {
        Self {
            blood_type,
            units,
            last_updated: Utc::now(),
        }
    }

    /// Returns a copy with `units` removed and `last_updated` stamped.
    ///
    /// Returns `None` if that would take stock below zero.
    pub fn deducted(&self, units: u32, at: DateTime<Utc>) -> Option<Self> {
        let remaining = self.units.checked_sub(units)?;
        Some(Self {
            blood_type: self.blood_type,
            units: remaining,
            last_updated: at,
        })
    }
}

/// A recipient's request for units of one blood type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloodRequest {
    pub request_id: RequestId,
    pub blood_type: BloodType,
    pub required_units: u32,
    pub status: RequestStatus,
    pub recipient_id: UserId,
    /// Region recorded from the recipient's session; plain data.
    pub recipient_region: Option<String>,
    pub request_type: String,
    pub requested_on: NaiveDate,
}

/// Fields supplied when a request is submitted.
///
/// The store assigns the ID; every new request starts `Pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBloodRequest {
    pub blood_type: BloodType,
    pub required_units: u32,
    pub recipient_id: UserId,
    pub recipient_region: Option<String>,
    pub request_type: String,
    pub requested_on: NaiveDate,
}

impl NewBloodRequest {
    pub(crate) fn into_request(self, request_id: RequestId) -> BloodRequest {
        BloodRequest {
            request_id,
            blood_type: self.blood_type,
            required_units: self.required_units,
            status: RequestStatus::Pending,
            recipient_id: self.recipient_id,
            recipient_region: self.recipient_region,
            request_type: self.request_type,
            requested_on: self.requested_on,
        }
    }
}

/// Aggregate counts for the admin overview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StoreStats {
    pub total_requests: u64,
    pub pending_requests: u64,
    /// Number of blood types whose stock is below the threshold.
    pub low_stock: u64,
}
