use crate::{BloodRequest, RequestStatus, UserId};

/// Filter for listing blood requests.
///
/// Results are always ordered by `requested_on` descending, then by
/// request ID descending.
#[derive(Debug, Clone, Default)]
pub struct RequestQuery {
    /// Filter by recipient.
    pub recipient_id: Option<UserId>,

    /// Filter by status.
    pub status: Option<RequestStatus>,

    /// Maximum number of requests to return.
    pub limit: Option<usize>,
}

impl RequestQuery {
    /// Creates a query matching every request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one recipient's requests.
    pub fn for_recipient(recipient_id: UserId) -> Self {
        Self {
            recipient_id: Some(recipient_id),
            ..Default::default()
        }
    }

    pub fn status(mut self, status: RequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if the request passes every filter.
    pub fn matches(&self, request: &BloodRequest) -> bool {
        if let Some(recipient_id) = self.recipient_id
            && request.recipient_id != recipient_id
        {
            return false;
        }
        if let Some(status) = self.status
            && request.status != status
        {
            return false;
        }
        true
    }
}
