use std::time::Duration;

use async_trait::async_trait;

use crate::{
    BloodRequest, BloodType, InventoryRecord, NewBloodRequest, RequestId, RequestQuery,
    RequestStatus, Result, StoreStats,
};

/// Default bound on how long a store waits for a contended lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// A unit of work over the inventory and request tables.
///
/// Rows read through the `lock_*` methods stay exclusively locked until the
/// transaction commits or rolls back, so no other transaction can read them
/// for write or modify them in between. Writes are invisible to other
/// transactions until `commit` succeeds. Dropping a transaction without
/// committing discards its writes.
#[async_trait]
pub trait FulfillmentTransaction: Send {
    /// Reads a request and locks it for the rest of the transaction.
    async fn lock_request(&mut self, request_id: RequestId) -> Result<Option<BloodRequest>>;

    /// Reads the stock for a blood type and locks it for the rest of the
    /// transaction.
    async fn lock_inventory(&mut self, blood_type: BloodType) -> Result<Option<InventoryRecord>>;

    /// Overwrites a locked inventory row.
    async fn write_inventory(&mut self, record: &InventoryRecord) -> Result<()>;

    /// Changes the status of a locked request.
    async fn set_request_status(
        &mut self,
        request_id: RequestId,
        status: RequestStatus,
    ) -> Result<()>;

    /// Makes every write visible at once and releases the locks.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discards every write and releases the locks.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Storage collaborator for inventory and blood requests.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait BloodBankStore: Send + Sync {
    /// Opens a transaction.
    async fn begin(&self) -> Result<Box<dyn FulfillmentTransaction>>;

    /// Inserts a new `Pending` request and returns it with its assigned ID.
    async fn create_request(&self, request: NewBloodRequest) -> Result<BloodRequest>;

    /// Reads a request without locking it.
    async fn get_request(&self, request_id: RequestId) -> Result<Option<BloodRequest>>;

    /// Lists requests matching the query, newest first.
    async fn list_requests(&self, query: RequestQuery) -> Result<Vec<BloodRequest>>;

    /// Deletes a request. Returns false if it did not exist.
    ///
    /// Waits for any transaction holding the request's lock.
    async fn delete_request(&self, request_id: RequestId) -> Result<bool>;

    /// Reads the stock for one blood type without locking it.
    async fn get_inventory(&self, blood_type: BloodType) -> Result<Option<InventoryRecord>>;

    /// Lists all stock ordered by blood type.
    async fn list_inventory(&self) -> Result<Vec<InventoryRecord>>;

    /// Sets the stock for a blood type, creating the row if needed.
    ///
    /// Waits for any transaction holding the row's lock.
    async fn set_inventory(&self, blood_type: BloodType, units: u32) -> Result<InventoryRecord>;

    /// Counts requests and low-stock blood types.
    async fn stats(&self, low_stock_threshold: u32) -> Result<StoreStats>;
}
