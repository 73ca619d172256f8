use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    BloodRequest, BloodType, InventoryRecord, MAX_UNITS, NewBloodRequest, RequestId, RequestQuery,
    RequestStatus, Result, StoreError, StoreStats,
    store::{BloodBankStore, DEFAULT_LOCK_TIMEOUT, FulfillmentTransaction},
};

/// A point at which the in-memory store can be told to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePoint {
    #[default]
    None,
    /// Fail the next `write_inventory`.
    InventoryWrite,
    /// Fail the next `set_request_status`.
    RequestStatusWrite,
    /// Fail the next `commit`, discarding its writes.
    Commit,
}

#[derive(Debug, Default)]
struct Tables {
    inventory: BTreeMap<BloodType, InventoryRecord>,
    requests: BTreeMap<RequestId, BloodRequest>,
    last_request_id: i64,
    failure: FailurePoint,
}

impl Tables {
    /// Consumes the armed failure if it matches `point`.
    fn trip(&mut self, point: FailurePoint) -> bool {
        if self.failure == point && point != FailurePoint::None {
            self.failure = FailurePoint::None;
            true
        } else {
            false
        }
    }
}

/// Rejects unit counts the PostgreSQL columns could not hold.
fn check_units(units: u32) -> Result<()> {
    if units > MAX_UNITS {
        return Err(StoreError::InvalidRecord(format!(
            "unit count {units} out of range"
        )));
    }
    Ok(())
}

/// In-memory store for tests and database-less runs.
///
/// A transaction holds the only lock over both tables from `begin` until it
/// commits or rolls back, so transactions run strictly one at a time.
/// Writes are staged inside the transaction and applied together on commit.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    lock_timeout: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates a new empty store with a custom lock wait bound.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            lock_timeout,
        }
    }

    /// Arms a one-shot failure at the given point.
    pub async fn inject_failure(&self, point: FailurePoint) -> Result<()> {
        self.acquire().await?.failure = point;
        Ok(())
    }

    async fn acquire(&self) -> Result<OwnedMutexGuard<Tables>> {
        tokio::time::timeout(self.lock_timeout, Arc::clone(&self.tables).lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout {
                waited_ms: self.lock_timeout.as_millis() as u64,
            })
    }
}

#[async_trait]
impl BloodBankStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn FulfillmentTransaction>> {
        let tables = self.acquire().await?;
        Ok(Box::new(InMemoryTransaction {
            tables,
            inventory_writes: HashMap::new(),
            status_writes: HashMap::new(),
        }))
    }

    async fn create_request(&self, request: NewBloodRequest) -> Result<BloodRequest> {
        check_units(request.required_units)?;
        let mut tables = self.acquire().await?;
        tables.last_request_id += 1;
        let request = request.into_request(RequestId::new(tables.last_request_id));
        tables.requests.insert(request.request_id, request.clone());
        Ok(request)
    }

    async fn get_request(&self, request_id: RequestId) -> Result<Option<BloodRequest>> {
        let tables = self.acquire().await?;
        Ok(tables.requests.get(&request_id).cloned())
    }

    async fn list_requests(&self, query: RequestQuery) -> Result<Vec<BloodRequest>> {
        let tables = self.acquire().await?;
        let mut requests: Vec<_> = tables
            .requests
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();

        requests.sort_by(|a, b| {
            b.requested_on
                .cmp(&a.requested_on)
                .then(b.request_id.cmp(&a.request_id))
        });

        if let Some(limit) = query.limit {
            requests.truncate(limit);
        }
        Ok(requests)
    }

    async fn delete_request(&self, request_id: RequestId) -> Result<bool> {
        let mut tables = self.acquire().await?;
        Ok(tables.requests.remove(&request_id).is_some())
    }

    async fn get_inventory(&self, blood_type: BloodType) -> Result<Option<InventoryRecord>> {
        let tables = self.acquire().await?;
        Ok(tables.inventory.get(&blood_type).cloned())
    }

    async fn list_inventory(&self) -> Result<Vec<InventoryRecord>> {
        let tables = self.acquire().await?;
        Ok(tables.inventory.values().cloned().collect())
    }

    async fn set_inventory(&self, blood_type: BloodType, units: u32) -> Result<InventoryRecord> {
        check_units(units)?;
        let mut tables = self.acquire().await?;
        let record = InventoryRecord::new(blood_type, units);
        tables.inventory.insert(blood_type, record.clone());
        Ok(record)
    }

    async fn stats(&self, low_stock_threshold: u32) -> Result<StoreStats> {
        let tables = self.acquire().await?;
        Ok(StoreStats {
            total_requests: tables.requests.len() as u64,
            pending_requests: tables
                .requests
                .values()
                .filter(|r| r.status == RequestStatus::Pending)
                .count() as u64,
            low_stock: tables
                .inventory
                .values()
                .filter(|i| i.units < low_stock_threshold)
                .count() as u64,
        })
    }
}

struct InMemoryTransaction {
    tables: OwnedMutexGuard<Tables>,
    inventory_writes: HashMap<BloodType, InventoryRecord>,
    status_writes: HashMap<RequestId, RequestStatus>,
}

#[async_trait]
impl FulfillmentTransaction for InMemoryTransaction {
    async fn lock_request(&mut self, request_id: RequestId) -> Result<Option<BloodRequest>> {
        let mut request = match self.tables.requests.get(&request_id) {
            Some(request) => request.clone(),
            None => return Ok(None),
        };
        if let Some(status) = self.status_writes.get(&request_id) {
            request.status = *status;
        }
        Ok(Some(request))
    }

    async fn lock_inventory(&mut self, blood_type: BloodType) -> Result<Option<InventoryRecord>> {
        Ok(self
            .inventory_writes
            .get(&blood_type)
            .or_else(|| self.tables.inventory.get(&blood_type))
            .cloned())
    }

    async fn write_inventory(&mut self, record: &InventoryRecord) -> Result<()> {
        if !self.tables.inventory.contains_key(&record.blood_type) {
            return Err(StoreError::InventoryNotFound(record.blood_type));
        }
        if self.tables.trip(FailurePoint::InventoryWrite) {
            return Err(StoreError::Injected("inventory write"));
        }
        self.inventory_writes.insert(record.blood_type, record.clone());
        Ok(())
    }

    async fn set_request_status(
        &mut self,
        request_id: RequestId,
        status: RequestStatus,
    ) -> Result<()> {
        if !self.tables.requests.contains_key(&request_id) {
            return Err(StoreError::RequestNotFound(request_id));
        }
        if self.tables.trip(FailurePoint::RequestStatusWrite) {
            return Err(StoreError::Injected("request status write"));
        }
        self.status_writes.insert(request_id, status);
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        if self.tables.trip(FailurePoint::Commit) {
            return Err(StoreError::Injected("commit"));
        }

        let inventory_writes = std::mem::take(&mut self.inventory_writes);
        let status_writes = std::mem::take(&mut self.status_writes);

        for (blood_type, record) in inventory_writes {
            self.tables.inventory.insert(blood_type, record);
        }
        for (request_id, status) in status_writes {
            if let Some(request) = self.tables.requests.get_mut(&request_id) {
                request.status = status;
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
