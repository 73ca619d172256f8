use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    BloodRequest, BloodType, InventoryRecord, NewBloodRequest, RequestId, RequestQuery,
    RequestStatus, Result, StoreError, StoreStats, UserId,
    store::{BloodBankStore, DEFAULT_LOCK_TIMEOUT, FulfillmentTransaction},
};

/// SQLSTATE raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";

const REQUEST_COLUMNS: &str = "request_id, requested_on, blood_type, required_units, status, \
     recipient_id, recipient_region, request_type";

/// PostgreSQL-backed store.
///
/// Transactions take row-level `FOR UPDATE` locks: the request row first,
/// then the inventory row for its blood type. Every lock wait is bounded by
/// `SET LOCAL lock_timeout`.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store with the default lock wait bound.
    pub fn new(pool: PgPool) -> Self {
        Self::with_lock_timeout(pool, DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates a new PostgreSQL store with a custom lock wait bound.
    pub fn with_lock_timeout(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Opens a transaction whose lock waits give up after `lock_timeout`.
    async fn begin_bounded(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        // SET does not accept bind parameters; the value is an integer.
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;
        Ok(tx)
    }

    fn row_to_request(row: PgRow) -> Result<BloodRequest> {
        let blood_type: String = row.try_get("blood_type")?;
        let status: String = row.try_get("status")?;
        let required_units: i32 = row.try_get("required_units")?;

        Ok(BloodRequest {
            request_id: RequestId::new(row.try_get("request_id")?),
            blood_type: parse_blood_type(&blood_type)?,
            required_units: units_from_sql(required_units)?,
            status: status.parse()?,
            recipient_id: UserId::new(row.try_get("recipient_id")?),
            recipient_region: row.try_get("recipient_region")?,
            request_type: row.try_get("request_type")?,
            requested_on: row.try_get("requested_on")?,
        })
    }

    fn row_to_inventory(row: PgRow) -> Result<InventoryRecord> {
        let blood_type: String = row.try_get("blood_type")?;
        let units: i32 = row.try_get("units")?;

        Ok(InventoryRecord {
            blood_type: parse_blood_type(&blood_type)?,
            units: units_from_sql(units)?,
            last_updated: row.try_get("last_updated")?,
        })
    }
}

fn parse_blood_type(code: &str) -> Result<BloodType> {
    code.parse()
        .map_err(|e: common::ParseBloodTypeError| StoreError::InvalidRecord(e.to_string()))
}

fn units_from_sql(units: i32) -> Result<u32> {
    u32::try_from(units)
        .map_err(|_| StoreError::InvalidRecord(format!("negative unit count {units}")))
}

fn units_to_sql(units: u32) -> Result<i32> {
    i32::try_from(units)
        .map_err(|_| StoreError::InvalidRecord(format!("unit count {units} out of range")))
}

/// Maps an expired `lock_timeout` onto `LockTimeout`.
fn map_lock_error(err: sqlx::Error, lock_timeout: Duration) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.code().as_deref() == Some(LOCK_NOT_AVAILABLE)
    {
        return StoreError::LockTimeout {
            waited_ms: lock_timeout.as_millis() as u64,
        };
    }
    StoreError::Database(err)
}

#[async_trait]
impl BloodBankStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn FulfillmentTransaction>> {
        let tx = self.begin_bounded().await?;
        Ok(Box::new(PgFulfillmentTransaction {
            tx,
            lock_timeout: self.lock_timeout,
        }))
    }

    #[tracing::instrument(skip(self, request), fields(blood_type = %request.blood_type))]
    async fn create_request(&self, request: NewBloodRequest) -> Result<BloodRequest> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO requests
                (requested_on, blood_type, required_units, status,
                 recipient_id, recipient_region, request_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(request.requested_on)
        .bind(request.blood_type.as_str())
        .bind(units_to_sql(request.required_units)?)
        .bind(RequestStatus::Pending.as_str())
        .bind(request.recipient_id.as_i64())
        .bind(request.recipient_region.as_deref())
        .bind(&request.request_type)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_request(row)
    }

    async fn get_request(&self, request_id: RequestId) -> Result<Option<BloodRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM requests WHERE request_id = $1"
        ))
        .bind(request_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_request).transpose()
    }

    async fn list_requests(&self, query: RequestQuery) -> Result<Vec<BloodRequest>> {
        let mut sql = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE 1=1");
        let mut param_count = 0;

        if query.recipient_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND recipient_id = ${param_count}"));
        }
        if query.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${param_count}"));
        }

        sql.push_str(" ORDER BY requested_on DESC, request_id DESC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(recipient_id) = query.recipient_id {
            sqlx_query = sqlx_query.bind(recipient_id.as_i64());
        }
        if let Some(status) = query.status {
            sqlx_query = sqlx_query.bind(status.as_str());
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_request).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn delete_request(&self, request_id: RequestId) -> Result<bool> {
        let mut tx = self.begin_bounded().await?;

        let result = sqlx::query("DELETE FROM requests WHERE request_id = $1")
            .bind(request_id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_lock_error(e, self.lock_timeout))?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_inventory(&self, blood_type: BloodType) -> Result<Option<InventoryRecord>> {
        let row = sqlx::query(
            "SELECT blood_type, units, last_updated FROM inventory WHERE blood_type = $1",
        )
        .bind(blood_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_inventory).transpose()
    }

    async fn list_inventory(&self) -> Result<Vec<InventoryRecord>> {
        let rows =
            sqlx::query("SELECT blood_type, units, last_updated FROM inventory ORDER BY blood_type")
                .fetch_all(&self.pool)
                .await?;

        let mut records = rows
            .into_iter()
            .map(Self::row_to_inventory)
            .collect::<Result<Vec<_>>>()?;
        // Match the in-memory store's enum order rather than collation order.
        records.sort_by_key(|r| r.blood_type);
        Ok(records)
    }

    #[tracing::instrument(skip(self))]
    async fn set_inventory(&self, blood_type: BloodType, units: u32) -> Result<InventoryRecord> {
        let mut tx = self.begin_bounded().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO inventory (blood_type, units, last_updated)
            VALUES ($1, $2, $3)
            ON CONFLICT (blood_type) DO UPDATE SET
                units = EXCLUDED.units,
                last_updated = EXCLUDED.last_updated
            RETURNING blood_type, units, last_updated
            "#,
        )
        .bind(blood_type.as_str())
        .bind(units_to_sql(units)?)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_lock_error(e, self.lock_timeout))?;

        tx.commit().await?;
        Self::row_to_inventory(row)
    }

    async fn stats(&self, low_stock_threshold: u32) -> Result<StoreStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM requests) AS total_requests,
                (SELECT COUNT(*) FROM requests WHERE status = 'Pending') AS pending_requests,
                (SELECT COUNT(*) FROM inventory WHERE units < $1) AS low_stock
            "#,
        )
        .bind(i64::from(low_stock_threshold))
        .fetch_one(&self.pool)
        .await?;

        let count = |column: &str| -> Result<u64> {
            let value: i64 = row.try_get(column)?;
            Ok(value.max(0) as u64)
        };

        Ok(StoreStats {
            total_requests: count("total_requests")?,
            pending_requests: count("pending_requests")?,
            low_stock: count("low_stock")?,
        })
    }
}

struct PgFulfillmentTransaction {
    tx: Transaction<'static, Postgres>,
    lock_timeout: Duration,
}

#[async_trait]
impl FulfillmentTransaction for PgFulfillmentTransaction {
    async fn lock_request(&mut self, request_id: RequestId) -> Result<Option<BloodRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM requests WHERE request_id = $1 FOR UPDATE"
        ))
        .bind(request_id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_lock_error(e, self.lock_timeout))?;

        row.map(PostgresStore::row_to_request).transpose()
    }

    async fn lock_inventory(&mut self, blood_type: BloodType) -> Result<Option<InventoryRecord>> {
        let row = sqlx::query(
            "SELECT blood_type, units, last_updated FROM inventory WHERE blood_type = $1 FOR UPDATE",
        )
        .bind(blood_type.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_lock_error(e, self.lock_timeout))?;

        row.map(PostgresStore::row_to_inventory).transpose()
    }

    async fn write_inventory(&mut self, record: &InventoryRecord) -> Result<()> {
        let result =
            sqlx::query("UPDATE inventory SET units = $2, last_updated = $3 WHERE blood_type = $1")
                .bind(record.blood_type.as_str())
                .bind(units_to_sql(record.units)?)
                .bind(record.last_updated)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_lock_error(e, self.lock_timeout))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::InventoryNotFound(record.blood_type));
        }
        Ok(())
    }

    async fn set_request_status(
        &mut self,
        request_id: RequestId,
        status: RequestStatus,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE requests SET status = $2 WHERE request_id = $1")
            .bind(request_id.as_i64())
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_lock_error(e, self.lock_timeout))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RequestNotFound(request_id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
