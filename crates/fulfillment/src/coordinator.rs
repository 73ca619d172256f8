//! Coordinator for fulfilling blood requests against inventory.

use std::time::Instant;

use blood_store::{BloodBankStore, FulfillmentTransaction, RequestStatus};
use chrono::Utc;
use common::{Caller, RequestId};

use crate::error::{FulfillmentError, Result};
use crate::outcome::FulfillmentOutcome;

/// Converts an optional allocation from the wire into a unit count.
///
/// Absent means "use the request's required units". A present value must be
/// a positive integer that fits in `u32`.
pub fn parse_allocated_units(raw: Option<i64>) -> Result<Option<u32>> {
    match raw {
        None => Ok(None),
        Some(units) if units <= 0 => Err(FulfillmentError::InvalidInput(
            "allocated_units must be a positive integer".to_string(),
        )),
        Some(units) => u32::try_from(units).map(Some).map_err(|_| {
            FulfillmentError::InvalidInput(format!("allocated_units {units} is too large"))
        }),
    }
}

/// Fulfills pending blood requests by deducting stock.
///
/// Each call runs inside a single store transaction. The request row is
/// locked before the inventory row, and both stay locked until the
/// transaction ends, so two concurrent calls can never both observe the same
/// request as `Pending` or the same stock level.
#[derive(Debug, Clone)]
pub struct FulfillmentCoordinator<S: BloodBankStore> {
    store: S,
}

impl<S: BloodBankStore> FulfillmentCoordinator<S> {
    /// Creates a new coordinator over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fulfills a request, deducting `allocated_units` (or the request's
    /// required units when absent) from the matching blood type.
    ///
    /// The caller must already be authorized as an admin; it is recorded for
    /// auditing only.
    #[tracing::instrument(skip(self, caller), fields(fulfilled_by = %caller.user_id))]
    pub async fn fulfill(
        &self,
        caller: &Caller,
        request_id: RequestId,
        allocated_units: Option<u32>,
    ) -> Result<FulfillmentOutcome> {
        metrics::counter!("fulfillment_attempts_total").increment(1);
        let start = Instant::now();

        let result = self.run(request_id, allocated_units).await;

        metrics::histogram!("fulfillment_duration_seconds").record(start.elapsed().as_secs_f64());
        let outcome_label = match &result {
            Ok(_) => "fulfilled",
            Err(err) => err.kind(),
        };
        metrics::counter!("fulfillment_outcomes_total", "outcome" => outcome_label).increment(1);

        match &result {
            Ok(outcome) => tracing::info!(
                %request_id,
                blood_type = %outcome.blood_type,
                units = outcome.units_deducted,
                "request fulfilled"
            ),
            Err(err) if err.is_retriable() => {
                tracing::error!(%request_id, error = %err, "fulfillment failed")
            }
            Err(err) => tracing::warn!(%request_id, reason = err.kind(), "fulfillment rejected"),
        }

        result
    }

    async fn run(
        &self,
        request_id: RequestId,
        allocated_units: Option<u32>,
    ) -> Result<FulfillmentOutcome> {
        if allocated_units == Some(0) {
            return Err(FulfillmentError::InvalidInput(
                "allocated_units must be a positive integer".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;

        match apply(&mut *tx, request_id, allocated_units).await {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(%request_id, error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// Runs the read-check-write steps inside an open transaction.
async fn apply(
    tx: &mut dyn FulfillmentTransaction,
    request_id: RequestId,
    allocated_units: Option<u32>,
) -> Result<FulfillmentOutcome> {
    let request = tx
        .lock_request(request_id)
        .await?
        .ok_or(FulfillmentError::NotFound(request_id))?;

    if !request.status.can_fulfill() {
        return Err(FulfillmentError::AlreadyFulfilled(request_id));
    }

    let units = allocated_units.unwrap_or(request.required_units);
    let stock = tx.lock_inventory(request.blood_type).await?;

    // A missing inventory row counts as zero stock.
    let remaining = stock
        .as_ref()
        .and_then(|record| record.deducted(units, Utc::now()))
        .ok_or_else(|| FulfillmentError::InsufficientStock {
            blood_type: request.blood_type,
            available: stock.as_ref().map_or(0, |record| record.units),
            requested: units,
        })?;

    tx.write_inventory(&remaining).await?;
    tx.set_request_status(request_id, RequestStatus::Fulfilled).await?;

    Ok(FulfillmentOutcome {
        request_id,
        units_deducted: units,
        blood_type: request.blood_type,
        status: RequestStatus::Fulfilled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use blood_store::{
        BloodType, FailurePoint, InMemoryStore, NewBloodRequest, StoreError, UserId,
    };
    use chrono::NaiveDate;

    fn admin() -> Caller {
        Caller::admin(UserId::new(1))
    }

    fn new_request(blood_type: BloodType, units: u32) -> NewBloodRequest {
        NewBloodRequest {
            blood_type,
            required_units: units,
            recipient_id: UserId::new(42),
            recipient_region: None,
            request_type: "Routine".to_string(),
            requested_on: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        }
    }

    async fn setup(
        blood_type: BloodType,
        stock: u32,
        required: u32,
    ) -> (FulfillmentCoordinator<InMemoryStore>, RequestId) {
        let store = InMemoryStore::new();
        store.set_inventory(blood_type, stock).await.unwrap();
        let request = store
            .create_request(new_request(blood_type, required))
            .await
            .unwrap();
        (FulfillmentCoordinator::new(store), request.request_id)
    }

    async fn units(coordinator: &FulfillmentCoordinator<InMemoryStore>, bt: BloodType) -> u32 {
        coordinator
            .store()
            .get_inventory(bt)
            .await
            .unwrap()
            .map_or(0, |record| record.units)
    }

    async fn status(
        coordinator: &FulfillmentCoordinator<InMemoryStore>,
        id: RequestId,
    ) -> RequestStatus {
        coordinator
            .store()
            .get_request(id)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    #[tokio::test]
    async fn fulfills_with_required_units() {
        let (coordinator, id) = setup(BloodType::OPositive, 10, 4).await;

        let outcome = coordinator.fulfill(&admin(), id, None).await.unwrap();

        assert_eq!(outcome.units_deducted, 4);
        assert_eq!(outcome.blood_type, BloodType::OPositive);
        assert_eq!(outcome.status, RequestStatus::Fulfilled);
        assert_eq!(units(&coordinator, BloodType::OPositive).await, 6);
        assert_eq!(status(&coordinator, id).await, RequestStatus::Fulfilled);
    }

    #[tokio::test]
    async fn allocated_units_override_required_units() {
        let (coordinator, id) = setup(BloodType::ANegative, 5, 4).await;

        let outcome = coordinator.fulfill(&admin(), id, Some(2)).await.unwrap();

        assert_eq!(outcome.units_deducted, 2);
        assert_eq!(units(&coordinator, BloodType::ANegative).await, 3);
        // A partial allocation still closes the request.
        assert_eq!(status(&coordinator, id).await, RequestStatus::Fulfilled);
    }

    #[tokio::test]
    async fn exact_stock_drains_to_zero() {
        let (coordinator, id) = setup(BloodType::BPositive, 3, 3).await;

        coordinator.fulfill(&admin(), id, None).await.unwrap();

        assert_eq!(units(&coordinator, BloodType::BPositive).await, 0);
    }

    #[tokio::test]
    async fn insufficient_stock_changes_nothing() {
        let (coordinator, id) = setup(BloodType::AbNegative, 2, 3).await;

        let err = coordinator.fulfill(&admin(), id, None).await.unwrap_err();

        assert!(matches!(
            err,
            FulfillmentError::InsufficientStock {
                blood_type: BloodType::AbNegative,
                available: 2,
                requested: 3,
            }
        ));
        assert_eq!(units(&coordinator, BloodType::AbNegative).await, 2);
        assert_eq!(status(&coordinator, id).await, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn missing_inventory_row_is_insufficient_stock() {
        let store = InMemoryStore::new();
        let request = store
            .create_request(new_request(BloodType::ONegative, 1))
            .await
            .unwrap();
        let coordinator = FulfillmentCoordinator::new(store);

        let err = coordinator
            .fulfill(&admin(), request.request_id, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FulfillmentError::InsufficientStock { available: 0, .. }
        ));
        assert_eq!(
            status(&coordinator, request.request_id).await,
            RequestStatus::Pending
        );
    }

    #[tokio::test]
    async fn second_fulfillment_is_rejected() {
        let (coordinator, id) = setup(BloodType::OPositive, 10, 4).await;
        coordinator.fulfill(&admin(), id, None).await.unwrap();

        let err = coordinator.fulfill(&admin(), id, None).await.unwrap_err();

        assert!(matches!(err, FulfillmentError::AlreadyFulfilled(rid) if rid == id));
        assert_eq!(units(&coordinator, BloodType::OPositive).await, 6);
    }

    #[tokio::test]
    async fn unknown_request_is_not_found() {
        let (coordinator, _) = setup(BloodType::OPositive, 10, 4).await;

        let err = coordinator
            .fulfill(&admin(), RequestId::new(999), None)
            .await
            .unwrap_err();

        assert!(matches!(err, FulfillmentError::NotFound(rid) if rid == RequestId::new(999)));
        assert_eq!(units(&coordinator, BloodType::OPositive).await, 10);
    }

    #[tokio::test]
    async fn zero_allocation_is_invalid_input() {
        let (coordinator, id) = setup(BloodType::OPositive, 10, 4).await;

        let err = coordinator.fulfill(&admin(), id, Some(0)).await.unwrap_err();

        assert!(matches!(err, FulfillmentError::InvalidInput(_)));
        assert_eq!(status(&coordinator, id).await, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn failed_status_write_rolls_back_stock() {
        let (coordinator, id) = setup(BloodType::APositive, 10, 4).await;
        coordinator
            .store()
            .inject_failure(FailurePoint::RequestStatusWrite)
            .await
            .unwrap();

        let err = coordinator.fulfill(&admin(), id, None).await.unwrap_err();

        assert!(matches!(
            err,
            FulfillmentError::StorageFailure(StoreError::Injected(_))
        ));
        assert!(err.is_retriable());
        assert_eq!(units(&coordinator, BloodType::APositive).await, 10);
        assert_eq!(status(&coordinator, id).await, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn failed_inventory_write_leaves_request_pending() {
        let (coordinator, id) = setup(BloodType::APositive, 10, 4).await;
        coordinator
            .store()
            .inject_failure(FailurePoint::InventoryWrite)
            .await
            .unwrap();

        let err = coordinator.fulfill(&admin(), id, None).await.unwrap_err();

        assert!(matches!(err, FulfillmentError::StorageFailure(_)));
        assert_eq!(units(&coordinator, BloodType::APositive).await, 10);
        assert_eq!(status(&coordinator, id).await, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn failed_commit_discards_both_writes_and_allows_retry() {
        let (coordinator, id) = setup(BloodType::APositive, 10, 4).await;
        coordinator
            .store()
            .inject_failure(FailurePoint::Commit)
            .await
            .unwrap();

        let err = coordinator.fulfill(&admin(), id, None).await.unwrap_err();
        assert!(matches!(err, FulfillmentError::StorageFailure(_)));
        assert_eq!(units(&coordinator, BloodType::APositive).await, 10);
        assert_eq!(status(&coordinator, id).await, RequestStatus::Pending);

        coordinator.fulfill(&admin(), id, None).await.unwrap();
        assert_eq!(units(&coordinator, BloodType::APositive).await, 6);
    }

    #[test]
    fn parse_allocated_units_accepts_positive_values() {
        assert_eq!(parse_allocated_units(None).unwrap(), None);
        assert_eq!(parse_allocated_units(Some(3)).unwrap(), Some(3));
    }

    #[test]
    fn parse_allocated_units_rejects_non_positive_and_oversized() {
        assert!(matches!(
            parse_allocated_units(Some(0)),
            Err(FulfillmentError::InvalidInput(_))
        ));
        assert!(matches!(
            parse_allocated_units(Some(-2)),
            Err(FulfillmentError::InvalidInput(_))
        ));
        assert!(matches!(
            parse_allocated_units(Some(i64::from(u32::MAX) + 1)),
            Err(FulfillmentError::InvalidInput(_))
        ));
    }
}
