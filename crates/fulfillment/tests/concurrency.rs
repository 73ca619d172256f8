//! Concurrent fulfillment against the in-memory store.

use std::sync::Arc;

use blood_store::{
    BloodBankStore, BloodType, InMemoryStore, NewBloodRequest, RequestStatus, UserId,
};
use chrono::NaiveDate;
use common::Caller;
use fulfillment::{FulfillmentCoordinator, FulfillmentError};
use futures_util::future::join_all;

fn new_request(blood_type: BloodType, units: u32) -> NewBloodRequest {
    NewBloodRequest {
        blood_type,
        required_units: units,
        recipient_id: UserId::new(7),
        recipient_region: None,
        request_type: "Emergency".to_string(),
        requested_on: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_request_is_fulfilled_exactly_once() {
    let store = InMemoryStore::new();
    store.set_inventory(BloodType::OPositive, 100).await.unwrap();
    let request = store
        .create_request(new_request(BloodType::OPositive, 5))
        .await
        .unwrap();
    let coordinator = Arc::new(FulfillmentCoordinator::new(store));

    let handles = (0..16).map(|i| {
        let coordinator = Arc::clone(&coordinator);
        let request_id = request.request_id;
        tokio::spawn(async move {
            let admin = Caller::admin(UserId::new(i));
            coordinator.fulfill(&admin, request_id, None).await
        })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(FulfillmentError::AlreadyFulfilled(_))))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(rejected, 15);

    let stock = coordinator
        .store()
        .get_inventory(BloodType::OPositive)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stock.units, 95);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_fulfills_of_exact_stock_leave_zero() {
    let store = InMemoryStore::new();
    store.set_inventory(BloodType::OPositive, 5).await.unwrap();
    let request = store
        .create_request(new_request(BloodType::OPositive, 5))
        .await
        .unwrap();
    let coordinator = Arc::new(FulfillmentCoordinator::new(store));

    let handles = (0..2).map(|i| {
        let coordinator = Arc::clone(&coordinator);
        let request_id = request.request_id;
        tokio::spawn(async move {
            coordinator
                .fulfill(&Caller::admin(UserId::new(i)), request_id, None)
                .await
        })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    // The loser sees the status first, never the emptied stock.
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(FulfillmentError::AlreadyFulfilled(_))))
            .count(),
        1
    );

    let stock = coordinator
        .store()
        .get_inventory(BloodType::OPositive)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stock.units, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn competing_requests_never_overdraw_stock() {
    let store = InMemoryStore::new();
    store.set_inventory(BloodType::BNegative, 10).await.unwrap();
    let mut ids = Vec::new();
    for _ in 0..8 {
        let request = store
            .create_request(new_request(BloodType::BNegative, 3))
            .await
            .unwrap();
        ids.push(request.request_id);
    }
    let coordinator = Arc::new(FulfillmentCoordinator::new(store));

    let handles = ids.iter().copied().map(|request_id| {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            let admin = Caller::admin(UserId::new(1));
            coordinator.fulfill(&admin, request_id, None).await
        })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    // 10 units cover three requests of 3.
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 3);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|err| matches!(err, FulfillmentError::InsufficientStock { .. }))
    );

    let stock = coordinator
        .store()
        .get_inventory(BloodType::BNegative)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stock.units, 1);

    let fulfilled = coordinator
        .store()
        .list_requests(blood_store::RequestQuery::new().status(RequestStatus::Fulfilled))
        .await
        .unwrap();
    assert_eq!(fulfilled.len(), successes);
}
