pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod record;
pub mod store;

pub use common::{BloodType, RequestId, UserId};
pub use error::{Result, StoreError};
pub use memory::{FailurePoint, InMemoryStore};
pub use postgres::PostgresStore;
pub use query::RequestQuery;
pub use record::{
    BloodRequest, InventoryRecord, MAX_UNITS, NewBloodRequest, RequestStatus, StoreStats,
};
pub use store::{BloodBankStore, DEFAULT_LOCK_TIMEOUT, FulfillmentTransaction};
