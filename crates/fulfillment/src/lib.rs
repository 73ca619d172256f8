//! Request fulfillment for the blood bank backend.
//!
//! Fulfilling a request runs as one store transaction:
//! 1. Lock and re-read the request; it must exist and still be `Pending`
//! 2. Lock and re-read the stock for the request's blood type
//! 3. Deduct the allocated units and mark the request `Fulfilled`
//!
//! Any failure rolls back both writes.

pub mod coordinator;
pub mod error;
pub mod outcome;

pub use coordinator::{FulfillmentCoordinator, parse_allocated_units};
pub use error::{FulfillmentError, Result};
pub use outcome::FulfillmentOutcome;
