//! Shared identifiers and value types used across the blood bank crates.

pub mod blood_type;
pub mod caller;
pub mod types;

pub use blood_type::{BloodType, ParseBloodTypeError};
pub use caller::{Caller, Role};
pub use types::{RequestId, UserId};
