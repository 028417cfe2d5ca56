//! Record module split into types and boundary validation

pub mod types;
pub mod validation;

pub use types::*;
pub use validation::record_from_submission;
