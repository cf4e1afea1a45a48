//! Crate-wide error aggregation.

pub mod error;

pub use error::XsiteError;
