//! compatplan - constraint-based media conversion planner
//!
//! Probed stream inventories go in; validated [`planner::ConversionPlan`]s
//! and the ordered tool invocations that realize them come out. The binary
//! wraps this in a batch driver that writes one shell script per file.

pub mod batch;
pub mod config;
pub mod exec;
pub mod matrix;
pub mod planner;
pub mod render;

mod error;

pub use error::{MatrixError, PlanError};
