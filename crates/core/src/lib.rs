//! Domain types and pure logic for the Relaize restoration service.
//!
//! Nothing in this crate performs I/O. The store, pipeline, worker and API
//! crates all build on these types.

pub mod adjustments;
pub mod catalog;
pub mod error;
pub mod metrics;
pub mod naming;
pub mod report;
pub mod task;
pub mod types;
