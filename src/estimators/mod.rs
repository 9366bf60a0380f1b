//! Structure learning and the statistical tests behind it.
//!
//! [`PcEstimator`] learns a DAG from discrete data with the PC algorithm;
//! the [`independence`] module provides the conditional chi-square test it
//! relies on, along with correlation-based tests for continuous data.

pub mod independence;
pub mod pc;

pub use pc::PcEstimator;
