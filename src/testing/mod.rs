//! Scenario execution
//!
//! A scenario pairs SUT parameters with one check. The runner owns the
//! sequencing (capture before SUT, teardown on every path); the verifier
//! owns the comparison.

mod config;
mod runner;
mod verifier;

pub use config::*;
pub use runner::{Harness, ScenarioReport};
pub use verifier::{mean_interval_ms, Progress, Tolerance, Verifier};
