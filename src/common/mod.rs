//! Common utilities shared by the harness and its CLI

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use config::HarnessSettings;
pub use error::{Error, Result};
