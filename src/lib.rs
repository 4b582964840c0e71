//! UDP Harness - black-box conformance testing for UDP senders
//!
//! This library writes a sender's configuration file, binds a capture socket,
//! runs the sender, and checks the datagrams it emits for size, content and
//! sending period.

pub mod capture;
pub mod cli;
pub mod commands;
pub mod common;
pub mod sut;
pub mod testing;

// Re-export commonly used types for tests
pub use capture::{CaptureTarget, CapturedPacket, PacketCapture};
pub use common::{Error, HarnessSettings, Result};
pub use sut::{SutConfig, SutProcess};
pub use testing::{Check, Harness, Scenario, ScenarioReport};
