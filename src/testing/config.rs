//! Test scenario configuration types
//!
//! Defines the data structures for deserializing YAML test scenarios.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::capture::CaptureTarget;
use crate::common::{Error, Result};
use crate::sut::SutConfig;

/// Number of inter-arrival deltas a period check averages by default
pub const DEFAULT_PERIOD_SAMPLES: usize = 10;

/// Default symmetric tolerance of a period check, as a fraction of the period
pub const DEFAULT_PERIOD_TOLERANCE: f64 = 0.10;

/// A complete test scenario loaded from a YAML file
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Scenario {
    /// Name of the test scenario
    pub name: String,
    /// Optional description of what the test verifies
    #[serde(default)]
    pub description: Option<String>,
    /// Parameters written to the SUT config file
    pub connection: SutConfig,
    /// The check applied to captured traffic
    pub expect: Check,
    /// Per-datagram receive deadline, overriding the harness setting
    #[serde(default)]
    pub receive_timeout_ms: Option<u64>,
}

/// Which property of the SUT's traffic a scenario verifies
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Check {
    /// First datagram is exactly `payload_length` bytes
    PayloadSize,
    /// First datagram decodes to exactly `payload`
    PayloadContent,
    /// Mean inter-arrival time of `samples` deltas is within `tolerance`
    /// of `sending_period`
    SendingPeriod {
        #[serde(default = "default_samples")]
        samples: usize,
        #[serde(default = "default_tolerance")]
        tolerance: f64,
    },
}

fn default_samples() -> usize {
    DEFAULT_PERIOD_SAMPLES
}

fn default_tolerance() -> f64 {
    DEFAULT_PERIOD_TOLERANCE
}

impl Scenario {
    /// Load a scenario from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_yaml(&content).map_err(|e| match e {
            Error::Scenario(msg) => Error::Scenario(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Parse a scenario from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::Scenario(e.to_string()))
    }

    /// Check the scenario is runnable and work out where to capture
    ///
    /// Nothing is written or started for a scenario that fails here.
    pub fn validate(&self) -> Result<CaptureTarget> {
        let conn = &self.connection;
        match &self.expect {
            Check::PayloadSize if conn.payload_length == 0 => {
                return Err(self.invalid("payload_size check needs payload_length > 0"));
            }
            Check::PayloadContent if conn.payload_text().is_none() => {
                return Err(self.invalid("payload_content check needs a non-empty payload"));
            }
            Check::SendingPeriod { samples, tolerance } => {
                if conn.sending_period_ms == 0 {
                    return Err(self.invalid("sending_period check needs sending_period > 0"));
                }
                if *samples == 0 {
                    return Err(self.invalid("sending_period check needs samples >= 1"));
                }
                if !(0.0..1.0).contains(tolerance) {
                    return Err(self.invalid("tolerance must be in [0, 1)"));
                }
                if conn.expected_datagram_len().is_none() {
                    return Err(
                        self.invalid("sending_period check needs payload_length or payload")
                    );
                }
            }
            _ => {}
        }

        if conn.destination_port == 0 {
            return Err(self.invalid("destination_port is required to capture traffic"));
        }
        CaptureTarget::from_destination(&conn.destination_ip, conn.destination_port)
    }

    fn invalid(&self, reason: &str) -> Error {
        Error::Scenario(format!("'{}': {}", self.name, reason))
    }
}

/// The three reference scenarios the harness was written around
pub fn builtin_scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "payload length".to_string(),
            description: Some("First datagram has the configured payload_length".to_string()),
            connection: SutConfig {
                payload_length: 128,
                payload: None,
                destination_ip: "127.0.0.1".to_string(),
                destination_port: 5000,
                sending_period_ms: 1000,
            },
            expect: Check::PayloadSize,
            receive_timeout_ms: None,
        },
        Scenario {
            name: "payload content".to_string(),
            description: Some("First datagram carries the configured payload text".to_string()),
            connection: SutConfig {
                payload_length: 0,
                payload: Some("abcdefghijklmnopqrstuvwxyz".to_string()),
                destination_ip: "127.0.0.1".to_string(),
                destination_port: 1234,
                sending_period_ms: 1000,
            },
            expect: Check::PayloadContent,
            receive_timeout_ms: None,
        },
        Scenario {
            name: "multicast sending period".to_string(),
            description: Some(
                "Mean of 10 inter-arrival times is within 10% of sending_period".to_string(),
            ),
            connection: SutConfig {
                payload_length: 64,
                payload: None,
                destination_ip: "239.0.0.99".to_string(),
                destination_port: 6000,
                sending_period_ms: 123,
            },
            expect: Check::SendingPeriod {
                samples: DEFAULT_PERIOD_SAMPLES,
                tolerance: DEFAULT_PERIOD_TOLERANCE,
            },
            receive_timeout_ms: None,
        },
    ]
}
