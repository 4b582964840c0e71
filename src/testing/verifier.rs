//! Checks applied to captured traffic
//!
//! Every check consumes packets one at a time from the same capture loop.
//! `observe` either asks for another packet, finishes with a summary, or
//! fails with an [`Error::Assertion`] carrying measured and expected values.

use std::time::{Duration, Instant};

use crate::capture::CapturedPacket;
use crate::common::{Error, Result};
use crate::sut::SutConfig;

use super::config::{Check, Scenario};

/// Outcome of feeding one packet to a verifier
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    NeedMore,
    /// The check passed; carries a short description of what was measured
    Done(String),
}

/// Symmetric tolerance band around an expected period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub fraction: f64,
}

impl Tolerance {
    /// Inclusive `(low, high)` bounds in milliseconds
    pub fn bounds(&self, period_ms: f64) -> (f64, f64) {
        let delta = period_ms * self.fraction;
        (period_ms - delta, period_ms + delta)
    }

    pub fn contains(&self, period_ms: f64, measured_ms: f64) -> bool {
        let (low, high) = self.bounds(period_ms);
        low <= measured_ms && measured_ms <= high
    }
}

/// Arithmetic mean of interval samples in milliseconds
pub fn mean_interval_ms(deltas: &[Duration]) -> Option<f64> {
    if deltas.is_empty() {
        return None;
    }
    let total: f64 = deltas.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
    Some(total / deltas.len() as f64)
}

#[derive(Debug)]
enum Policy {
    Size {
        expected: usize,
    },
    Content {
        expected: String,
    },
    Period {
        expected_len: usize,
        period_ms: u64,
        samples: usize,
        tolerance: Tolerance,
        last_arrival: Option<Instant>,
        deltas: Vec<Duration>,
    },
}

/// Incremental verifier for one scenario
#[derive(Debug)]
pub struct Verifier {
    policy: Policy,
    observed: usize,
}

impl Verifier {
    /// Build a verifier for a check against the parameters the SUT was given
    pub fn new(check: &Check, config: &SutConfig) -> Result<Self> {
        let policy = match check {
            Check::PayloadSize => {
                if config.payload_length == 0 {
                    return Err(Error::Scenario(
                        "payload_size check needs payload_length > 0".to_string(),
                    ));
                }
                Policy::Size {
                    expected: config.payload_length,
                }
            }
            Check::PayloadContent => {
                let expected = config.payload_text().ok_or_else(|| {
                    Error::Scenario("payload_content check needs a non-empty payload".to_string())
                })?;
                Policy::Content {
                    expected: expected.to_string(),
                }
            }
            Check::SendingPeriod { samples, tolerance } => {
                let expected_len = config.expected_datagram_len().ok_or_else(|| {
                    Error::Scenario(
                        "sending_period check needs payload_length or payload".to_string(),
                    )
                })?;
                if config.sending_period_ms == 0 || *samples == 0 {
                    return Err(Error::Scenario(
                        "sending_period check needs sending_period > 0 and samples >= 1"
                            .to_string(),
                    ));
                }
                Policy::Period {
                    expected_len,
                    period_ms: config.sending_period_ms,
                    samples: *samples,
                    tolerance: Tolerance {
                        fraction: *tolerance,
                    },
                    last_arrival: None,
                    deltas: Vec::with_capacity(*samples),
                }
            }
        };

        Ok(Self {
            policy,
            observed: 0,
        })
    }

    /// Build the verifier a scenario asks for
    pub fn for_scenario(scenario: &Scenario) -> Result<Self> {
        Self::new(&scenario.expect, &scenario.connection)
    }

    /// Number of packets observed so far
    pub fn observed(&self) -> usize {
        self.observed
    }

    /// Feed the next captured packet
    pub fn observe(&mut self, packet: &CapturedPacket) -> Result<Progress> {
        self.observed += 1;

        match &mut self.policy {
            // Empty datagrams carry nothing to judge; wait for the first real one
            Policy::Size { .. } | Policy::Content { .. } if packet.bytes.is_empty() => {
                Ok(Progress::NeedMore)
            }

            Policy::Size { expected } => {
                let received = packet.bytes.len();
                if received != *expected {
                    return Err(Error::Assertion(format!(
                        "Payload size different than expected! Received={}, Expected={}",
                        received, expected
                    )));
                }
                Ok(Progress::Done(format!("payload length {}", received)))
            }

            Policy::Content { expected } => match std::str::from_utf8(&packet.bytes) {
                Ok(text) if text == expected.as_str() => {
                    Ok(Progress::Done(format!("payload '{}'", text)))
                }
                Ok(text) => Err(Error::Assertion(format!(
                    "Received payload different than expected! Received='{}', Expected='{}'",
                    text, expected
                ))),
                Err(_) => Err(Error::Assertion(format!(
                    "Received payload is not valid UTF-8! Received='{}', Expected='{}'",
                    String::from_utf8_lossy(&packet.bytes),
                    expected
                ))),
            },

            Policy::Period {
                expected_len,
                period_ms,
                samples,
                tolerance,
                last_arrival,
                deltas,
            } => {
                let received = packet.bytes.len();
                if received != *expected_len {
                    return Err(Error::Assertion(format!(
                        "Payload size different than expected while timing! Received={}, Expected={}",
                        received, expected_len
                    )));
                }

                if let Some(previous) = last_arrival.replace(packet.received_at) {
                    deltas.push(packet.received_at.saturating_duration_since(previous));
                }
                if deltas.len() < *samples {
                    return Ok(Progress::NeedMore);
                }

                // deltas is non-empty here since samples >= 1
                let mean = mean_interval_ms(deltas).unwrap_or_default();
                let expected = *period_ms as f64;
                if !tolerance.contains(expected, mean) {
                    let (low, high) = tolerance.bounds(expected);
                    return Err(Error::Assertion(format!(
                        "Sending period out of tolerance! Measured={:.3}, Expected={} (allowed {:.3}..={:.3})",
                        mean, period_ms, low, high
                    )));
                }
                Ok(Progress::Done(format!(
                    "mean interval {:.3} ms over {} samples (expected {} ms)",
                    mean,
                    deltas.len(),
                    period_ms
                )))
            }
        }
    }
}
