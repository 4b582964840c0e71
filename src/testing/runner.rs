//! Scenario runner
//!
//! Per scenario: write the SUT config, bind the capture socket, start the
//! SUT, feed datagrams to the verifier, then tear everything down. Teardown
//! runs on every path out of the scenario, including verification failures
//! and harness errors.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::capture::{CaptureTarget, PacketCapture};
use crate::common::{Error, HarnessSettings, Result};
use crate::sut::{ConfigFile, SutProcess};

use super::config::Scenario;
use super::verifier::{Progress, Verifier};

/// Result of a scenario run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub passed: bool,
    /// What was measured, for a passing scenario
    pub detail: Option<String>,
    /// Why the scenario failed
    pub failure: Option<String>,
    pub packets_observed: usize,
    pub elapsed_ms: u64,
    /// Pid the SUT ran as, if it was started
    pub sut_pid: Option<u32>,
}

/// Everything a scenario holds while it runs
///
/// Fields are filled in acquisition order; [`ScenarioResources::teardown`]
/// releases whatever was acquired.
struct ScenarioResources {
    config: ConfigFile,
    capture: Option<PacketCapture>,
    process: Option<SutProcess>,
}

impl ScenarioResources {
    /// Stop the SUT, close the socket and delete the config file
    ///
    /// Every step is attempted even if an earlier one fails; the first error
    /// is returned.
    async fn teardown(mut self, stop_timeout: Duration) -> Result<()> {
        let mut first_error = None;

        if let Some(process) = self.process.take() {
            if let Err(e) = process.stop(stop_timeout).await {
                tracing::error!("Failed to stop SUT: {}", e);
                first_error.get_or_insert(e);
            }
        }

        if let Some(capture) = self.capture.as_mut() {
            capture.close();
        }

        if let Err(e) = self.config.remove() {
            tracing::error!("{}", e);
            first_error.get_or_insert(e);
        }

        first_error.map_or(Ok(()), Err)
    }
}

/// Runs scenarios against one SUT executable
#[derive(Debug)]
pub struct Harness {
    settings: HarnessSettings,
    sut: PathBuf,
}

impl Harness {
    /// Create a harness, resolving the SUT executable from the settings
    pub fn new(settings: HarnessSettings) -> Result<Self> {
        let sut = settings.resolve_sut()?;
        Ok(Self { settings, sut })
    }

    pub fn sut(&self) -> &Path {
        &self.sut
    }

    pub fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    /// Run one scenario
    ///
    /// Verification failures (wrong size, wrong content, period out of
    /// tolerance, no traffic) produce a failed report. Harness faults are
    /// returned as errors, after teardown.
    pub async fn run(&self, scenario: &Scenario) -> Result<ScenarioReport> {
        let target = scenario.validate()?;
        let mut verifier = Verifier::for_scenario(scenario)?;
        let started = Instant::now();

        tracing::info!(scenario = %scenario.name, "Running scenario");

        let config = ConfigFile::create(self.settings.config_file_path(), &scenario.connection)?;
        let mut resources = ScenarioResources {
            config,
            capture: None,
            process: None,
        };

        let outcome = self
            .drive(scenario, &target, &mut resources, &mut verifier)
            .await;
        let sut_pid = resources.process.as_ref().map(SutProcess::pid);
        let teardown = resources
            .teardown(self.settings.timeouts.stop_timeout())
            .await;

        let report = |passed: bool, detail: Option<String>, failure: Option<String>| {
            ScenarioReport {
                name: scenario.name.clone(),
                passed,
                detail,
                failure,
                packets_observed: verifier.observed(),
                elapsed_ms: started.elapsed().as_millis() as u64,
                sut_pid,
            }
        };

        match (outcome, teardown) {
            (Ok(detail), Ok(())) => {
                tracing::info!(scenario = %scenario.name, "Scenario passed: {}", detail);
                Ok(report(true, Some(detail), None))
            }
            (Err(e), Ok(())) if e.is_verification_failure() => {
                tracing::info!(scenario = %scenario.name, "Scenario failed: {}", e);
                Ok(report(false, None, Some(e.to_string())))
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(_), Err(teardown_err)) => Err(teardown_err),
            (Err(e), Err(teardown_err)) => {
                if e.is_verification_failure() {
                    tracing::warn!(scenario = %scenario.name, "Scenario failed: {}", e);
                    Err(teardown_err)
                } else {
                    tracing::warn!(
                        scenario = %scenario.name,
                        "Teardown also failed: {}",
                        teardown_err
                    );
                    Err(e)
                }
            }
        }
    }

    /// Bind the capture, start the SUT and verify until the check finishes
    async fn drive(
        &self,
        scenario: &Scenario,
        target: &CaptureTarget,
        resources: &mut ScenarioResources,
        verifier: &mut Verifier,
    ) -> Result<String> {
        // Bound before the SUT exists, so its first datagram cannot be missed
        let capture = resources
            .capture
            .insert(PacketCapture::open_target(target)?);
        let process = resources
            .process
            .insert(SutProcess::start(&self.sut, resources.config.path())?);

        let max_size = self.settings.capture.max_datagram_bytes;
        let timeout = scenario
            .receive_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.settings.timeouts.receive_timeout());

        loop {
            let Some(packet) = capture.recv_timeout(max_size, timeout).await? else {
                if !process.is_running() {
                    return Err(Error::Assertion(format!(
                        "SUT exited before sending (no datagram within {} ms)",
                        timeout.as_millis()
                    )));
                }
                return Err(Error::NoPacket(timeout.as_millis() as u64));
            };

            if let Progress::Done(detail) = verifier.observe(&packet)? {
                return Ok(detail);
            }
        }
    }

    /// Run scenarios in order, stopping at the first harness error
    pub async fn run_all(&self, scenarios: &[Scenario]) -> Result<Vec<ScenarioReport>> {
        let mut reports = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            reports.push(self.run(scenario).await?);
        }
        Ok(reports)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::sut::SutConfig;
    use crate::testing::config::Check;

    fn settings(dir: &Path, sut: &str) -> HarnessSettings {
        HarnessSettings {
            sut_path: Some(PathBuf::from(sut)),
            work_dir: dir.to_path_buf(),
            ..HarnessSettings::default()
        }
    }

    fn silent_scenario(port: u16) -> Scenario {
        Scenario {
            name: "silent".to_string(),
            description: None,
            connection: SutConfig {
                payload_length: 16,
                destination_ip: "127.0.0.1".to_string(),
                destination_port: port,
                sending_period_ms: 10,
                ..SutConfig::default()
            },
            expect: Check::PayloadSize,
            receive_timeout_ms: Some(100),
        }
    }

    /// A SUT that stays alive without sending anything
    fn silent_sut(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("silent_sut.sh");
        std::fs::write(&path, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn free_port() -> u16 {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_silent_sut_fails_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let sut = silent_sut(dir.path());
        let harness = Harness::new(settings(dir.path(), sut.to_str().unwrap())).unwrap();
        let report = harness.run(&silent_scenario(free_port())).await.unwrap();

        assert!(!report.passed);
        assert_eq!(report.packets_observed, 0);
        assert!(report.failure.unwrap().contains("No datagram"));
        assert!(!harness.settings().config_file_path().exists());
    }

    #[tokio::test]
    async fn test_teardown_error_replaces_verification_failure() {
        let dir = tempfile::tempdir().unwrap();
        let sut = silent_sut(dir.path());
        let mut settings = settings(dir.path(), sut.to_str().unwrap());
        settings.timeouts.stop_timeout_ms = 0;
        let harness = Harness::new(settings).unwrap();

        // No datagram arrives (a verification failure), then the stop
        // cannot be confirmed in time
        let err = harness.run(&silent_scenario(free_port())).await.unwrap_err();
        assert!(matches!(err, Error::SutTerminationTimeout { .. }));
        // Later teardown steps still ran
        assert!(!harness.settings().config_file_path().exists());
    }

    #[tokio::test]
    async fn test_sut_that_exits_early_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::new(settings(dir.path(), "true")).unwrap();
        let mut scenario = silent_scenario(free_port());
        scenario.receive_timeout_ms = Some(500);
        let report = harness.run(&scenario).await.unwrap();

        assert!(!report.passed);
        assert!(report.failure.unwrap().contains("exited before sending"));
        assert!(!harness.settings().config_file_path().exists());
    }

    #[tokio::test]
    async fn test_launch_failure_is_error_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let harness =
            Harness::new(settings(dir.path(), "/nonexistent/udptestutility")).unwrap();
        let err = harness.run(&silent_scenario(free_port())).await.unwrap_err();

        assert!(matches!(err, Error::SutLaunch { .. }));
        assert!(!harness.settings().config_file_path().exists());
    }

    #[tokio::test]
    async fn test_invalid_scenario_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::new(settings(dir.path(), "sleep")).unwrap();
        let mut scenario = silent_scenario(free_port());
        scenario.connection.payload_length = 0;

        let err = harness.run(&scenario).await.unwrap_err();
        assert!(matches!(err, Error::Scenario(_)));
        assert!(!harness.settings().config_file_path().exists());
    }

    #[tokio::test]
    async fn test_bind_failure_is_error_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::new(settings(dir.path(), "sleep")).unwrap();
        let taken = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = harness.run(&silent_scenario(port)).await.unwrap_err();
        assert!(matches!(err, Error::CaptureBind { .. }));
        assert!(!harness.settings().config_file_path().exists());
    }
}
