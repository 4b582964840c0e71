//! SUT process supervision
//!
//! The SUT is started with its config path as the only argument and all of
//! its standard streams discarded; captured traffic is the only thing the
//! harness observes. Stopping always kills, it never asks nicely.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::common::{Error, Result};

/// A running SUT
///
/// [`SutProcess::stop`] consumes the handle, so a process is stopped at most
/// once. A handle dropped without being stopped is killed best-effort.
#[derive(Debug)]
pub struct SutProcess {
    child: Child,
    pid: u32,
}

impl SutProcess {
    /// Spawn `<executable> <config_path>`
    pub fn start(executable: &Path, config_path: &Path) -> Result<Self> {
        let child = Command::new(executable)
            .arg(config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::sut_launch(executable, e))?;

        // id() is only None once the child has been reaped
        let pid = child.id().unwrap_or_default();
        tracing::debug!(pid, executable = %executable.display(), "Started SUT");

        Ok(Self { child, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Check whether the process is still running
    pub fn is_running(&mut self) -> bool {
        self.child.try_wait().ok().flatten().is_none()
    }

    /// Kill the process and wait for it to exit, bounded by `timeout`
    ///
    /// A SUT that already exited on its own is just reaped.
    pub async fn stop(mut self, timeout: Duration) -> Result<ExitStatus> {
        if let Some(status) = self.child.try_wait()? {
            tracing::debug!(pid = self.pid, %status, "SUT had already exited");
            return Ok(status);
        }

        self.child.start_kill()?;

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                tracing::debug!(pid = self.pid, %status, "SUT stopped");
                Ok(status)
            }
            Err(_) => Err(Error::SutTerminationTimeout {
                pid: self.pid,
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

impl Drop for SutProcess {
    fn drop(&mut self) {
        // Best-effort since we can't await in drop
        let _ = self.child.start_kill();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_kills_long_running_process() {
        // `sleep` takes the config path as its duration argument here
        let mut proc = SutProcess::start(Path::new("sleep"), Path::new("30")).unwrap();
        assert!(proc.is_running());
        assert!(proc.pid() > 0);

        let status = proc.stop(Duration::from_secs(1)).await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_stop_reaps_already_exited_process() {
        let mut proc = SutProcess::start(Path::new("true"), Path::new("ignored")).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!proc.is_running());

        let status = proc.stop(Duration::from_secs(1)).await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_stop_reports_exit_not_seen_within_timeout() {
        let proc = SutProcess::start(Path::new("sleep"), Path::new("30")).unwrap();
        let pid = proc.pid();

        // SIGKILL is sent, but the exit cannot be observed in zero time
        let err = proc.stop(Duration::ZERO).await.unwrap_err();
        assert!(matches!(
            err,
            Error::SutTerminationTimeout { pid: p, timeout_ms: 0 } if p == pid
        ));
    }

    #[tokio::test]
    async fn test_start_missing_executable_is_launch_error() {
        let err = SutProcess::start(
            Path::new("/nonexistent/udptestutility"),
            Path::new("test_config.ini"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::SutLaunch { .. }));
    }
}
