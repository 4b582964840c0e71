//! Harness settings file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::settings_path;
use super::{Error, Result};

/// Harness settings, passed explicitly to [`crate::testing::Harness::new`]
#[derive(Debug, Deserialize, Clone)]
pub struct HarnessSettings {
    /// Path (or bare name on PATH) of the SUT executable
    #[serde(default)]
    pub sut_path: Option<PathBuf>,

    /// Directory the per-scenario SUT config file is written to
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// File name of the SUT config inside `work_dir`
    #[serde(default = "default_config_file_name")]
    pub config_file_name: String,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Capture socket settings
    #[serde(default)]
    pub capture: CaptureSettings,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            sut_path: None,
            work_dir: default_work_dir(),
            config_file_name: default_config_file_name(),
            timeouts: Timeouts::default(),
            capture: CaptureSettings::default(),
        }
    }
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("udp-harness")
}

fn default_config_file_name() -> String {
    "test_config.ini".to_string()
}

/// Timeout settings in milliseconds
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Bound on waiting for the SUT to exit after it was killed
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_ms: u64,

    /// Bound on waiting for each datagram
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            stop_timeout_ms: default_stop_timeout(),
            receive_timeout_ms: default_receive_timeout(),
        }
    }
}

impl Timeouts {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

fn default_stop_timeout() -> u64 {
    1000
}
fn default_receive_timeout() -> u64 {
    5000
}

/// Capture socket settings
#[derive(Debug, Deserialize, Clone)]
pub struct CaptureSettings {
    /// Receive buffer size; datagrams longer than this are truncated
    #[serde(default = "default_max_datagram")]
    pub max_datagram_bytes: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_datagram_bytes: default_max_datagram(),
        }
    }
}

fn default_max_datagram() -> usize {
    65_535
}

impl HarnessSettings {
    /// Load settings from an explicit file, or from the default settings file
    ///
    /// Returns default settings if no explicit path is given and the default
    /// file doesn't exist
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = settings_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Full path of the SUT config file scenarios write to
    pub fn config_file_path(&self) -> PathBuf {
        self.work_dir.join(&self.config_file_name)
    }

    /// Resolve the SUT executable
    ///
    /// Paths with a directory component are used as-is; bare names are
    /// searched on PATH
    pub fn resolve_sut(&self) -> Result<PathBuf> {
        let sut = self
            .sut_path
            .as_ref()
            .ok_or_else(|| Error::SutNotFound("<unset>".to_string()))?;

        if sut.components().count() > 1 || sut.is_absolute() {
            return Ok(sut.clone());
        }

        which::which(sut).map_err(|_| Error::SutNotFound(sut.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_original_harness() {
        let settings = HarnessSettings::default();
        assert_eq!(settings.timeouts.stop_timeout_ms, 1000);
        assert_eq!(settings.config_file_name, "test_config.ini");
        assert!(settings.config_file_path().ends_with("test_config.ini"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = HarnessSettings::from_toml(
            r#"
sut_path = "/opt/sut/udptestutility"

[timeouts]
receive_timeout_ms = 250
"#,
        )
        .unwrap();

        assert_eq!(
            settings.sut_path,
            Some(PathBuf::from("/opt/sut/udptestutility"))
        );
        assert_eq!(settings.timeouts.receive_timeout(), Duration::from_millis(250));
        assert_eq!(settings.timeouts.stop_timeout_ms, 1000);
        assert_eq!(settings.capture.max_datagram_bytes, 65_535);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let err = HarnessSettings::from_toml("timeouts = 3").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_resolve_sut_keeps_explicit_paths() {
        let settings = HarnessSettings {
            sut_path: Some(PathBuf::from("./build/udptestutility")),
            ..HarnessSettings::default()
        };
        assert_eq!(
            settings.resolve_sut().unwrap(),
            PathBuf::from("./build/udptestutility")
        );
    }

    #[test]
    fn test_resolve_sut_unset_or_missing() {
        let settings = HarnessSettings::default();
        assert!(matches!(settings.resolve_sut(), Err(Error::SutNotFound(_))));

        let settings = HarnessSettings {
            sut_path: Some(PathBuf::from("definitely-not-a-real-sut-binary")),
            ..HarnessSettings::default()
        };
        assert!(matches!(settings.resolve_sut(), Err(Error::SutNotFound(_))));
    }
}
