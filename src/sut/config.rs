//! SUT configuration files
//!
//! The SUT reads an INI-like file with one `[Connection]` section per
//! sender. The harness only ever writes a single section and leaves every
//! unset field out so the SUT falls back to its own default.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};

/// Section header the SUT looks for
pub const SECTION_HEADER: &str = "[Connection]";

/// Comment line written under the header
const NAME_COMMENT: &str = "#name=test_connection";

/// Parameters of one SUT connection
///
/// Zero or empty fields mean "omitted".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SutConfig {
    #[serde(default)]
    pub payload_length: usize,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub destination_ip: String,
    #[serde(default)]
    pub destination_port: u16,
    #[serde(default, rename = "sending_period")]
    pub sending_period_ms: u64,
}

impl SutConfig {
    /// The payload text, if one is meaningfully set
    pub fn payload_text(&self) -> Option<&str> {
        self.payload.as_deref().filter(|p| !p.is_empty())
    }

    /// Size the SUT's datagrams should have
    ///
    /// An explicit `payload_length` wins; otherwise the payload's byte length.
    pub fn expected_datagram_len(&self) -> Option<usize> {
        if self.payload_length > 0 {
            Some(self.payload_length)
        } else {
            self.payload_text().map(str::len)
        }
    }

    /// Render the config file contents
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(SECTION_HEADER);
        out.push('\n');
        out.push_str(NAME_COMMENT);
        out.push('\n');

        // Writing to a String cannot fail
        if self.payload_length > 0 {
            let _ = writeln!(out, "payload_length={}", self.payload_length);
        }
        if let Some(payload) = self.payload_text() {
            let _ = writeln!(out, "payload={}", payload);
        }
        if !self.destination_ip.is_empty() {
            let _ = writeln!(out, "destination_ip={}", self.destination_ip);
        }
        if self.destination_port > 0 {
            let _ = writeln!(out, "destination_port={}", self.destination_port);
        }
        if self.sending_period_ms > 0 {
            let _ = writeln!(out, "sending_period={}", self.sending_period_ms);
        }
        out
    }

    /// Write the config to `path`, replacing any existing file
    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.render()).map_err(|e| Error::config_write(path, e))?;
        tracing::debug!(path = %path.display(), "Wrote SUT config");
        Ok(())
    }
}

/// A connection read back from a config file
///
/// Values are kept as text; the reader does not validate them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedConnection {
    pub payload_length: Option<String>,
    pub payload: Option<String>,
    pub destination_ip: Option<String>,
    pub destination_port: Option<String>,
    pub sending_period: Option<String>,
}

/// Result of reading a config file
#[derive(Debug, Default)]
pub struct ParsedConfig {
    pub connections: Vec<ParsedConnection>,
    /// Lines that were skipped (unknown keys, keys outside a section, lines
    /// without `=`)
    pub warnings: Vec<String>,
}

/// Parse config file text the way the SUT does
pub fn parse_connections(text: &str) -> ParsedConfig {
    let mut parsed = ParsedConfig::default();
    let mut current: Option<ParsedConnection> = None;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }

        if raw.trim() == SECTION_HEADER {
            if let Some(done) = current.replace(ParsedConnection::default()) {
                parsed.connections.push(done);
            }
            continue;
        }

        let Some((key, value)) = split_key_value(raw) else {
            parsed
                .warnings
                .push(format!("line {}: expected key=value, got '{}'", line_no, raw));
            continue;
        };

        let Some(conn) = current.as_mut() else {
            parsed.warnings.push(format!(
                "line {}: '{}' appears before any {} section",
                line_no, key, SECTION_HEADER
            ));
            continue;
        };

        let slot = match key {
            "payload_length" => &mut conn.payload_length,
            "payload" => &mut conn.payload,
            "destination_ip" => &mut conn.destination_ip,
            "destination_port" => &mut conn.destination_port,
            "sending_period" | "sending_rate" => &mut conn.sending_period,
            _ => {
                parsed
                    .warnings
                    .push(format!("line {}: unknown parameter '{}'", line_no, key));
                continue;
            }
        };
        *slot = Some(value.to_string());
    }

    if let Some(done) = current {
        parsed.connections.push(done);
    }
    parsed
}

/// Split `key = value # comment` into trimmed key and value
fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    Some((strip_comment(key), strip_comment(value)))
}

fn strip_comment(s: &str) -> &str {
    let s = match s.find('#') {
        Some(pos) => &s[..pos],
        None => s,
    };
    s.trim()
}

/// A SUT config file owned by one scenario
///
/// `remove` deletes it and reports failures; dropping a guard that was never
/// removed deletes the file best-effort.
#[derive(Debug)]
pub struct ConfigFile {
    path: PathBuf,
    removed: bool,
}

impl ConfigFile {
    /// Write `config` to `path` and take ownership of the file
    pub fn create(path: impl Into<PathBuf>, config: &SutConfig) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::config_write(&path, e))?;
        }
        config.write(&path)?;
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file; a file that is already gone counts as removed
    pub fn remove(&mut self) -> Result<()> {
        if self.removed {
            return Ok(());
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::config_remove(&self.path, e)),
        }
        self.removed = true;
        tracing::debug!(path = %self.path.display(), "Removed SUT config");
        Ok(())
    }
}

impl Drop for ConfigFile {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
