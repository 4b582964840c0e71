//! Platform-specific settings locations
//!
//! Nothing here is consulted implicitly by the harness itself; the CLI uses
//! these to find a settings file when `--settings` is not given.

use std::path::PathBuf;

/// Application name used for platform directories
const APP_NAME: &str = "udp-harness";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/udp-harness/`
/// - macOS: `~/Library/Application Support/udp-harness/`
/// - Windows: `%APPDATA%\udp-harness\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the harness settings file
pub fn settings_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("settings.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_path_is_toml() {
        if let Some(path) = settings_path() {
            assert_eq!(path.extension().and_then(|e| e.to_str()), Some("toml"));
        }
    }
}
