//! The system under test: its config files and its process

pub mod config;
pub mod process;

pub use config::{parse_connections, ConfigFile, ParsedConfig, ParsedConnection, SutConfig};
pub use process::SutProcess;
