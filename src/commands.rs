//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Options shared by every command that runs scenarios
#[derive(Args, Debug, Clone)]
pub struct HarnessArgs {
    /// SUT executable (overrides sut_path from the settings file)
    #[arg(long, global = true)]
    pub sut: Option<PathBuf>,

    /// Harness settings file (TOML)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Directory for the per-scenario SUT config file
    #[arg(long, global = true)]
    pub work_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run scenarios defined in YAML files, in order
    Run {
        /// Paths to YAML scenario files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Show lifecycle logging
        #[arg(long, short)]
        verbose: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the built-in reference scenarios (size, content, multicast period)
    Builtin {
        /// Show lifecycle logging
        #[arg(long, short)]
        verbose: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a SUT config file without running anything
    WriteConfig {
        /// Where to write the config
        path: PathBuf,

        /// Payload length in bytes (omitted when 0)
        #[arg(long, default_value_t = 0)]
        payload_length: usize,

        /// Payload text (omitted when empty)
        #[arg(long)]
        payload: Option<String>,

        /// Destination IP, unicast or multicast (omitted when empty)
        #[arg(long, default_value = "")]
        destination_ip: String,

        /// Destination port (omitted when 0)
        #[arg(long, default_value_t = 0)]
        destination_port: u16,

        /// Sending period in milliseconds (omitted when 0)
        #[arg(long, default_value_t = 0)]
        sending_period: u64,
    },
}

impl Commands {
    pub fn verbose(&self) -> bool {
        match self {
            Commands::Run { verbose, .. } | Commands::Builtin { verbose, .. } => *verbose,
            Commands::WriteConfig { .. } => false,
        }
    }
}
