//! UDP Harness - black-box conformance testing for UDP senders
//!
//! Runs a sender under test against scenarios and checks the datagrams it
//! emits.

use clap::Parser;
use commands::{Commands, HarnessArgs};
use udp_harness::{cli, commands, common::logging};

#[derive(Parser)]
#[command(name = "udp-harness", about = "Conformance harness for UDP senders")]
#[command(version, long_about = None)]
struct Cli {
    #[command(flatten)]
    harness: HarnessArgs,

    #[command(subcommand)]
    command: Commands,
}

// Scenarios run strictly one after another
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli(cli.command.verbose());

    match cli::dispatch(cli.command, cli.harness).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    }
}
