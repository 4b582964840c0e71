//! CLI command handling
//!
//! Dispatches CLI commands to the harness and formats output.

use colored::Colorize;

use crate::commands::{Commands, HarnessArgs};
use crate::common::{HarnessSettings, Result};
use crate::sut::SutConfig;
use crate::testing::{builtin_scenarios, Harness, Scenario, ScenarioReport};

/// Dispatch a CLI command
///
/// Returns `Ok(false)` when every scenario ran but at least one failed.
pub async fn dispatch(command: Commands, args: HarnessArgs) -> Result<bool> {
    match command {
        Commands::Run { paths, json, .. } => {
            // Parse everything up front so a typo in the last file doesn't
            // surface after the first scenarios already ran
            let scenarios = paths
                .iter()
                .map(|p| Scenario::load(p))
                .collect::<Result<Vec<_>>>()?;
            run_scenarios(&args, &scenarios, json).await
        }

        Commands::Builtin { json, .. } => run_scenarios(&args, &builtin_scenarios(), json).await,

        Commands::WriteConfig {
            path,
            payload_length,
            payload,
            destination_ip,
            destination_port,
            sending_period,
        } => {
            let config = SutConfig {
                payload_length,
                payload,
                destination_ip,
                destination_port,
                sending_period_ms: sending_period,
            };
            config.write(&path)?;
            println!("Wrote {}", path.display());
            Ok(true)
        }
    }
}

/// Build settings from the settings file and CLI overrides
fn load_settings(args: &HarnessArgs) -> Result<HarnessSettings> {
    let mut settings = HarnessSettings::load(args.settings.as_deref())?;
    if let Some(sut) = &args.sut {
        settings.sut_path = Some(sut.clone());
    }
    if let Some(work_dir) = &args.work_dir {
        settings.work_dir = work_dir.clone();
    }
    Ok(settings)
}

async fn run_scenarios(args: &HarnessArgs, scenarios: &[Scenario], json: bool) -> Result<bool> {
    let harness = Harness::new(load_settings(args)?)?;
    tracing::debug!(sut = %harness.sut().display(), "Using SUT");

    let mut reports = Vec::with_capacity(scenarios.len());
    for scenario in scenarios {
        if !json {
            print_header(scenario);
        }
        let report = harness.run(scenario).await?;
        if !json {
            print_report(&report);
        }
        reports.push(report);
    }

    let all_passed = reports.iter().all(|r| r.passed);
    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_summary(&reports);
    }
    Ok(all_passed)
}

fn print_header(scenario: &Scenario) {
    println!(
        "\n{} {}",
        "Running Test:".blue().bold(),
        scenario.name.white().bold()
    );
    if let Some(desc) = &scenario.description {
        println!("  {}", desc.dimmed());
    }
}

fn print_report(report: &ScenarioReport) {
    if report.passed {
        println!(
            "  {} {} ({} ms)",
            "✓".green(),
            report.detail.as_deref().unwrap_or("passed").dimmed(),
            report.elapsed_ms
        );
    } else {
        println!(
            "  {} {}",
            "✗".red(),
            report.failure.as_deref().unwrap_or("failed")
        );
    }
}

fn print_summary(reports: &[ScenarioReport]) {
    let passed = reports.iter().filter(|r| r.passed).count();
    let line = format!("{}/{} scenarios passed", passed, reports.len());
    if passed == reports.len() {
        println!("\n{} {}\n", "✓".green().bold(), line.green().bold());
    } else {
        println!("\n{} {}\n", "✗".red().bold(), line.red().bold());
    }
}
