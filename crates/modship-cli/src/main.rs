//! Modship - gated module updates
//!
//! Usage:
//!   modship update <module> <version> [--approve]
//!   modship batch <module@version>... [--approve] [--stop-on-error]
//!   modship evaluate [module]
//!   modship classify <current> <target>
//!   modship init [--module <path>]... [--force]

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modship_core::batch::{BatchItemStatus, BatchResult, BatchScheduler};
use modship_core::config::{ConfigStore, ModshipConfig};
use modship_core::context::AppContext;
use modship_core::quality::QualityReport;
use modship_core::types::ModuleId;
use modship_core::update::{OutcomeKind, UpdateOutcome, UpdateRequest, UpdateStatus};
use modship_core::version::classify;

#[derive(Parser)]
#[command(name = "modship")]
#[command(about = "Gated, reversible updates of versioned modules", long_about = None)]
struct Cli {
    /// Root of the parent repository
    #[arg(long, short = 'C', global = true, default_value = ".")]
    root: PathBuf,

    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Move one module to a target version
    Update {
        /// Module path relative to the repository root
        module: String,
        /// Tag, branch or commit to move to
        version: String,
        /// Approve minor and major updates
        #[arg(long)]
        approve: bool,
    },

    /// Update several modules, lowest risk first
    Batch {
        /// Requests as <module>@<version>
        #[arg(required = true)]
        requests: Vec<String>,
        /// Approve minor and major updates
        #[arg(long)]
        approve: bool,
        /// Skip the remaining updates after the first failure
        #[arg(long)]
        stop_on_error: bool,
    },

    /// Run the quality gates against modules as checked out
    Evaluate {
        /// Module path relative to the repository root; every module in
        /// `[modules] paths` when omitted
        module: Option<String>,
    },

    /// Write a modship.toml with default settings
    Init {
        /// Module path to record under `[modules] paths`
        #[arg(long = "module", short = 'm')]
        modules: Vec<String>,
        /// Replace an existing modship.toml
        #[arg(long)]
        force: bool,
    },

    /// Classify a version change as patch, minor or major
    Classify { current: String, target: String },
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "modship=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    std::process::exit(run(Cli::parse()));
}

fn run(cli: Cli) -> i32 {
    match run_cli(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", style("error:").red().bold(), err);
            // Errors surface before any repository is touched.
            OutcomeKind::ValidationFailed.exit_code()
        }
    }
}

fn run_cli(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Update {
            module,
            version,
            approve,
        } => run_update(&cli.root, &module, &version, approve, cli.format),
        Commands::Batch {
            requests,
            approve,
            stop_on_error,
        } => run_batch(&cli.root, requests, approve, stop_on_error, cli.format),
        Commands::Evaluate { module } => run_evaluate(&cli.root, module.as_deref(), cli.format),
        Commands::Init { modules, force } => {
            run_init(&cli.root, modules, force)?;
            Ok(0)
        }
        Commands::Classify { current, target } => {
            run_classify(&current, &target, cli.format)?;
            Ok(0)
        }
    }
}

fn run_update(
    root: &Path,
    module: &str,
    version: &str,
    approve: bool,
    format: OutputFormat,
) -> Result<i32> {
    let request = UpdateRequest::new(module, version, approve)?;
    let ctx = AppContext::from_root(root)?;
    let mut machine = ctx.state_machine()?;

    let outcome = machine.update(request);
    report_output(print_outcome(&outcome, format));
    Ok(outcome.kind().exit_code())
}

fn run_batch(
    root: &Path,
    requests: Vec<String>,
    approve: bool,
    stop_on_error: bool,
    format: OutputFormat,
) -> Result<i32> {
    let requests = requests
        .iter()
        .map(|r| UpdateRequest::parse(r, approve))
        .collect::<Result<Vec<_>, _>>()?;

    let ctx = AppContext::from_root(root)?;
    let options = ctx.batch_options(stop_on_error);
    let mut machine = ctx.state_machine()?;

    let result = BatchScheduler::new(&mut machine).run(requests, options);
    report_output(print_batch(&result, format));
    Ok(result.exit_code())
}

fn run_evaluate(root: &Path, module: Option<&str>, format: OutputFormat) -> Result<i32> {
    let ctx = AppContext::from_root(root)?;
    let modules = ctx.modules(module)?;
    let machine = ctx.state_machine()?;

    let mut reports = Vec::with_capacity(modules.len());
    for module in modules {
        let report = machine.evaluate(&module)?;
        reports.push((module, report));
    }
    print_reports(&reports, format)?;

    let deployable = reports.iter().all(|(_, report)| report.can_deploy);
    Ok(if deployable { 0 } else { 1 })
}

fn run_init(root: &Path, modules: Vec<String>, force: bool) -> Result<()> {
    let mut config = ModshipConfig::new();
    config.modules.paths = modules;

    let store = ConfigStore::for_repo(root);
    store.init(&config, force)?;
    println!(
        "{} Wrote {}",
        style("✓").green(),
        store.repo_path().display()
    );
    Ok(())
}

/// The outcome is already decided; a broken stdout must not change the exit
/// code.
fn report_output(result: Result<()>) {
    if let Err(err) = result {
        tracing::error!(error = %err, "failed to write output");
    }
}

fn run_classify(current: &str, target: &str, format: OutputFormat) -> Result<()> {
    let update_type = classify(current, target);
    let strategy = update_type.strategy();

    match format {
        OutputFormat::Table => {
            println!("{current} -> {target}: {}", style(update_type).bold());
            println!("  Risk:               {}", strategy.risk_level);
            println!("  Requires approval:  {}", yes_no(strategy.requires_approval));
            println!(
                "  Compatibility test: {}",
                yes_no(strategy.requires_compatibility_test)
            );
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "current": current,
                "target": target,
                "update_type": update_type,
                "strategy": strategy,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_outcome(outcome: &UpdateOutcome, format: OutputFormat) -> Result<()> {
    let ctx = &outcome.context;
    match format {
        OutputFormat::Table => {
            match &outcome.status {
                UpdateStatus::Success { commit } => println!(
                    "{} Updated '{}' to {} ({})",
                    style("✓").green(),
                    ctx.module,
                    ctx.target_version,
                    commit.short()
                ),
                UpdateStatus::Rejected { .. } => println!(
                    "{} {}",
                    style("•").yellow(),
                    outcome.reason().unwrap_or_default()
                ),
                UpdateStatus::Fatal { .. } => println!(
                    "{} {}",
                    style("✗").red().bold(),
                    outcome.reason().unwrap_or_default()
                ),
                _ => println!(
                    "{} {}",
                    style("✗").red(),
                    outcome.reason().unwrap_or_default()
                ),
            }
            if let Some(update_type) = ctx.update_type {
                println!("  Update type: {update_type}");
            }
            if let Some(report) = &ctx.post_validation {
                println!("  Quality score: {:.1}", report.overall_score);
                for warning in &report.warnings {
                    println!("  ⚠ {warning}");
                }
            }
            let path: Vec<String> = ctx.path().iter().map(|s| s.to_string()).collect();
            println!("  States: {}", path.join(" -> "));
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "outcome": outcome.kind(),
                "reason": outcome.reason(),
                "context": ctx,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_batch(result: &BatchResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!(
                "{:<30} {:<14} {:<7} {:<8} Result",
                "Module", "Target", "Type", "Risk"
            );
            println!("{}", "-".repeat(80));
            for item in &result.items {
                let status = match &item.status {
                    BatchItemStatus::Succeeded { commit } => {
                        style(format!("✓ {}", commit.short())).green().to_string()
                    }
                    BatchItemStatus::Failed { kind, reason } => {
                        style(format!("✗ {kind}: {reason}")).red().to_string()
                    }
                    BatchItemStatus::Skipped { reason } => {
                        style(format!("- skipped: {reason}")).dim().to_string()
                    }
                };
                println!(
                    "{:<30} {:<14} {:<7} {:<8} {}",
                    item.module.as_str(),
                    item.target_version,
                    item.update_type.as_str(),
                    item.risk.to_string(),
                    status
                );
            }
            println!();
            println!(
                "{} succeeded, {} failed, {} skipped",
                result.successes().count(),
                result.failures().count(),
                result.skipped().count()
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
    }
    Ok(())
}

fn print_reports(reports: &[(ModuleId, QualityReport)], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            for (i, (module, report)) in reports.iter().enumerate() {
                if i > 0 {
                    println!();
                }
                print_report_table(module, report);
            }
        }
        OutputFormat::Json => {
            let output: serde_json::Map<String, serde_json::Value> = reports
                .iter()
                .map(|(module, report)| Ok((module.to_string(), serde_json::to_value(report)?)))
                .collect::<Result<_>>()?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_report_table(module: &ModuleId, report: &QualityReport) {
    println!("{:<12} {:>6} {:>8} Status", "Gate", "Score", "Weight");
    println!("{}", "-".repeat(40));
    for (gate, result) in &report.gate_results {
        let status = if result.passed {
            style("pass").green()
        } else if gate.is_critical() {
            style("FAIL").red().bold()
        } else {
            style("fail").yellow()
        };
        println!(
            "{:<12} {:>6.1} {:>8} {}",
            gate.name(),
            result.score,
            gate.weight(),
            status
        );
    }
    println!();
    let verdict = if report.can_deploy {
        style("deployable").green()
    } else {
        style("not deployable").red()
    };
    println!(
        "'{}': overall {:.1}/100, {}",
        module, report.overall_score, verdict
    );
    for failure in &report.critical_failures {
        println!("  ✗ {failure}");
    }
    for warning in &report.warnings {
        println!("  ⚠ {warning}");
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn run_args(args: &[&str]) -> i32 {
        run(Cli::parse_from(std::iter::once("modship").chain(args.iter().copied())))
    }

    fn git_root() -> TempDir {
        let temp = TempDir::new().unwrap();
        git2::Repository::init(temp.path()).unwrap();
        temp
    }

    #[test]
    fn malformed_requests_exit_as_validation_failures() {
        let temp = git_root();
        let root = temp.path().to_str().unwrap();

        assert_eq!(run_args(&["-C", root, "update", "../escape", "v1.0.0"]), 3);
        assert_eq!(run_args(&["-C", root, "update", "services/auth", " "]), 3);
        assert_eq!(run_args(&["-C", root, "batch", "services/auth"]), 3);
    }

    #[test]
    fn evaluate_of_missing_module_exits_as_validation_failure() {
        let temp = git_root();
        let root = temp.path().to_str().unwrap();

        assert_eq!(run_args(&["-C", root, "evaluate", "services/missing"]), 3);
        // no module given and none configured
        assert_eq!(run_args(&["-C", root, "evaluate"]), 3);
    }

    #[test]
    fn update_outside_a_repository_is_not_fatal() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_str().unwrap();
        assert_eq!(run_args(&["-C", root, "update", "services/auth", "v1.0.0"]), 3);
    }

    #[test]
    fn init_records_modules_for_evaluate() {
        let temp = git_root();
        let root = temp.path().to_str().unwrap();

        assert_eq!(run_args(&["-C", root, "init", "-m", "services/auth"]), 0);
        let config = ConfigStore::from_paths(None, temp.path()).load().unwrap();
        assert_eq!(config.modules.paths, vec!["services/auth".to_string()]);

        assert_eq!(run_args(&["-C", root, "init"]), 3);
        // the configured module is evaluated, and it does not exist
        assert_eq!(run_args(&["-C", root, "evaluate"]), 3);
    }

    #[test]
    fn classify_always_succeeds() {
        assert_eq!(run_args(&["classify", "1.2.3", "v2.0.0"]), 0);
        assert_eq!(run_args(&["-f", "json", "classify", "garbage", "1.0.0"]), 0);
    }
}
