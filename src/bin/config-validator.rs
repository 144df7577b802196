//! # MPLP Configuration Validator
//!
//! Command-line tool that loads an MPLP configuration file with environment
//! overrides applied, validates it, and prints the effective configuration.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mplp_core::config::{ConfigManager, MplpConfig};
use mplp_core::orchestration::OrchestratorConfig;
use std::path::PathBuf;
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate MPLP configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (TOML or YAML). Defaults only when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate and print the effective configuration as JSON
    Validate,

    /// Print the built-in defaults as JSON
    Defaults,

    /// Show the default workflow's stages and the required modules
    Workflow,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::Validate) | None => validate(&cli),
        Some(Commands::Defaults) => print_json(&MplpConfig::default()),
        Some(Commands::Workflow) => show_workflow(&cli),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
        }
        Err(e) => {
            error!("Configuration validation failed: {e:#}");
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> Result<std::sync::Arc<ConfigManager>> {
    match &cli.config {
        Some(path) => ConfigManager::load(path)
            .with_context(|| format!("loading {}", path.display())),
        None => ConfigManager::load_defaults().context("loading defaults"),
    }
}

fn validate(cli: &Cli) -> Result<()> {
    let manager = load(cli)?;
    eprintln!(
        "✅ Configuration valid (environment: {}, source: {})",
        manager.environment(),
        manager
            .source_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "defaults".to_string())
    );
    print_json(manager.config())
}

fn show_workflow(cli: &Cli) -> Result<()> {
    let manager = load(cli)?;
    let orchestrator = &manager.config().orchestrator;
    let workflow = &orchestrator.default_workflow;

    println!("📋 Default workflow");
    println!("  mode:    {:?}", workflow.execution_mode);
    println!("  timeout: {}ms", workflow.timeout_ms);
    println!(
        "  retries: {} attempt(s), {}ms base delay",
        workflow.retry_policy.max_attempts, workflow.retry_policy.delay_ms
    );
    for (index, stage) in workflow.stages.iter().enumerate() {
        println!("  {}. {}", index + 1, stage);
    }

    if orchestrator.required_modules.is_empty() {
        println!("📦 Required modules: none");
    } else {
        println!("📦 Required modules: {}", orchestrator.required_modules.join(", "));
        let missing = stages_without_required_module(orchestrator);
        if !missing.is_empty() {
            println!("⚠️  Stages without a required module: {missing:?}");
        }
    }
    Ok(())
}

/// Default workflow stages not backed by a required module.
fn stages_without_required_module(orchestrator: &OrchestratorConfig) -> Vec<&str> {
    orchestrator
        .default_workflow
        .stages
        .iter()
        .filter(|stage| !orchestrator.required_modules.contains(stage))
        .map(String::as_str)
        .collect()
}

fn print_json(config: &MplpConfig) -> Result<()> {
    let rendered = serde_json::to_string_pretty(config).context("serializing configuration")?;
    println!("{rendered}");
    Ok(())
}
