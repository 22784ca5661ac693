//! # Stackd Configuration Validator
//!
//! Command-line tool for validating stackd configuration files across
//! environments before a coordinator is started against them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stackd_core::config::{ConfigManager, StackdConfig};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate stackd configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format (table, json, yaml)
    #[arg(long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the configuration, then print a summary
    Validate,

    /// Print the resolved configuration with sensitive values masked
    Show,

    /// Compare the resolved configuration of two environments
    Compare {
        /// Base environment for comparison
        #[arg(short, long, default_value = "development")]
        base: String,

        /// Target environment for comparison
        #[arg(short, long)]
        target: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::Validate) | None => validate(&cli),
        Some(Commands::Show) => show(&cli),
        Some(Commands::Compare { base, target }) => compare(&cli, base, target),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli, environment: &str) -> Result<Arc<ConfigManager>> {
    ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), environment)
        .with_context(|| format!("loading configuration for environment '{environment}'"))
}

fn validate(cli: &Cli) -> Result<()> {
    println!("🔧 Validating stackd configuration");
    println!("Environment: {}", cli.environment);
    if let Some(config_dir) = &cli.config_dir {
        println!("Config Directory: {}", config_dir.display());
    }
    println!();

    let manager = load(cli, &cli.environment)?;
    println!("✅ Configuration loaded and validated");
    print_summary(manager.config());
    Ok(())
}

fn show(cli: &Cli) -> Result<()> {
    let manager = load(cli, &cli.environment)?;
    let sanitized = manager.debug_config();
    match cli.format.as_str() {
        "yaml" => print!("{}", serde_yaml::to_string(&sanitized)?),
        "json" => println!("{}", serde_json::to_string_pretty(&sanitized)?),
        _ => print_summary(manager.config()),
    }
    Ok(())
}

fn compare(cli: &Cli, base: &str, target: &str) -> Result<()> {
    let base_config = load(cli, base)?.debug_config();
    let target_config = load(cli, target)?.debug_config();

    println!("🔍 Comparing {base} -> {target}");
    let mut differences = 0;
    diff("", &base_config, &target_config, &mut differences);
    if differences == 0 {
        println!("✅ No differences");
    } else {
        println!("{differences} difference(s)");
    }
    Ok(())
}

fn diff(path: &str, base: &serde_json::Value, target: &serde_json::Value, count: &mut usize) {
    match (base, target) {
        (serde_json::Value::Object(left), serde_json::Value::Object(right)) => {
            let keys: std::collections::BTreeSet<&String> = left.keys().chain(right.keys()).collect();
            for key in keys {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                let null = serde_json::Value::Null;
                diff(
                    &child,
                    left.get(key).unwrap_or(&null),
                    right.get(key).unwrap_or(&null),
                    count,
                );
            }
        }
        (left, right) if left != right => {
            *count += 1;
            println!("  {path}: {left} -> {right}");
        }
        _ => {}
    }
}

fn print_summary(config: &StackdConfig) {
    let orchestration = &config.orchestration;
    let polling = &config.polling;
    println!();
    println!("📋 Orchestration");
    println!("  default_max_attempts: {}", orchestration.default_max_attempts);
    println!("  parallel_launch:      {}", orchestration.parallel_launch);
    println!("  provision_on_launch:  {}", orchestration.provision_on_launch);
    println!("  stack_root:           {}", orchestration.stack_root.display());
    println!("  environment_root:     {}", orchestration.environment_root.display());
    println!("  pillar_env:           {}", orchestration.pillar_env);
    println!("⏱️ Polling");
    println!("  state wait:           every {:?}, up to {:?}", polling.state_wait_interval(), polling.state_wait_timeout());
    println!("  termination wait:     up to {:?}", polling.termination_wait_timeout());
    println!("  ping:                 every {:?}, {} failures tolerated", polling.ping_interval(), polling.ping_max_failures);
    println!("🗂️ Cache");
    println!("  max_capacity:         {}", config.cache.max_capacity);
    println!("  ttl:                  {:?}", config.cache.default_ttl());
    println!("📜 History");
    println!("  max_message_length:   {}", config.history.max_message_length);
}
