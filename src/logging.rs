//! # Structured Logging Module
//!
//! Environment-aware structured logging to the console and, optionally, a JSON
//! file for following long-running workflow chains after the fact.

use chrono::Utc;
use std::io::IsTerminal;
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{ConfigManager, LoggingConfig};
use crate::models::EntityKey;

static LOGGER_INITIALIZED: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Initialize structured logging with the default logging section
pub fn init_structured_logging() {
    init_structured_logging_with(&LoggingConfig::default());
}

/// Initialize structured logging once per process.
///
/// A subscriber installed elsewhere first is left in place.
pub fn init_structured_logging_with(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = ConfigManager::detect_environment();
        let log_level = get_log_level(&environment);
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(std::io::stdout().is_terminal())
            .with_filter(env_filter(&log_level));

        let mut guard = None;
        let file_layer = if config.file_output {
            match std::fs::create_dir_all(&config.log_directory) {
                Ok(()) => {
                    let log_filename = format!(
                        "{}.{}.{}.log",
                        environment,
                        process::id(),
                        Utc::now().format("%Y%m%d_%H%M%S")
                    );
                    let file_appender =
                        tracing_appender::rolling::never(&config.log_directory, log_filename);
                    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
                    guard = Some(file_guard);
                    Some(
                        fmt::layer()
                            .with_writer(file_writer)
                            .with_target(true)
                            .with_thread_ids(true)
                            .with_ansi(false)
                            .json()
                            .with_filter(env_filter(&log_level)),
                    )
                }
                Err(e) => {
                    eprintln!(
                        "Failed to create log directory {}: {e}",
                        config.log_directory.display()
                    );
                    None
                }
            }
        } else {
            None
        };

        if tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            file_output = config.file_output,
            "🔧 STRUCTURED LOGGING: Initialized"
        );

        guard
    });
}

/// `RUST_LOG` wins; otherwise the level follows the environment
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for entity-level workflow operations
pub fn log_stack_operation(
    operation: &str,
    entity: &EntityKey,
    activity: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        entity = %entity,
        activity = activity,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 STACK_OPERATION"
    );
}

/// Log structured data for a single task within a chain
pub fn log_task_operation(
    task: &str,
    entity: &EntityKey,
    attempt: Option<u32>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        task = %task,
        entity = %entity,
        attempt = attempt,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔧 TASK_OPERATION"
    );
}
