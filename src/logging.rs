//! Structured logging for the reconciliation engine.
//!
//! Built on `tracing`. Level, format, destination and per-module overrides
//! come from [`LoggingConfig`], with `TEND_LOG*` environment variables taking
//! precedence so a deployment can retune logging without a config rollout.

use crate::error::ReconcileError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level: trace, debug, info, warn, error, off.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text.
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stderr, file, file+stderr.
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path when output includes file; None means the platform
    /// state directory default.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Colored output (text format on stderr only).
    #[serde(default = "default_true")]
    pub color: bool,

    /// Module-specific log levels.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: None,
            color: default_true(),
            modules: HashMap::new(),
        }
    }
}

/// Resolve the log file path with precedence: TEND_LOG_FILE env, config,
/// platform state directory default.
pub fn resolve_log_file_path(config_file: Option<PathBuf>) -> Result<PathBuf, ReconcileError> {
    if let Ok(env_path) = std::env::var("TEND_LOG_FILE") {
        if !env_path.is_empty() {
            return Ok(PathBuf::from(env_path));
        }
    }
    if let Some(p) = config_file {
        if !p.as_os_str().is_empty() {
            return Ok(p);
        }
    }
    let project_dirs = directories::ProjectDirs::from("", "tend", "tend").ok_or_else(|| {
        ReconcileError::Config("could not determine platform state directory for log file".into())
    })?;
    let state_dir = project_dirs.state_dir().ok_or_else(|| {
        ReconcileError::Config("platform state directory not available for log file".into())
    })?;
    Ok(state_dir.join("tend.log"))
}

/// Initialize the global subscriber.
///
/// Precedence, highest first: `TEND_LOG` / `TEND_LOG_FORMAT` /
/// `TEND_LOG_OUTPUT` environment variables, then the supplied config, then
/// defaults. May only be called once per process.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), ReconcileError> {
    if config.map(|c| !c.enabled).unwrap_or(false) {
        Registry::default().with(EnvFilter::new("off")).init();
        return Ok(());
    }

    let filter = build_env_filter(config)?;
    let format = determine_format(config)?;
    let output = determine_output(config)?;
    let use_color = config.map(|c| c.color).unwrap_or(true) && !output.file;

    let writer = if output.file {
        let path = resolve_log_file_path(config.and_then(|c| c.file.clone()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ReconcileError::Config(format!("failed to create log directory: {e}"))
            })?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ReconcileError::Config(format!("failed to open log file {path:?}: {e}")))?;
        if output.stderr {
            BoxMakeWriter::new(file.and(std::io::stderr))
        } else {
            BoxMakeWriter::new(file)
        }
    } else {
        BoxMakeWriter::new(std::io::stderr)
    };

    let base = Registry::default().with(filter);
    if format == "json" {
        base.with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_writer(writer),
        )
        .init();
    } else {
        base.with(
            fmt::layer()
                .with_target(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(use_color)
                .with_writer(writer),
        )
        .init();
    }
    Ok(())
}

/// Build the level filter from `TEND_LOG` or config, including per-module
/// directives.
fn build_env_filter(config: Option<&LoggingConfig>) -> Result<EnvFilter, ReconcileError> {
    if let Ok(filter) = EnvFilter::try_from_env("TEND_LOG") {
        return Ok(filter);
    }

    let level = config.map(|c| c.level.as_str()).unwrap_or("info");
    let mut filter = EnvFilter::new(level);
    if let Some(config) = config {
        for (module, module_level) in &config.modules {
            let directive = format!("{module}={module_level}");
            filter = filter.add_directive(directive.parse().map_err(|e| {
                ReconcileError::Config(format!("invalid log directive {directive:?}: {e}"))
            })?);
        }
    }
    Ok(filter)
}

fn determine_format(config: Option<&LoggingConfig>) -> Result<String, ReconcileError> {
    if let Ok(format) = std::env::var("TEND_LOG_FORMAT") {
        if format == "json" || format == "text" {
            return Ok(format);
        }
    }
    let format = config.map(|c| c.format.as_str()).unwrap_or("text");
    if format != "json" && format != "text" {
        return Err(ReconcileError::Config(format!(
            "invalid log format: {format} (must be 'json' or 'text')"
        )));
    }
    Ok(format.to_string())
}

struct OutputDestinations {
    stderr: bool,
    file: bool,
}

fn determine_output(config: Option<&LoggingConfig>) -> Result<OutputDestinations, ReconcileError> {
    let output = match std::env::var("TEND_LOG_OUTPUT") {
        Ok(output) => output,
        Err(_) => config
            .map(|c| c.output.clone())
            .unwrap_or_else(default_output),
    };
    parse_output_destinations(&output)
}

fn parse_output_destinations(output: &str) -> Result<OutputDestinations, ReconcileError> {
    match output {
        "stderr" => Ok(OutputDestinations {
            stderr: true,
            file: false,
        }),
        "file" => Ok(OutputDestinations {
            stderr: false,
            file: true,
        }),
        "file+stderr" => Ok(OutputDestinations {
            stderr: true,
            file: true,
        }),
        _ => Err(ReconcileError::Config(format!(
            "invalid log output: {output} (must be 'stderr', 'file', or 'file+stderr')"
        ))),
    }
}
