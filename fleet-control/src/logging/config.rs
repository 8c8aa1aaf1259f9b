use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;
use tracing::debug;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOGGING_ENABLED_CRATES: &[&str] = &["fips_fleet_control"];

/// An enum representing possible errors during the logging initialization.
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("init logging error: `{0}`")]
    TryInitError(String),
    #[error("invalid directive `{directive}`: {err}")]
    InvalidDirective { directive: String, err: String },
}

/// Logging configuration shared by all binaries.
///
/// `level` applies to the crates in [LOGGING_ENABLED_CRATES] only; logs from
/// external crates are disabled unless `insecure_fine_grained_level` is set,
/// which overrides `level` and enables logs from any crate.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub insecure_fine_grained_level: Option<String>,
    /// Show the emitting module path on each line.
    #[serde(default)]
    pub target: bool,
}

impl LoggingConfig {
    /// Attempts to initialize the global tracing subscriber with this configuration.
    pub fn try_init(&self) -> Result<(), LoggingError> {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(self.target)
            .with_filter(self.logging_filter()?);

        tracing_subscriber::Registry::default()
            .with(console_layer)
            .try_init()
            .map_err(|_| {
                LoggingError::TryInitError("unable to set global logging subscriber".to_string())
            })?;

        debug!("logging initialized successfully");
        Ok(())
    }

    fn logging_filter(&self) -> Result<EnvFilter, LoggingError> {
        if let Some(directives) = self
            .insecure_fine_grained_level
            .as_ref()
            .filter(|s| !s.is_empty())
        {
            return EnvFilter::builder().parse(directives).map_err(|err| {
                LoggingError::InvalidDirective {
                    directive: directives.clone(),
                    err: err.to_string(),
                }
            });
        }

        let mut filter = EnvFilter::new("off");
        for crate_name in LOGGING_ENABLED_CRATES {
            let directive = format!("{}={}", crate_name, self.level.as_str())
                .parse()
                .map_err(|err: tracing_subscriber::filter::ParseError| {
                    LoggingError::InvalidDirective {
                        directive: format!("{}={}", crate_name, self.level.as_str()),
                        err: err.to_string(),
                    }
                })?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}
