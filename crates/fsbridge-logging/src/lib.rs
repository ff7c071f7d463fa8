// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Logging initialization for fsbridge binaries
//!
//! Console output by default, a log file when `--log-file` or `--log-dir`
//! is given. `RUST_LOG` overrides the level chosen on the command line.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Re-export Level for convenience
pub use tracing::Level;

/// Output format for log messages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable plaintext format
    #[default]
    Plaintext,
    /// Structured JSON format
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Plaintext => write!(f, "plaintext"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plaintext" => Ok(LogFormat::Plaintext),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!(
                "Invalid log format: {}. Use 'plaintext' or 'json'",
                s
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CliLogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    /// Includes one event per request and reply
    Trace,
}

impl From<CliLogLevel> for Level {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliLogLevel::Error => write!(f, "error"),
            CliLogLevel::Warn => write!(f, "warn"),
            CliLogLevel::Info => write!(f, "info"),
            CliLogLevel::Debug => write!(f, "debug"),
            CliLogLevel::Trace => write!(f, "trace"),
        }
    }
}

/// Logging arguments shared by every binary; use with `#[command(flatten)]`.
#[derive(Clone, Debug, Default, clap::Args, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CliLoggingArgs {
    #[arg(long, value_enum, help = "Log verbosity level (default: info)")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<CliLogLevel>,

    #[arg(long, value_enum, help = "Log output format (default: plaintext)")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_format: Option<LogFormat>,

    #[arg(long, help = "Directory for log files")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    #[arg(long, help = "Log filename")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
}

impl CliLoggingArgs {
    /// Install the global subscriber for `component`.
    pub fn init(self, component: &str) -> anyhow::Result<()> {
        let level = self.log_level.unwrap_or_default().into();
        let format = self.log_format.unwrap_or_default();
        if self.logs_to_file() {
            let log_path = self.resolve_log_path(component);
            init_to_file(component, level, format, &log_path)
        } else {
            init(component, level, format)
        }
    }

    pub fn logs_to_file(&self) -> bool {
        self.log_file.is_some() || self.log_dir.is_some()
    }

    /// An absolute `log_file` wins; a relative one is placed under
    /// `log_dir` when given. Without either, the platform log directory is
    /// used.
    pub fn resolve_log_path(&self, component: &str) -> PathBuf {
        match (&self.log_file, &self.log_dir) {
            (Some(file), _) if Path::new(file).is_absolute() => PathBuf::from(file),
            (Some(file), Some(dir)) => Path::new(dir).join(file),
            (Some(file), None) => PathBuf::from(file),
            (None, Some(dir)) => Path::new(dir).join(format!("{}.log", component)),
            (None, None) => standard_log_path(component),
        }
    }
}

/// Platform log location for `component`:
/// `~/Library/Logs/fsbridge/` on macOS, the XDG data directory elsewhere.
pub fn standard_log_path(component: &str) -> PathBuf {
    #[cfg(target_os = "macos")]
    let mut path = {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        path.push("Library");
        path.push("Logs");
        path
    };

    #[cfg(not(target_os = "macos"))]
    let mut path = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp")));

    path.push("fsbridge");
    path.push(format!("{}.log", component));
    path
}

pub fn init(component: &str, default_level: Level, format: LogFormat) -> anyhow::Result<()> {
    init_with_writer(component, default_level, format, io::stderr)
}

pub fn init_to_file(
    component: &str,
    default_level: Level,
    format: LogFormat,
    log_path: &Path,
) -> anyhow::Result<()> {
    use std::fs;

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let log_file = fs::OpenOptions::new().create(true).append(true).open(log_path)?;

    init_with_writer(component, default_level, format, log_file)
}

pub fn init_with_writer<W>(
    component: &str,
    default_level: Level,
    format: LogFormat,
    writer: W,
) -> anyhow::Result<()>
where
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(env_filter(component, default_level))
        .with(fmt_layer(format, writer))
        .try_init()?;
    Ok(())
}

/// `RUST_LOG` when set, otherwise `default_level` for everything
/// including the bridge's own `fsbridge::*` targets.
fn env_filter(component: &str, default_level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{level},{component}={level},fsbridge={level}",
            level = default_level,
            component = component.replace('-', "_"),
        ))
    })
}

fn fmt_layer<S, W>(format: LogFormat, writer: W) -> Box<dyn tracing_subscriber::Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer().with_writer(writer);
    #[cfg(debug_assertions)]
    let layer = layer.with_file(true).with_line_number(true);

    match format {
        LogFormat::Json => Box::new(layer.json()),
        LogFormat::Plaintext => Box::new(layer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn cli_log_level_conversion() {
        assert_eq!(Level::from(CliLogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(CliLogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(CliLogLevel::Info), Level::INFO);
        assert_eq!(Level::from(CliLogLevel::Debug), Level::DEBUG);
        assert_eq!(Level::from(CliLogLevel::Trace), Level::TRACE);
        assert_eq!(CliLogLevel::default(), CliLogLevel::Info);
        assert_eq!(CliLogLevel::Trace.to_string(), "trace");
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("plaintext".parse::<LogFormat>().unwrap(), LogFormat::Plaintext);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn console_unless_a_file_option_is_given() {
        assert!(!CliLoggingArgs::default().logs_to_file());
        let args = CliLoggingArgs {
            log_dir: Some("/var/log".to_string()),
            ..Default::default()
        };
        assert!(args.logs_to_file());
    }

    #[test]
    fn log_path_resolution() {
        let args = CliLoggingArgs {
            log_dir: Some("/var/log".to_string()),
            ..Default::default()
        };
        assert_eq!(args.resolve_log_path("fsbridge-fuse-host"), PathBuf::from("/var/log/fsbridge-fuse-host.log"));

        let args = CliLoggingArgs {
            log_dir: Some("/var/log".to_string()),
            log_file: Some("host.log".to_string()),
            ..Default::default()
        };
        assert_eq!(args.resolve_log_path("x"), PathBuf::from("/var/log/host.log"));

        let args = CliLoggingArgs {
            log_dir: Some("/var/log".to_string()),
            log_file: Some("/tmp/host.log".to_string()),
            ..Default::default()
        };
        assert_eq!(args.resolve_log_path("x"), PathBuf::from("/tmp/host.log"));

        let path = CliLoggingArgs::default().resolve_log_path("fsbridge-fuse-host");
        assert!(path.ends_with("fsbridge/fsbridge-fuse-host.log"));
    }

    #[test]
    fn scoped_json_output_carries_fields() {
        let buffer = Buffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::registry()
            .with(EnvFilter::new("trace"))
            .with(fmt_layer(LogFormat::Json, move || writer.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "fsbridge::mounts", mountpoint = "/tmp/mnt", "registered mount");
        });

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("\"mountpoint\":\"/tmp/mnt\""), "{}", output);
        assert!(output.contains("registered mount"));
    }

    #[test]
    fn file_output_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("host.log");
        // a global subscriber may already be installed by another test
        let _ = init_to_file("fsbridge-test", Level::INFO, LogFormat::Plaintext, &path);
        assert!(path.exists());
    }
}
