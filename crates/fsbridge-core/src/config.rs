// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Bridge configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// What to do when a reply arrives for a request that has no pending handler
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationPolicy {
    /// Log and abort the process
    #[default]
    Abort,
    /// Log and panic on the dispatching thread
    Panic,
    /// Log and hand `-EPROTO` back to the native caller
    Report,
}

impl std::str::FromStr for ViolationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(ViolationPolicy::Abort),
            "panic" => Ok(ViolationPolicy::Panic),
            "report" => Ok(ViolationPolicy::Report),
            _ => Err(format!(
                "Invalid violation policy: {}. Use 'abort', 'panic' or 'report'",
                s
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub violation_policy: ViolationPolicy,
    /// Upper bound on how long an issued request waits for its reply
    pub reply_timeout_ms: Option<u64>,
    /// Threads completing requests off the native loop thread
    pub worker_threads: usize,
    pub attr_timeout_ms: u64,
    pub entry_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            violation_policy: ViolationPolicy::default(),
            reply_timeout_ms: None,
            worker_threads: 4,
            attr_timeout_ms: 1000,
            entry_timeout_ms: 1000,
        }
    }
}

impl BridgeConfig {
    /// Read a JSON config file (defaults when `path` is `None`), then apply
    /// `FSBRIDGE_VIOLATION_POLICY` and `FSBRIDGE_WORKER_THREADS`.
    pub fn load(path: Option<&Path>) -> io::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path)?;
                serde_json::from_str(&content)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var("FSBRIDGE_VIOLATION_POLICY") {
            match value.parse() {
                Ok(policy) => self.violation_policy = policy,
                Err(err) => warn!(target: "fsbridge::config", %err, "ignoring FSBRIDGE_VIOLATION_POLICY"),
            }
        }
        if let Ok(value) = std::env::var("FSBRIDGE_WORKER_THREADS") {
            match value.parse::<usize>() {
                Ok(threads) if threads > 0 => self.worker_threads = threads,
                _ => warn!(target: "fsbridge::config", %value, "ignoring FSBRIDGE_WORKER_THREADS"),
            }
        }
    }

    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout_ms.map(Duration::from_millis)
    }

    pub fn attr_timeout(&self) -> Duration {
        Duration::from_millis(self.attr_timeout_ms)
    }

    pub fn entry_timeout(&self) -> Duration {
        Duration::from_millis(self.entry_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_abort_on_violations() {
        let config = BridgeConfig::default();
        assert_eq!(config.violation_policy, ViolationPolicy::Abort);
        assert_eq!(config.reply_timeout(), None);
        assert_eq!(config.worker_threads, 4);
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(br#"{ "violation_policy": "report", "reply_timeout_ms": 250 }"#)
            .unwrap();
        temp_file.flush().unwrap();

        let text = std::fs::read_to_string(temp_file.path()).unwrap();
        let config: BridgeConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(config.violation_policy, ViolationPolicy::Report);
        assert_eq!(config.reply_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.attr_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn malformed_file_is_invalid_data() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"{ not json").unwrap();
        temp_file.flush().unwrap();

        let err = BridgeConfig::load(Some(temp_file.path())).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn policy_names_parse_case_insensitively() {
        assert_eq!("Report".parse::<ViolationPolicy>(), Ok(ViolationPolicy::Report));
        assert!("ignore".parse::<ViolationPolicy>().is_err());
    }
}
