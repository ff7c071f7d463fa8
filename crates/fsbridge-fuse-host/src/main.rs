// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! fsbridge FUSE host
//!
//! Mounts an in-memory filesystem through the request/reply bridge, with
//! fuser driving the kernel side on Linux.

#[cfg(all(feature = "fuse", target_os = "linux"))]
mod adapter;

#[cfg(all(feature = "fuse", target_os = "linux"))]
use adapter::FuserLoop;
use anyhow::{Context, Result};
use clap::Parser;
use fsbridge_core::{Bridge, BridgeConfig, MemoryFs};
use fsbridge_logging::CliLoggingArgs;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const COMPONENT: &str = "fsbridge-fuse-host";

#[derive(Parser)]
#[command(name = "fsbridge-fuse-host", about = "Serve an in-memory filesystem over FUSE")]
struct Args {
    /// Mount point for the filesystem
    mount_point: PathBuf,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Allow other users to access the filesystem
    #[arg(long)]
    allow_other: bool,

    /// Allow root to access the filesystem
    #[arg(long)]
    allow_root: bool,

    /// Auto unmount on process exit
    #[arg(long)]
    auto_unmount: bool,

    /// Mount read-only
    #[arg(long)]
    read_only: bool,

    #[command(flatten)]
    logging: CliLoggingArgs,
}

fn load_config(config_path: Option<&Path>) -> Result<BridgeConfig> {
    BridgeConfig::load(config_path).with_context(|| match config_path {
        Some(path) => format!("failed to load config from {}", path.display()),
        None => "failed to build default config".to_string(),
    })
}

/// Argument vector handed to the mount controller, in the native loop's
/// command-line conventions.
fn fuse_args(args: &Args) -> Vec<OsString> {
    let mut argv = vec![OsString::from(COMPONENT), args.mount_point.clone().into_os_string()];

    let mut options = Vec::new();
    if args.allow_other {
        options.push("allow_other");
    }
    if args.allow_root {
        options.push("allow_root");
    }
    if args.auto_unmount {
        options.push("auto_unmount");
    }
    if args.read_only {
        options.push("ro");
    }
    if !options.is_empty() {
        argv.push(OsString::from("-o"));
        argv.push(OsString::from(options.join(",")));
    }
    argv
}

fn main() -> Result<()> {
    let args = Args::parse();
    args.logging.clone().init(COMPONENT)?;

    info!("Starting fsbridge FUSE host");
    info!("Mount point: {}", args.mount_point.display());

    let config = load_config(args.config.as_deref())?;
    info!("Configuration loaded: {}", serde_json::to_string(&config)?);

    let bridge = Arc::new(Bridge::new(config));
    let filesystem = Arc::new(MemoryFs::from_config(bridge.config()));

    #[cfg(all(feature = "fuse", target_os = "linux"))]
    {
        let controller = bridge.mount_controller(Arc::new(FuserLoop::new(Arc::clone(&bridge))));
        info!("Mounting filesystem...");
        let status = controller.mount_and_run(fuse_args(&args), filesystem);
        if status != 0 {
            anyhow::bail!("fuse session for {} ended with status {}", args.mount_point.display(), status);
        }
        info!("fsbridge FUSE host unmounted");
    }

    #[cfg(not(all(feature = "fuse", target_os = "linux")))]
    {
        warn!("FUSE support not compiled in. This binary is for testing only.");
        info!(
            "Bridge initialized (worker_threads={}, inodes={}), would mount with {:?}",
            bridge.config().worker_threads,
            filesystem.inode_count(),
            fuse_args(&args)
        );
        info!("To enable FUSE support, compile with: cargo build --features fuse");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsbridge_core::ViolationPolicy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_loading_default() {
        let config = load_config(None).unwrap();
        assert_eq!(config.attr_timeout_ms, 1000);
        assert!(config.reply_timeout_ms.is_none());
    }

    #[test]
    fn config_loading_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let config_json = r#"{
            "violation_policy": "report",
            "reply_timeout_ms": 250,
            "attr_timeout_ms": 500
        }"#;
        temp_file.write_all(config_json.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(Some(temp_file.path())).unwrap();
        assert_eq!(config.violation_policy, ViolationPolicy::Report);
        assert_eq!(config.reply_timeout_ms, Some(250));
        assert_eq!(config.attr_timeout_ms, 500);
        assert_eq!(config.entry_timeout_ms, 1000);
    }

    #[test]
    fn missing_config_file_names_the_path() {
        let err = load_config(Some(Path::new("/nonexistent/fsbridge.json"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/fsbridge.json"));
    }

    #[test]
    fn flags_become_mount_options() {
        let args = Args::try_parse_from(["fsbridge-fuse-host", "/tmp/mnt", "--allow-other", "--read-only"]).unwrap();
        assert_eq!(
            fuse_args(&args),
            ["fsbridge-fuse-host", "/tmp/mnt", "-o", "allow_other,ro"].map(OsString::from).to_vec()
        );

        let args = Args::try_parse_from(["fsbridge-fuse-host", "mnt", "--log-level", "debug"]).unwrap();
        assert_eq!(fuse_args(&args), ["fsbridge-fuse-host", "mnt"].map(OsString::from).to_vec());
        assert!(args.logging.log_level.is_some());
    }

    #[test]
    fn mount_point_is_required() {
        assert!(Args::try_parse_from(["fsbridge-fuse-host"]).is_err());
    }

    #[cfg(all(feature = "fuse", target_os = "linux"))]
    #[test]
    fn adapter_options_include_flags() {
        let args = Args::try_parse_from(["fsbridge-fuse-host", "/tmp/mnt", "--auto-unmount"]).unwrap();
        let native = fsbridge_core::FuseArgs::new(fuse_args(&args)).unwrap();
        assert!(adapter::mount_options(&native).contains(&fuser::MountOption::AutoUnmount));
    }
}
