// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Mount and unmount lifecycle
//!
//! A mount moves `Unmounted -> Mounting -> Mounted -> Unmounting ->
//! Unmounted`. Mounting blocks in the native loop until the session exits;
//! unmount only asks the loop to exit, and the mount is deregistered by the
//! thread that was running it.

use crate::error::{BridgeError, BridgeResult};
use crate::filesystem::FileSystem;
use crate::mounts::MountRegistry;
use crate::native::{FuseArgs, NativeLoop};
use libc::c_int;
use scopeguard::defer;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MountState {
    Unmounted,
    Mounting,
    Mounted,
    Unmounting,
}

/// Absolute, lexically normalized form of `path`. Relative paths are joined
/// onto the directory returned by `cwd`; symlinks are not followed.
pub fn resolve_mountpoint<F>(path: &Path, cwd: F) -> BridgeResult<PathBuf>
where
    F: FnOnce() -> io::Result<PathBuf>,
{
    if path.as_os_str().is_empty() {
        return Err(BridgeError::AbsolutePath {
            path: path.to_path_buf(),
            reason: "empty path".to_string(),
        });
    }
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = cwd().map_err(BridgeError::CurrentDir)?;
        if !cwd.is_absolute() {
            return Err(BridgeError::AbsolutePath {
                path: path.to_path_buf(),
                reason: format!("working directory {} is not absolute", cwd.display()),
            });
        }
        cwd.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    Ok(normalized)
}

pub struct MountController {
    mounts: Arc<MountRegistry>,
    native: Arc<dyn NativeLoop>,
    states: Mutex<HashMap<PathBuf, MountState>>,
}

impl MountController {
    pub fn new(mounts: Arc<MountRegistry>, native: Arc<dyn NativeLoop>) -> Self {
        Self {
            mounts,
            native,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn mounts(&self) -> &Arc<MountRegistry> {
        &self.mounts
    }

    pub fn state(&self, mountpoint: &Path) -> MountState {
        self.states()
            .get(mountpoint)
            .copied()
            .unwrap_or(MountState::Unmounted)
    }

    /// Mount `fs` and run the native loop on the calling thread until the
    /// session exits.
    ///
    /// Returns the loop's status, or a negative setup status: `-1` for bad
    /// arguments or mountpoint, `-2` when the channel could not be created,
    /// `-3` when the session could not be created, `-4` when the mountpoint
    /// is already mounted.
    pub fn mount_and_run<I, S>(&self, args: I, fs: Arc<dyn FileSystem>) -> c_int
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        match self.try_mount_and_run(args, fs) {
            Ok(status) => status,
            Err(err) => {
                error!(target: "fsbridge::lifecycle", error = %err, "mount failed");
                err.status()
            }
        }
    }

    pub fn try_mount_and_run<I, S>(&self, args: I, fs: Arc<dyn FileSystem>) -> BridgeResult<c_int>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args = FuseArgs::new(args)?;
        let parsed = self.native.parse_mountpoint(&args).ok_or(BridgeError::NoMountpoint)?;
        let mountpoint = resolve_mountpoint(&parsed, std::env::current_dir)?;
        let mountpoint = mountpoint.as_path();

        self.claim(mountpoint)?;
        defer! {
            self.set_state(mountpoint, MountState::Unmounted);
        }

        let channel = self
            .native
            .mount(mountpoint, &args)
            .ok_or_else(|| BridgeError::ChannelCreation(mountpoint.to_path_buf()))?;
        let Some(session) = self.native.new_session(mountpoint, &args, channel) else {
            self.native.unmount(mountpoint, channel);
            return Err(BridgeError::SessionCreation(mountpoint.to_path_buf()));
        };
        if let Err(err) = self.mounts.register(mountpoint, fs, session, channel) {
            self.native.exit(mountpoint, session, channel);
            return Err(err);
        }
        defer! {
            self.mounts.deregister(mountpoint);
        }

        self.set_state(mountpoint, MountState::Mounted);
        info!(target: "fsbridge::lifecycle", mountpoint = %mountpoint.display(), "mounted; running native loop");
        let status = self.native.run(mountpoint, session, channel);
        info!(target: "fsbridge::lifecycle", mountpoint = %mountpoint.display(), status, "native loop returned");
        Ok(status)
    }

    /// Ask the native loop serving `mountpoint` to exit. Relative paths are
    /// resolved against the current working directory.
    ///
    /// Only a `Mounted` mountpoint moves to `Unmounting`, checked and set
    /// under one lock. Anything else is `NotMounted`.
    pub fn unmount(&self, mountpoint: &Path) -> BridgeResult<()> {
        let mountpoint = match resolve_mountpoint(mountpoint, std::env::current_dir) {
            Ok(mountpoint) => mountpoint,
            Err(err) => {
                error!(target: "fsbridge::lifecycle", path = %mountpoint.display(), error = %err, "couldn't resolve mount point");
                return Err(err);
            }
        };
        let entry = {
            let mut states = self.states();
            if states.get(&mountpoint) != Some(&MountState::Mounted) {
                return Err(BridgeError::NotMounted(mountpoint));
            }
            let entry = self
                .mounts
                .lookup(&mountpoint)
                .ok_or_else(|| BridgeError::NotMounted(mountpoint.clone()))?;
            states.insert(mountpoint.clone(), MountState::Unmounting);
            entry
        };

        debug!(target: "fsbridge::lifecycle", mountpoint = %mountpoint.display(), "requesting native loop exit");
        self.native.exit(&mountpoint, entry.session, entry.channel);
        Ok(())
    }

    /// Move `mountpoint` into `Mounting`, failing if anything holds it.
    fn claim(&self, mountpoint: &Path) -> BridgeResult<()> {
        let mut states = self.states();
        let busy = states
            .get(mountpoint)
            .is_some_and(|state| *state != MountState::Unmounted);
        if busy || self.mounts.contains(mountpoint) {
            return Err(BridgeError::MountpointInUse(mountpoint.to_path_buf()));
        }
        states.insert(mountpoint.to_path_buf(), MountState::Mounting);
        Ok(())
    }

    fn set_state(&self, mountpoint: &Path, state: MountState) {
        let mut states = self.states();
        if state == MountState::Unmounted {
            states.remove(mountpoint);
        } else {
            states.insert(mountpoint.to_path_buf(), state);
        }
    }

    fn states(&self) -> MutexGuard<'_, HashMap<PathBuf, MountState>> {
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
