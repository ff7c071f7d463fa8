// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Registry of active mounts keyed by absolute mountpoint

use crate::error::{BridgeError, BridgeResult};
use crate::filesystem::FileSystem;
use crate::native::{ChannelHandle, SessionHandle};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// One active mount
#[derive(Clone)]
pub struct MountEntry {
    pub mountpoint: PathBuf,
    pub filesystem: Arc<dyn FileSystem>,
    pub session: SessionHandle,
    pub channel: ChannelHandle,
}

impl fmt::Debug for MountEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountEntry")
            .field("mountpoint", &self.mountpoint)
            .field("session", &self.session)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

/// Lookups happen on every request, so they take the shared side of the
/// lock; mount and unmount take it exclusively.
#[derive(Default)]
pub struct MountRegistry {
    mounts: RwLock<HashMap<PathBuf, MountEntry>>,
}

impl MountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a mount. An already registered mountpoint is rejected and the
    /// existing entry stays in place.
    pub fn register(
        &self,
        mountpoint: &Path,
        filesystem: Arc<dyn FileSystem>,
        session: SessionHandle,
        channel: ChannelHandle,
    ) -> BridgeResult<()> {
        let mut mounts = self.write();
        if mounts.contains_key(mountpoint) {
            return Err(BridgeError::MountpointInUse(mountpoint.to_path_buf()));
        }
        mounts.insert(
            mountpoint.to_path_buf(),
            MountEntry {
                mountpoint: mountpoint.to_path_buf(),
                filesystem,
                session,
                channel,
            },
        );
        drop(mounts);
        info!(target: "fsbridge::mounts", mountpoint = %mountpoint.display(), "registered mount");
        Ok(())
    }

    pub fn deregister(&self, mountpoint: &Path) -> Option<MountEntry> {
        let removed = self.write().remove(mountpoint);
        if removed.is_some() {
            info!(target: "fsbridge::mounts", mountpoint = %mountpoint.display(), "deregistered mount");
        } else {
            debug!(target: "fsbridge::mounts", mountpoint = %mountpoint.display(), "deregister of unknown mount");
        }
        removed
    }

    pub fn lookup(&self, mountpoint: &Path) -> Option<MountEntry> {
        self.read().get(mountpoint).cloned()
    }

    pub fn filesystem(&self, mountpoint: &Path) -> Option<Arc<dyn FileSystem>> {
        self.read().get(mountpoint).map(|entry| Arc::clone(&entry.filesystem))
    }

    pub fn contains(&self, mountpoint: &Path) -> bool {
        self.read().contains_key(mountpoint)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn mountpoints(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<PathBuf, MountEntry>> {
        self.mounts.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PathBuf, MountEntry>> {
        self.mounts.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
