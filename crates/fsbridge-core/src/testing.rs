// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Test utilities: a scriptable native loop
//!
//! `MockLoop` hands out fake channel and session handles and its `run`
//! blocks until `exit` is called for that session, like a real event loop
//! serving a mount.

use crate::native::{ChannelHandle, FuseArgs, NativeLoop, SessionHandle};
use libc::c_int;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Sessions {
    running: HashSet<usize>,
    exiting: HashSet<usize>,
}

#[derive(Default)]
pub struct MockLoop {
    fail_channel: AtomicBool,
    fail_session: AtomicBool,
    run_status: AtomicI32,
    next_handle: AtomicUsize,
    channels_opened: AtomicUsize,
    channels_released: AtomicUsize,
    exits: AtomicUsize,
    sessions: Mutex<Sessions>,
    changed: Condvar,
}

impl MockLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make channel creation fail.
    pub fn fail_channel(&self, fail: bool) {
        self.fail_channel.store(fail, Ordering::SeqCst);
    }

    /// Make session creation fail.
    pub fn fail_session(&self, fail: bool) {
        self.fail_session.store(fail, Ordering::SeqCst);
    }

    /// Status returned by `run` once the session exits.
    pub fn set_run_status(&self, status: c_int) {
        self.run_status.store(status, Ordering::SeqCst);
    }

    pub fn channels_opened(&self) -> usize {
        self.channels_opened.load(Ordering::SeqCst)
    }

    pub fn channels_released(&self) -> usize {
        self.channels_released.load(Ordering::SeqCst)
    }

    pub fn exits(&self) -> usize {
        self.exits.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.sessions().running.len()
    }

    /// Block until at least `count` sessions are inside `run`.
    pub fn wait_for_sessions(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut sessions = self.sessions();
        while sessions.running.len() < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            sessions = match self.changed.wait_timeout(sessions, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    fn handle(&self) -> usize {
        self.next_handle.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn sessions(&self) -> MutexGuard<'_, Sessions> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NativeLoop for MockLoop {
    fn parse_mountpoint(&self, args: &FuseArgs) -> Option<PathBuf> {
        args.mountpoint()
    }

    fn mount(&self, _mountpoint: &Path, _args: &FuseArgs) -> Option<ChannelHandle> {
        if self.fail_channel.load(Ordering::SeqCst) {
            return None;
        }
        self.channels_opened.fetch_add(1, Ordering::SeqCst);
        ChannelHandle::from_raw(self.handle())
    }

    fn new_session(
        &self,
        _mountpoint: &Path,
        _args: &FuseArgs,
        _channel: ChannelHandle,
    ) -> Option<SessionHandle> {
        if self.fail_session.load(Ordering::SeqCst) {
            return None;
        }
        SessionHandle::from_raw(self.handle())
    }

    fn run(&self, _mountpoint: &Path, session: SessionHandle, _channel: ChannelHandle) -> c_int {
        let id = session.as_raw();
        let mut sessions = self.sessions();
        sessions.running.insert(id);
        self.changed.notify_all();
        while !sessions.exiting.remove(&id) {
            sessions = match self.changed.wait(sessions) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        sessions.running.remove(&id);
        self.changed.notify_all();
        self.run_status.load(Ordering::SeqCst)
    }

    fn exit(&self, _mountpoint: &Path, session: SessionHandle, _channel: ChannelHandle) {
        self.exits.fetch_add(1, Ordering::SeqCst);
        self.sessions().exiting.insert(session.as_raw());
        self.changed.notify_all();
    }

    fn unmount(&self, _mountpoint: &Path, _channel: ChannelHandle) {
        self.channels_released.fetch_add(1, Ordering::SeqCst);
    }
}
