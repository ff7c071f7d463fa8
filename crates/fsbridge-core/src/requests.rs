// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Registry of in-flight requests keyed by opaque integer identifiers
//!
//! Native code only ever sees the integer; the handler stays on the Rust
//! side. One mutex covers both the counter and the map, and every critical
//! section is a single map operation. Handlers always run after the lock
//! has been released.

use crate::reply::Reply;
use libc::c_int;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, trace, warn};

/// Identifier handed to native code in place of a pointer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Continuation invoked with the reply; returns the native status code.
pub type ReplyHandler = Box<dyn FnMut(Reply<'_>) -> c_int + Send>;

pub struct PendingRequest {
    pub id: RequestId,
    pub mountpoint: PathBuf,
    pub handler: ReplyHandler,
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("mountpoint", &self.mountpoint)
            .finish_non_exhaustive()
    }
}

struct RegistryState {
    next_id: u64,
    pending: HashMap<RequestId, PendingRequest>,
}

pub struct RequestRegistry {
    state: Mutex<RegistryState>,
}

impl Default for RequestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                next_id: 1,
                pending: HashMap::new(),
            }),
        }
    }

    /// Register `handler` under a fresh identifier.
    pub fn allocate<F>(&self, mountpoint: &Path, handler: F) -> RequestId
    where
        F: FnMut(Reply<'_>) -> c_int + Send + 'static,
    {
        let mut state = self.lock();
        let id = RequestId(state.next_id);
        state.next_id += 1;
        state.pending.insert(
            id,
            PendingRequest {
                id,
                mountpoint: mountpoint.to_path_buf(),
                handler: Box::new(handler),
            },
        );
        drop(state);
        trace!(target: "fsbridge::requests", request_id = %id, mountpoint = %mountpoint.display(), "allocated request");
        id
    }

    /// Remove and return the pending request for `id`.
    pub fn take(&self, id: RequestId) -> Option<PendingRequest> {
        self.lock().pending.remove(&id)
    }

    /// Put back a request taken for a non-terminal reply.
    pub(crate) fn restore(&self, request: PendingRequest) {
        let mut state = self.lock();
        if let Some(existing) = state.pending.insert(request.id, request) {
            warn!(target: "fsbridge::requests", request_id = %existing.id, "request re-registered while its handler was running");
        }
    }

    /// Drop a request whose issuing call finished.
    ///
    /// Returns `true` when the request was still pending, i.e. no terminal
    /// reply was ever delivered for it.
    pub fn release(&self, id: RequestId) -> bool {
        let released = self.lock().pending.remove(&id).is_some();
        if released {
            warn!(target: "fsbridge::requests", request_id = %id, "released request that never received a reply");
        }
        released
    }

    /// Keep a request whose caller stopped waiting, with a handler that
    /// accepts and discards whatever reply eventually arrives for it.
    ///
    /// Returns `false` when the request is no longer pending.
    pub fn abandon(&self, id: RequestId) -> bool {
        let mut state = self.lock();
        let Some(request) = state.pending.get_mut(&id) else {
            return false;
        };
        let previous = std::mem::replace(
            &mut request.handler,
            Box::new(move |reply: Reply<'_>| {
                debug!(target: "fsbridge::requests", request_id = %id, reply = %reply.kind(), "discarding reply for abandoned request");
                0
            }),
        );
        drop(state);
        drop(previous);
        warn!(target: "fsbridge::requests", request_id = %id, "abandoned request; a late reply will be discarded");
        true
    }

    pub fn is_pending(&self, id: RequestId) -> bool {
        self.lock().pending.contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Mountpoint the request was issued against, used for routing.
    pub fn mountpoint(&self, id: RequestId) -> Option<PathBuf> {
        self.lock().pending.get(&id).map(|req| req.mountpoint.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        // A handler never runs under this lock, so poisoning can only come
        // from a panic inside a map operation; the map is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
