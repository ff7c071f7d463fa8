// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! One bridge instance: registries, dispatcher and entry points wired together

use crate::client::BridgeClient;
use crate::config::BridgeConfig;
use crate::dispatch::ReplyDispatcher;
use crate::entry::RequestEntryPoints;
use crate::lifecycle::MountController;
use crate::loopback::Loopback;
use crate::mounts::MountRegistry;
use crate::native::{NativeLoop, NativeOps};
use crate::requests::RequestRegistry;
use crate::sink::{DispatchSink, RawReplySink, ReplySink};
use crate::workers::WorkerPool;
use std::path::PathBuf;
use std::sync::Arc;

pub struct Bridge {
    config: BridgeConfig,
    requests: Arc<RequestRegistry>,
    mounts: Arc<MountRegistry>,
    dispatcher: Arc<ReplyDispatcher>,
    entry_points: RequestEntryPoints,
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        let requests = Arc::new(RequestRegistry::new());
        let mounts = Arc::new(MountRegistry::new());
        let dispatcher = Arc::new(ReplyDispatcher::new(Arc::clone(&requests), config.violation_policy));
        let entry_points = RequestEntryPoints::new(Arc::clone(&mounts));
        Self {
            config,
            requests,
            mounts,
            dispatcher,
            entry_points,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn requests(&self) -> &Arc<RequestRegistry> {
        &self.requests
    }

    pub fn mounts(&self) -> &Arc<MountRegistry> {
        &self.mounts
    }

    pub fn dispatcher(&self) -> &Arc<ReplyDispatcher> {
        &self.dispatcher
    }

    pub fn entry_points(&self) -> &RequestEntryPoints {
        &self.entry_points
    }

    pub fn dispatch_sink(&self) -> Arc<dyn ReplySink> {
        Arc::new(DispatchSink::new(Arc::clone(&self.dispatcher)))
    }

    pub fn raw_sink(&self) -> Arc<dyn ReplySink> {
        Arc::new(RawReplySink::new(Arc::clone(&self.dispatcher)))
    }

    pub fn mount_controller(&self, native: Arc<dyn NativeLoop>) -> MountController {
        MountController::new(Arc::clone(&self.mounts), native)
    }

    /// Native side served on the issuing thread.
    pub fn loopback(&self, sink: Arc<dyn ReplySink>) -> Loopback {
        Loopback::inline(self.entry_points.clone(), sink)
    }

    /// Native side served on `worker_threads` threads.
    pub fn threaded_loopback(&self, sink: Arc<dyn ReplySink>) -> Loopback {
        Loopback::with_workers(
            self.entry_points.clone(),
            sink,
            WorkerPool::new(self.config.worker_threads),
        )
    }

    /// Issue-side client for `mountpoint`, bounded by the configured reply timeout.
    pub fn client(&self, native: Arc<dyn NativeOps>, mountpoint: impl Into<PathBuf>) -> BridgeClient {
        BridgeClient::new(Arc::clone(&self.requests), native, mountpoint)
            .with_timeout(self.config.reply_timeout())
    }
}
