// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Request/reply bridge between a native low-level filesystem event loop
//! and filesystems written in Rust.
//!
//! Native code only ever holds opaque integer request identifiers. Request
//! entry points route each request to the filesystem mounted at its
//! mountpoint and send exactly one terminal [`Reply`]; the reply dispatcher
//! resolves identifiers back to the handler waiting for that reply.

pub mod bridge;
pub mod buffer;
pub mod client;
pub mod config;
pub mod dirbuf;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod filesystem;
pub mod lifecycle;
pub mod loopback;
pub mod memfs;
pub mod mounts;
pub mod native;
pub mod raw;
pub mod reply;
pub mod requests;
pub mod sink;
pub mod testing;
pub mod types;
pub mod workers;

pub use bridge::Bridge;
pub use buffer::NativeBuf;
pub use client::{BridgeClient, XattrReply};
pub use config::{BridgeConfig, ViolationPolicy};
pub use dispatch::ReplyDispatcher;
pub use entry::RequestEntryPoints;
pub use error::{BridgeError, BridgeResult, FsError, FsResult};
pub use filesystem::FileSystem;
pub use lifecycle::{resolve_mountpoint, MountController, MountState};
pub use loopback::Loopback;
pub use memfs::MemoryFs;
pub use mounts::{MountEntry, MountRegistry};
pub use native::{ChannelHandle, FuseArgs, NativeLoop, NativeOps, NativeRequest, SessionHandle};
pub use raw::{RawEntryParam, RawFileInfo};
pub use reply::{Reply, ReplyKind};
pub use requests::{RequestId, RequestRegistry};
pub use sink::{DispatchSink, RawReplySink, ReplySink};
pub use types::{DirEntry, EntryParam, FileAttr, FileInfo, FileType, SetAttr, StatFs, ROOT_INO};
pub use workers::WorkerPool;
