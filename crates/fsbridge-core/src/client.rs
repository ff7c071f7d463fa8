// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Issue side of the bridge
//!
//! Each call allocates a request, hands its identifier to the native
//! bridging function and waits for the handler to receive the reply, which
//! may be dispatched from any thread. Without a reply timeout a request the
//! native side never answers blocks its caller. A call that times out
//! returns `NoReply` and leaves its request registered with a handler that
//! discards the late reply; requests are not cancelled at this layer.

use crate::buffer::NativeBuf;
use crate::error::{BridgeError, BridgeResult};
use crate::native::{NativeOps, NativeRequest};
use crate::reply::{Reply, ReplyKind};
use crate::requests::RequestRegistry;
use crate::types::{DirEntry, EntryParam, FileAttr, FileInfo, SetAttr, StatFs};
use libc::c_int;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Answer to an extended-attribute query
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum XattrReply {
    /// Length of the value when the caller passed a zero size
    Size(u64),
    Data(Vec<u8>),
}

enum Outcome<T> {
    Done(T),
    Failed(c_int),
    Unexpected(ReplyKind),
}

enum Step<T> {
    /// Non-terminal reply handled; the status goes back to the native side
    Continue(c_int),
    Finish(Outcome<T>),
}

fn done<T>(value: T) -> Step<T> {
    Step::Finish(Outcome::Done(value))
}

/// Replies the operation did not ask for. A non-zero `Err` is the usual
/// failure path.
fn otherwise<T>(reply: Reply<'_>) -> Step<T> {
    match reply {
        Reply::Err(errno) if errno != 0 => Step::Finish(Outcome::Failed(errno)),
        Reply::AddDirentry { .. } => Step::Continue(-libc::EPROTO),
        other => Step::Finish(Outcome::Unexpected(other.kind())),
    }
}

fn unit(reply: Reply<'_>) -> Step<()> {
    match reply {
        Reply::Err(0) => done(()),
        other => otherwise(other),
    }
}

fn entry(reply: Reply<'_>) -> Step<EntryParam> {
    match reply {
        Reply::Entry(entry) => done(entry),
        other => otherwise(other),
    }
}

fn xattr(reply: Reply<'_>) -> Step<XattrReply> {
    match reply {
        Reply::Xattr(size) => done(XattrReply::Size(size)),
        Reply::Buf(buf) => done(XattrReply::Data(buf.to_vec())),
        other => otherwise(other),
    }
}

pub struct BridgeClient {
    requests: Arc<RequestRegistry>,
    native: Arc<dyn NativeOps>,
    mountpoint: PathBuf,
    timeout: Option<Duration>,
}

impl BridgeClient {
    pub fn new(
        requests: Arc<RequestRegistry>,
        native: Arc<dyn NativeOps>,
        mountpoint: impl Into<PathBuf>,
    ) -> Self {
        Self {
            requests,
            native,
            mountpoint: mountpoint.into(),
            timeout: None,
        }
    }

    /// Bound how long each call waits for its reply.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    fn call<T, C, I>(&self, op: &'static str, mut convert: C, issue: I) -> BridgeResult<T>
    where
        T: Send + 'static,
        C: FnMut(Reply<'_>) -> Step<T> + Send + 'static,
        I: FnOnce(&dyn NativeOps, NativeRequest),
    {
        let (tx, rx) = mpsc::channel();
        let id = self.requests.allocate(&self.mountpoint, move |reply: Reply<'_>| {
            match convert(reply) {
                Step::Continue(status) => status,
                Step::Finish(outcome) => {
                    // the waiter may have timed out already
                    let _ = tx.send(outcome);
                    0
                }
            }
        });
        debug!(target: "fsbridge::client", request_id = %id, op, mountpoint = %self.mountpoint.display(), "issuing request");

        issue(self.native.as_ref(), NativeRequest::new(id, self.mountpoint.clone()));

        let (outcome, unanswered) = match self.timeout {
            Some(timeout) => match rx.recv_timeout(timeout) {
                Ok(outcome) => (Some(outcome), self.requests.release(id)),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    // the reply may still come; it must not count as a violation
                    let abandoned = self.requests.abandon(id);
                    (rx.try_recv().ok(), abandoned)
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => (None, self.requests.release(id)),
            },
            None => {
                let outcome = rx.recv().ok();
                (outcome, self.requests.release(id))
            }
        };

        match outcome {
            Some(Outcome::Done(value)) => Ok(value),
            Some(Outcome::Failed(errno)) => Err(BridgeError::Status(errno)),
            Some(Outcome::Unexpected(kind)) => {
                warn!(target: "fsbridge::client", request_id = %id, op, reply = %kind, "unexpected reply");
                Err(BridgeError::UnexpectedReply {
                    id,
                    kind: kind.as_str(),
                })
            }
            None => {
                warn!(target: "fsbridge::client", request_id = %id, op, unanswered, "no reply delivered");
                Err(BridgeError::NoReply(id))
            }
        }
    }

    pub fn lookup(&self, parent: u64, name: &OsStr) -> BridgeResult<EntryParam> {
        self.call("lookup", entry, |native, req| native.lookup(req, parent, name))
    }

    pub fn forget(&self, ino: u64, nlookup: u64) -> BridgeResult<()> {
        self.call(
            "forget",
            |reply| match reply {
                Reply::None => done(()),
                other => otherwise(other),
            },
            |native, req| native.forget(req, ino, nlookup),
        )
    }

    pub fn getattr(&self, ino: u64) -> BridgeResult<(FileAttr, Duration)> {
        self.call(
            "getattr",
            |reply| match reply {
                Reply::Attr { attr, timeout } => done((attr, timeout)),
                other => otherwise(other),
            },
            |native, req| native.getattr(req, ino),
        )
    }

    pub fn setattr(&self, ino: u64, changes: SetAttr) -> BridgeResult<(FileAttr, Duration)> {
        self.call(
            "setattr",
            |reply| match reply {
                Reply::Attr { attr, timeout } => done((attr, timeout)),
                other => otherwise(other),
            },
            |native, req| native.setattr(req, ino, changes),
        )
    }

    pub fn readlink(&self, ino: u64) -> BridgeResult<OsString> {
        self.call(
            "readlink",
            |reply| match reply {
                Reply::Readlink(target) => done(target),
                other => otherwise(other),
            },
            |native, req| native.readlink(req, ino),
        )
    }

    pub fn mknod(&self, parent: u64, name: &OsStr, mode: u32, rdev: u32) -> BridgeResult<EntryParam> {
        self.call("mknod", entry, |native, req| native.mknod(req, parent, name, mode, rdev))
    }

    pub fn mkdir(&self, parent: u64, name: &OsStr, mode: u32) -> BridgeResult<EntryParam> {
        self.call("mkdir", entry, |native, req| native.mkdir(req, parent, name, mode))
    }

    pub fn unlink(&self, parent: u64, name: &OsStr) -> BridgeResult<()> {
        self.call("unlink", unit, |native, req| native.unlink(req, parent, name))
    }

    pub fn rmdir(&self, parent: u64, name: &OsStr) -> BridgeResult<()> {
        self.call("rmdir", unit, |native, req| native.rmdir(req, parent, name))
    }

    pub fn symlink(&self, parent: u64, name: &OsStr, target: &OsStr) -> BridgeResult<EntryParam> {
        self.call("symlink", entry, |native, req| native.symlink(req, parent, name, target))
    }

    pub fn rename(&self, parent: u64, name: &OsStr, newparent: u64, newname: &OsStr) -> BridgeResult<()> {
        self.call("rename", unit, |native, req| native.rename(req, parent, name, newparent, newname))
    }

    pub fn link(&self, ino: u64, newparent: u64, newname: &OsStr) -> BridgeResult<EntryParam> {
        self.call("link", entry, |native, req| native.link(req, ino, newparent, newname))
    }

    pub fn open(&self, ino: u64, flags: i32) -> BridgeResult<FileInfo> {
        self.call(
            "open",
            |reply| match reply {
                Reply::Open(info) => done(info),
                other => otherwise(other),
            },
            |native, req| native.open(req, ino, flags),
        )
    }

    pub fn read(&self, ino: u64, fh: u64, offset: i64, size: u32) -> BridgeResult<Vec<u8>> {
        self.call(
            "read",
            |reply| match reply {
                Reply::Buf(buf) => done(buf.to_vec()),
                other => otherwise(other),
            },
            |native, req| native.read(req, ino, fh, offset, size),
        )
    }

    pub fn write(&self, ino: u64, fh: u64, offset: i64, data: &[u8]) -> BridgeResult<u64> {
        self.call(
            "write",
            |reply| match reply {
                Reply::Write(count) => done(count),
                other => otherwise(other),
            },
            |native, req| native.write(req, ino, fh, offset, NativeBuf::from_slice(data)),
        )
    }

    pub fn flush(&self, ino: u64, fh: u64) -> BridgeResult<()> {
        self.call("flush", unit, |native, req| native.flush(req, ino, fh))
    }

    pub fn release(&self, ino: u64, fh: u64) -> BridgeResult<()> {
        self.call("release", unit, |native, req| native.release(req, ino, fh))
    }

    pub fn fsync(&self, ino: u64, fh: u64, datasync: bool) -> BridgeResult<()> {
        self.call("fsync", unit, |native, req| native.fsync(req, ino, fh, datasync))
    }

    pub fn opendir(&self, ino: u64, flags: i32) -> BridgeResult<FileInfo> {
        self.call(
            "opendir",
            |reply| match reply {
                Reply::Open(info) => done(info),
                other => otherwise(other),
            },
            |native, req| native.opendir(req, ino, flags),
        )
    }

    /// Entries reported through directory-entry additions until the final
    /// buffer arrives.
    pub fn readdir(&self, ino: u64, fh: u64, offset: i64, size: usize) -> BridgeResult<Vec<DirEntry>> {
        let mut entries = Vec::new();
        self.call(
            "readdir",
            move |reply| match reply {
                Reply::AddDirentry { buf, name, attr, off } => {
                    entries.push(DirEntry {
                        ino: attr.ino,
                        offset: off,
                        kind: attr.kind,
                        name,
                    });
                    Step::Continue(buf.len() as c_int)
                }
                Reply::Buf(_) => done(std::mem::take(&mut entries)),
                other => otherwise(other),
            },
            |native, req| native.readdir(req, ino, fh, offset, size),
        )
    }

    pub fn releasedir(&self, ino: u64, fh: u64) -> BridgeResult<()> {
        self.call("releasedir", unit, |native, req| native.releasedir(req, ino, fh))
    }

    pub fn fsyncdir(&self, ino: u64, fh: u64, datasync: bool) -> BridgeResult<()> {
        self.call("fsyncdir", unit, |native, req| native.fsyncdir(req, ino, fh, datasync))
    }

    pub fn statfs(&self, ino: u64) -> BridgeResult<StatFs> {
        self.call(
            "statfs",
            |reply| match reply {
                Reply::Statfs(stats) => done(stats),
                other => otherwise(other),
            },
            |native, req| native.statfs(req, ino),
        )
    }

    pub fn setxattr(&self, ino: u64, name: &OsStr, value: &[u8], flags: i32) -> BridgeResult<()> {
        self.call("setxattr", unit, |native, req| {
            native.setxattr(req, ino, name, NativeBuf::from_slice(value), flags)
        })
    }

    pub fn getxattr(&self, ino: u64, name: &OsStr, size: u32) -> BridgeResult<XattrReply> {
        self.call("getxattr", xattr, |native, req| native.getxattr(req, ino, name, size))
    }

    pub fn listxattr(&self, ino: u64, size: u32) -> BridgeResult<XattrReply> {
        self.call("listxattr", xattr, |native, req| native.listxattr(req, ino, size))
    }

    pub fn removexattr(&self, ino: u64, name: &OsStr) -> BridgeResult<()> {
        self.call("removexattr", unit, |native, req| native.removexattr(req, ino, name))
    }

    pub fn access(&self, ino: u64, mask: i32) -> BridgeResult<()> {
        self.call("access", unit, |native, req| native.access(req, ino, mask))
    }

    pub fn create(
        &self,
        parent: u64,
        name: &OsStr,
        mode: u32,
        flags: i32,
    ) -> BridgeResult<(EntryParam, FileInfo)> {
        self.call(
            "create",
            |reply| match reply {
                Reply::Create { entry, info } => done((entry, info)),
                other => otherwise(other),
            },
            |native, req| native.create(req, parent, name, mode, flags),
        )
    }
}
