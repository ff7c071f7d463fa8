// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-process native side: requests issued through [`NativeOps`] are served
//! by the request entry points of the same bridge.

use crate::buffer::NativeBuf;
use crate::entry::RequestEntryPoints;
use crate::native::{NativeOps, NativeRequest};
use crate::sink::ReplySink;
use crate::types::SetAttr;
use crate::workers::WorkerPool;
use std::ffi::{OsStr, OsString};
use std::sync::Arc;

pub struct Loopback {
    entry: RequestEntryPoints,
    sink: Arc<dyn ReplySink>,
    pool: Option<WorkerPool>,
}

impl Loopback {
    /// Serve every request on the issuing thread.
    pub fn inline(entry: RequestEntryPoints, sink: Arc<dyn ReplySink>) -> Self {
        Self {
            entry,
            sink,
            pool: None,
        }
    }

    /// Serve requests on `pool`, so replies arrive from another thread.
    pub fn with_workers(entry: RequestEntryPoints, sink: Arc<dyn ReplySink>, pool: WorkerPool) -> Self {
        Self {
            entry,
            sink,
            pool: Some(pool),
        }
    }

    fn run<F>(&self, serve: F)
    where
        F: FnOnce(&RequestEntryPoints, &dyn ReplySink) + Send + 'static,
    {
        match &self.pool {
            None => serve(&self.entry, self.sink.as_ref()),
            Some(pool) => {
                let entry = self.entry.clone();
                let sink = Arc::clone(&self.sink);
                pool.submit(move || serve(&entry, sink.as_ref()));
            }
        }
    }
}

impl NativeOps for Loopback {
    fn lookup(&self, req: NativeRequest, parent: u64, name: &OsStr) {
        let name = name.to_os_string();
        self.run(move |entry, sink| {
            entry.lookup(&req, parent, &name, sink);
        });
    }

    fn forget(&self, req: NativeRequest, ino: u64, nlookup: u64) {
        self.run(move |entry, sink| {
            entry.forget(&req, ino, nlookup, sink);
        });
    }

    fn getattr(&self, req: NativeRequest, ino: u64) {
        self.run(move |entry, sink| {
            entry.getattr(&req, ino, sink);
        });
    }

    fn setattr(&self, req: NativeRequest, ino: u64, changes: SetAttr) {
        self.run(move |entry, sink| {
            entry.setattr(&req, ino, changes, sink);
        });
    }

    fn readlink(&self, req: NativeRequest, ino: u64) {
        self.run(move |entry, sink| {
            entry.readlink(&req, ino, sink);
        });
    }

    fn mknod(&self, req: NativeRequest, parent: u64, name: &OsStr, mode: u32, rdev: u32) {
        let name = name.to_os_string();
        self.run(move |entry, sink| {
            entry.mknod(&req, parent, &name, mode, rdev, sink);
        });
    }

    fn mkdir(&self, req: NativeRequest, parent: u64, name: &OsStr, mode: u32) {
        let name = name.to_os_string();
        self.run(move |entry, sink| {
            entry.mkdir(&req, parent, &name, mode, sink);
        });
    }

    fn unlink(&self, req: NativeRequest, parent: u64, name: &OsStr) {
        let name = name.to_os_string();
        self.run(move |entry, sink| {
            entry.unlink(&req, parent, &name, sink);
        });
    }

    fn rmdir(&self, req: NativeRequest, parent: u64, name: &OsStr) {
        let name = name.to_os_string();
        self.run(move |entry, sink| {
            entry.rmdir(&req, parent, &name, sink);
        });
    }

    fn symlink(&self, req: NativeRequest, parent: u64, name: &OsStr, target: &OsStr) {
        let name = name.to_os_string();
        let target = target.to_os_string();
        self.run(move |entry, sink| {
            entry.symlink(&req, parent, &name, &target, sink);
        });
    }

    fn rename(&self, req: NativeRequest, parent: u64, name: &OsStr, newparent: u64, newname: &OsStr) {
        let name = name.to_os_string();
        let newname = newname.to_os_string();
        self.run(move |entry, sink| {
            entry.rename(&req, parent, &name, newparent, &newname, sink);
        });
    }

    fn link(&self, req: NativeRequest, ino: u64, newparent: u64, newname: &OsStr) {
        let newname = newname.to_os_string();
        self.run(move |entry, sink| {
            entry.link(&req, ino, newparent, &newname, sink);
        });
    }

    fn open(&self, req: NativeRequest, ino: u64, flags: i32) {
        self.run(move |entry, sink| {
            entry.open(&req, ino, flags, sink);
        });
    }

    fn read(&self, req: NativeRequest, ino: u64, fh: u64, offset: i64, size: u32) {
        self.run(move |entry, sink| {
            entry.read(&req, ino, fh, offset, size, sink);
        });
    }

    fn write(&self, req: NativeRequest, ino: u64, fh: u64, offset: i64, data: NativeBuf<'_>) {
        // the caller's buffer is only valid for this call
        let data = data.to_vec();
        self.run(move |entry, sink| {
            entry.write(&req, ino, fh, offset, NativeBuf::from_slice(&data), sink);
        });
    }

    fn flush(&self, req: NativeRequest, ino: u64, fh: u64) {
        self.run(move |entry, sink| {
            entry.flush(&req, ino, fh, sink);
        });
    }

    fn release(&self, req: NativeRequest, ino: u64, fh: u64) {
        self.run(move |entry, sink| {
            entry.release(&req, ino, fh, sink);
        });
    }

    fn fsync(&self, req: NativeRequest, ino: u64, fh: u64, datasync: bool) {
        self.run(move |entry, sink| {
            entry.fsync(&req, ino, fh, datasync, sink);
        });
    }

    fn opendir(&self, req: NativeRequest, ino: u64, flags: i32) {
        self.run(move |entry, sink| {
            entry.opendir(&req, ino, flags, sink);
        });
    }

    fn readdir(&self, req: NativeRequest, ino: u64, fh: u64, offset: i64, size: usize) {
        self.run(move |entry, sink| {
            entry.readdir(&req, ino, fh, offset, size, sink);
        });
    }

    fn releasedir(&self, req: NativeRequest, ino: u64, fh: u64) {
        self.run(move |entry, sink| {
            entry.releasedir(&req, ino, fh, sink);
        });
    }

    fn fsyncdir(&self, req: NativeRequest, ino: u64, fh: u64, datasync: bool) {
        self.run(move |entry, sink| {
            entry.fsyncdir(&req, ino, fh, datasync, sink);
        });
    }

    fn statfs(&self, req: NativeRequest, ino: u64) {
        self.run(move |entry, sink| {
            entry.statfs(&req, ino, sink);
        });
    }

    fn setxattr(&self, req: NativeRequest, ino: u64, name: &OsStr, value: NativeBuf<'_>, flags: i32) {
        let name = name.to_os_string();
        let value = value.to_vec();
        self.run(move |entry, sink| {
            entry.setxattr(&req, ino, &name, NativeBuf::from_slice(&value), flags, sink);
        });
    }

    fn getxattr(&self, req: NativeRequest, ino: u64, name: &OsStr, size: u32) {
        let name: OsString = name.to_os_string();
        self.run(move |entry, sink| {
            entry.getxattr(&req, ino, &name, size, sink);
        });
    }

    fn listxattr(&self, req: NativeRequest, ino: u64, size: u32) {
        self.run(move |entry, sink| {
            entry.listxattr(&req, ino, size, sink);
        });
    }

    fn removexattr(&self, req: NativeRequest, ino: u64, name: &OsStr) {
        let name = name.to_os_string();
        self.run(move |entry, sink| {
            entry.removexattr(&req, ino, &name, sink);
        });
    }

    fn access(&self, req: NativeRequest, ino: u64, mask: i32) {
        self.run(move |entry, sink| {
            entry.access(&req, ino, mask, sink);
        });
    }

    fn create(&self, req: NativeRequest, parent: u64, name: &OsStr, mode: u32, flags: i32) {
        let name = name.to_os_string();
        self.run(move |entry, sink| {
            entry.create(&req, parent, &name, mode, flags, sink);
        });
    }
}
