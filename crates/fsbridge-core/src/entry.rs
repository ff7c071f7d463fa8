// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Request entry points: the native loop calls one of these per request with
//! the raw request data, and exactly one terminal reply leaves through the
//! sink.

use crate::buffer::NativeBuf;
use crate::dirbuf::DirBuf;
use crate::error::{FsError, FsResult};
use crate::filesystem::FileSystem;
use crate::mounts::MountRegistry;
use crate::native::NativeRequest;
use crate::reply::Reply;
use crate::sink::ReplySink;
use crate::types::SetAttr;
use crate::workers::panic_message;
use libc::c_int;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

#[derive(Clone)]
pub struct RequestEntryPoints {
    mounts: Arc<MountRegistry>,
}

impl RequestEntryPoints {
    pub fn new(mounts: Arc<MountRegistry>) -> Self {
        Self { mounts }
    }

    pub fn mounts(&self) -> &Arc<MountRegistry> {
        &self.mounts
    }

    /// Forwarded once the session for `mountpoint` is up.
    pub fn init(&self, mountpoint: &Path) -> FsResult<()> {
        match self.mounts.filesystem(mountpoint) {
            Some(fs) => guarded("init", || fs.init()),
            None => Err(FsError::NotFound),
        }
    }

    pub fn destroy(&self, mountpoint: &Path) {
        if let Some(fs) = self.mounts.filesystem(mountpoint) {
            let _ = guarded("destroy", || {
                fs.destroy();
                Ok(())
            });
        }
    }

    /// Filesystem bound to the request's mountpoint. When there is none the
    /// request is answered with `ENOENT` and the sink's status comes back
    /// as the error.
    fn route(
        &self,
        req: &NativeRequest,
        op: &'static str,
        sink: &dyn ReplySink,
    ) -> Result<Arc<dyn FileSystem>, c_int> {
        match self.mounts.filesystem(&req.mountpoint) {
            Some(fs) => {
                trace!(target: "fsbridge::entry", request_id = %req.id, op, mountpoint = %req.mountpoint.display(), "routing request");
                Ok(fs)
            }
            None => {
                warn!(target: "fsbridge::entry", request_id = %req.id, op, mountpoint = %req.mountpoint.display(), "no filesystem mounted");
                Err(sink.send(req, Reply::Err(libc::ENOENT)))
            }
        }
    }

    fn answer<F>(&self, req: &NativeRequest, op: &'static str, sink: &dyn ReplySink, f: F) -> c_int
    where
        F: FnOnce(&dyn FileSystem) -> FsResult<Reply<'static>>,
    {
        let fs = match self.route(req, op, sink) {
            Ok(fs) => fs,
            Err(status) => return status,
        };
        let reply = guarded(op, || f(fs.as_ref())).unwrap_or_else(|err| failed(req, op, err));
        sink.send(req, reply)
    }

    pub fn lookup(&self, req: &NativeRequest, parent: u64, name: &OsStr, sink: &dyn ReplySink) -> c_int {
        self.answer(req, "lookup", sink, |fs| fs.lookup(parent, name).map(Reply::Entry))
    }

    pub fn forget(&self, req: &NativeRequest, ino: u64, nlookup: u64, sink: &dyn ReplySink) -> c_int {
        self.answer(req, "forget", sink, |fs| {
            // forget is never answered with an error
            let _ = guarded("forget", || {
                fs.forget(ino, nlookup);
                Ok(())
            });
            Ok(Reply::None)
        })
    }

    pub fn getattr(&self, req: &NativeRequest, ino: u64, sink: &dyn ReplySink) -> c_int {
        self.answer(req, "getattr", sink, |fs| {
            fs.getattr(ino).map(|(attr, timeout)| Reply::Attr { attr, timeout })
        })
    }

    pub fn setattr(&self, req: &NativeRequest, ino: u64, changes: SetAttr, sink: &dyn ReplySink) -> c_int {
        self.answer(req, "setattr", sink, |fs| {
            fs.setattr(ino, changes).map(|(attr, timeout)| Reply::Attr { attr, timeout })
        })
    }

    pub fn readlink(&self, req: &NativeRequest, ino: u64, sink: &dyn ReplySink) -> c_int {
        self.answer(req, "readlink", sink, |fs| fs.readlink(ino).map(Reply::Readlink))
    }

    pub fn mknod(
        &self,
        req: &NativeRequest,
        parent: u64,
        name: &OsStr,
        mode: u32,
        rdev: u32,
        sink: &dyn ReplySink,
    ) -> c_int {
        self.answer(req, "mknod", sink, |fs| fs.mknod(parent, name, mode, rdev).map(Reply::Entry))
    }

    pub fn mkdir(
        &self,
        req: &NativeRequest,
        parent: u64,
        name: &OsStr,
        mode: u32,
        sink: &dyn ReplySink,
    ) -> c_int {
        self.answer(req, "mkdir", sink, |fs| fs.mkdir(parent, name, mode).map(Reply::Entry))
    }

    pub fn unlink(&self, req: &NativeRequest, parent: u64, name: &OsStr, sink: &dyn ReplySink) -> c_int {
        self.answer(req, "unlink", sink, |fs| fs.unlink(parent, name).map(|()| Reply::ok()))
    }

    pub fn rmdir(&self, req: &NativeRequest, parent: u64, name: &OsStr, sink: &dyn ReplySink) -> c_int {
        self.answer(req, "rmdir", sink, |fs| fs.rmdir(parent, name).map(|()| Reply::ok()))
    }

    pub fn symlink(
        &self,
        req: &NativeRequest,
        parent: u64,
        name: &OsStr,
        target: &OsStr,
        sink: &dyn ReplySink,
    ) -> c_int {
        self.answer(req, "symlink", sink, |fs| fs.symlink(parent, name, target).map(Reply::Entry))
    }

    pub fn rename(
        &self,
        req: &NativeRequest,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        sink: &dyn ReplySink,
    ) -> c_int {
        self.answer(req, "rename", sink, |fs| {
            fs.rename(parent, name, newparent, newname).map(|()| Reply::ok())
        })
    }

    pub fn link(
        &self,
        req: &NativeRequest,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        sink: &dyn ReplySink,
    ) -> c_int {
        self.answer(req, "link", sink, |fs| fs.link(ino, newparent, newname).map(Reply::Entry))
    }

    pub fn open(&self, req: &NativeRequest, ino: u64, flags: i32, sink: &dyn ReplySink) -> c_int {
        self.answer(req, "open", sink, |fs| fs.open(ino, flags).map(Reply::Open))
    }

    /// Replies with at most `size` bytes.
    pub fn read(
        &self,
        req: &NativeRequest,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        sink: &dyn ReplySink,
    ) -> c_int {
        let fs = match self.route(req, "read", sink) {
            Ok(fs) => fs,
            Err(status) => return status,
        };
        match guarded("read", || fs.read(ino, fh, offset, size)) {
            Ok(data) => {
                let len = data.len().min(size as usize);
                sink.send(req, Reply::Buf(NativeBuf::from_slice(&data[..len])))
            }
            Err(err) => sink.send(req, failed(req, "read", err)),
        }
    }

    pub fn write(
        &self,
        req: &NativeRequest,
        ino: u64,
        fh: u64,
        offset: i64,
        data: NativeBuf<'_>,
        sink: &dyn ReplySink,
    ) -> c_int {
        self.answer(req, "write", sink, |fs| {
            fs.write(ino, fh, offset, data.as_slice()).map(Reply::Write)
        })
    }

    pub fn flush(&self, req: &NativeRequest, ino: u64, fh: u64, sink: &dyn ReplySink) -> c_int {
        self.answer(req, "flush", sink, |fs| fs.flush(ino, fh).map(|()| Reply::ok()))
    }

    pub fn release(&self, req: &NativeRequest, ino: u64, fh: u64, sink: &dyn ReplySink) -> c_int {
        self.answer(req, "release", sink, |fs| fs.release(ino, fh).map(|()| Reply::ok()))
    }

    pub fn fsync(&self, req: &NativeRequest, ino: u64, fh: u64, datasync: bool, sink: &dyn ReplySink) -> c_int {
        self.answer(req, "fsync", sink, |fs| fs.fsync(ino, fh, datasync).map(|()| Reply::ok()))
    }

    pub fn opendir(&self, req: &NativeRequest, ino: u64, flags: i32, sink: &dyn ReplySink) -> c_int {
        self.answer(req, "opendir", sink, |fs| fs.opendir(ino, flags).map(Reply::Open))
    }

    /// Each entry that fits in `size` bytes is reported as an `AddDirentry`;
    /// the encoded buffer then completes the request.
    pub fn readdir(
        &self,
        req: &NativeRequest,
        ino: u64,
        fh: u64,
        offset: i64,
        size: usize,
        sink: &dyn ReplySink,
    ) -> c_int {
        let fs = match self.route(req, "readdir", sink) {
            Ok(fs) => fs,
            Err(status) => return status,
        };
        let entries = match guarded("readdir", || fs.readdir(ino, fh, offset)) {
            Ok(entries) => entries,
            Err(err) => return sink.send(req, failed(req, "readdir", err)),
        };

        let mut dir = DirBuf::new(size);
        let mut added = 0usize;
        for entry in &entries {
            if !dir.add(sink, req, entry) {
                break;
            }
            added += 1;
        }
        trace!(target: "fsbridge::entry", request_id = %req.id, added, total = entries.len(), "readdir buffer filled");
        sink.send(req, Reply::Buf(NativeBuf::from_slice(dir.as_slice())))
    }

    pub fn releasedir(&self, req: &NativeRequest, ino: u64, fh: u64, sink: &dyn ReplySink) -> c_int {
        self.answer(req, "releasedir", sink, |fs| fs.releasedir(ino, fh).map(|()| Reply::ok()))
    }

    pub fn fsyncdir(&self, req: &NativeRequest, ino: u64, fh: u64, datasync: bool, sink: &dyn ReplySink) -> c_int {
        self.answer(req, "fsyncdir", sink, |fs| fs.fsyncdir(ino, fh, datasync).map(|()| Reply::ok()))
    }

    pub fn statfs(&self, req: &NativeRequest, ino: u64, sink: &dyn ReplySink) -> c_int {
        self.answer(req, "statfs", sink, |fs| fs.statfs(ino).map(Reply::Statfs))
    }

    pub fn setxattr(
        &self,
        req: &NativeRequest,
        ino: u64,
        name: &OsStr,
        value: NativeBuf<'_>,
        flags: i32,
        sink: &dyn ReplySink,
    ) -> c_int {
        self.answer(req, "setxattr", sink, |fs| {
            fs.setxattr(ino, name, value.as_slice(), flags).map(|()| Reply::ok())
        })
    }

    pub fn getxattr(
        &self,
        req: &NativeRequest,
        ino: u64,
        name: &OsStr,
        size: u32,
        sink: &dyn ReplySink,
    ) -> c_int {
        let fs = match self.route(req, "getxattr", sink) {
            Ok(fs) => fs,
            Err(status) => return status,
        };
        match guarded("getxattr", || fs.getxattr(ino, name)) {
            Ok(value) => xattr_reply(req, &value, size, sink),
            Err(err) => sink.send(req, failed(req, "getxattr", err)),
        }
    }

    pub fn listxattr(&self, req: &NativeRequest, ino: u64, size: u32, sink: &dyn ReplySink) -> c_int {
        let fs = match self.route(req, "listxattr", sink) {
            Ok(fs) => fs,
            Err(status) => return status,
        };
        match guarded("listxattr", || fs.listxattr(ino)) {
            Ok(names) => {
                let mut value = Vec::new();
                for name in &names {
                    value.extend_from_slice(name.as_bytes());
                    value.push(0);
                }
                xattr_reply(req, &value, size, sink)
            }
            Err(err) => sink.send(req, failed(req, "listxattr", err)),
        }
    }

    pub fn removexattr(&self, req: &NativeRequest, ino: u64, name: &OsStr, sink: &dyn ReplySink) -> c_int {
        self.answer(req, "removexattr", sink, |fs| fs.removexattr(ino, name).map(|()| Reply::ok()))
    }

    pub fn access(&self, req: &NativeRequest, ino: u64, mask: i32, sink: &dyn ReplySink) -> c_int {
        self.answer(req, "access", sink, |fs| fs.access(ino, mask).map(|()| Reply::ok()))
    }

    pub fn create(
        &self,
        req: &NativeRequest,
        parent: u64,
        name: &OsStr,
        mode: u32,
        flags: i32,
        sink: &dyn ReplySink,
    ) -> c_int {
        self.answer(req, "create", sink, |fs| {
            fs.create(parent, name, mode, flags)
                .map(|(entry, info)| Reply::Create { entry, info })
        })
    }
}

/// Run a filesystem call; a panic becomes an error so the request is
/// still answered.
fn guarded<T>(op: &'static str, call: impl FnOnce() -> FsResult<T>) -> FsResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref()).to_string();
            error!(target: "fsbridge::entry", op, panic = %message, "filesystem panicked");
            Err(FsError::Panicked(message))
        }
    }
}

fn failed(req: &NativeRequest, op: &'static str, err: FsError) -> Reply<'static> {
    debug!(target: "fsbridge::entry", request_id = %req.id, op, error = %err, "filesystem returned an error");
    Reply::from(err)
}

/// A zero `size` asks for the length only.
fn xattr_reply(req: &NativeRequest, value: &[u8], size: u32, sink: &dyn ReplySink) -> c_int {
    if size == 0 {
        sink.send(req, Reply::Xattr(value.len() as u64))
    } else if value.len() > size as usize {
        sink.send(req, Reply::Err(libc::ERANGE))
    } else {
        sink.send(req, Reply::Buf(NativeBuf::from_slice(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::MockFileSystem;
    use crate::native::{ChannelHandle, SessionHandle};
    use crate::reply::ReplyKind;
    use crate::requests::RequestId;
    use crate::types::{DirEntry, EntryParam, FileAttr, FileType};
    use mockall::predicate::eq;
    use std::ffi::OsString;
    use std::sync::Mutex;
    use std::time::{Duration, UNIX_EPOCH};

    #[derive(Debug, PartialEq)]
    enum Seen {
        Err(c_int),
        Kind(ReplyKind),
        Bytes(Vec<u8>),
        Xattr(u64),
        Dirent(OsString),
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Seen>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<Seen> {
            std::mem::take(&mut *self.seen.lock().unwrap())
        }
    }

    impl ReplySink for Recorder {
        fn send(&self, _req: &NativeRequest, reply: Reply<'_>) -> c_int {
            let (seen, status) = match reply {
                Reply::Err(errno) => (Seen::Err(errno), 0),
                Reply::Buf(buf) => (Seen::Bytes(buf.to_vec()), 0),
                Reply::Xattr(size) => (Seen::Xattr(size), 0),
                Reply::AddDirentry { buf, name, .. } => (Seen::Dirent(name), buf.len() as c_int),
                other => (Seen::Kind(other.kind()), 0),
            };
            self.seen.lock().unwrap().push(seen);
            status
        }
    }

    fn mounted(fs: MockFileSystem) -> RequestEntryPoints {
        mounted_with(Arc::new(fs))
    }

    fn mounted_with(fs: Arc<dyn FileSystem>) -> RequestEntryPoints {
        let mounts = Arc::new(MountRegistry::new());
        mounts
            .register(
                Path::new("/mnt"),
                fs,
                SessionHandle::from_raw(1).unwrap(),
                ChannelHandle::from_raw(2).unwrap(),
            )
            .unwrap();
        RequestEntryPoints::new(mounts)
    }

    fn req() -> NativeRequest {
        NativeRequest::new(RequestId::from_raw(9), "/mnt")
    }

    #[test]
    fn unmounted_requests_get_enoent() {
        let entry = RequestEntryPoints::new(Arc::new(MountRegistry::new()));
        let sink = Recorder::default();
        entry.getattr(&req(), 1, &sink);
        assert_eq!(sink.take(), vec![Seen::Err(libc::ENOENT)]);
        assert!(matches!(entry.init(Path::new("/mnt")), Err(FsError::NotFound)));
    }

    #[test]
    fn lookup_answers_with_an_entry() {
        let mut fs = MockFileSystem::new();
        fs.expect_lookup()
            .with(eq(1), eq(OsStr::new("hello")))
            .times(1)
            .returning(|_, _| {
                let attr = FileAttr::new(2, FileType::RegularFile, 0o644, UNIX_EPOCH);
                Ok(EntryParam::new(attr, Duration::from_secs(1)))
            });
        let entry = mounted(fs);
        let sink = Recorder::default();
        entry.lookup(&req(), 1, OsStr::new("hello"), &sink);
        assert_eq!(sink.take(), vec![Seen::Kind(ReplyKind::Entry)]);
    }

    #[test]
    fn filesystem_errors_become_errno() {
        let mut fs = MockFileSystem::new();
        fs.expect_unlink().returning(|_, _| Err(FsError::NotFound));
        fs.expect_rmdir().returning(|_, _| Ok(()));
        let entry = mounted(fs);
        let sink = Recorder::default();
        entry.unlink(&req(), 1, OsStr::new("gone"), &sink);
        entry.rmdir(&req(), 1, OsStr::new("dir"), &sink);
        assert_eq!(sink.take(), vec![Seen::Err(libc::ENOENT), Seen::Err(0)]);
    }

    #[test]
    fn reads_are_capped_at_the_requested_size() {
        let mut fs = MockFileSystem::new();
        fs.expect_read().returning(|_, _, _, _| Ok(b"abcdef".to_vec()));
        let entry = mounted(fs);
        let sink = Recorder::default();
        entry.read(&req(), 2, 0, 0, 4, &sink);
        assert_eq!(sink.take(), vec![Seen::Bytes(b"abcd".to_vec())]);
    }

    #[test]
    fn xattr_size_queries_and_range_errors() {
        let mut fs = MockFileSystem::new();
        fs.expect_getxattr().returning(|_, _| Ok(b"value".to_vec()));
        fs.expect_listxattr()
            .returning(|_| Ok(vec![OsString::from("user.a"), OsString::from("user.b")]));
        let entry = mounted(fs);
        let sink = Recorder::default();
        let name = OsStr::new("user.a");
        entry.getxattr(&req(), 2, name, 0, &sink);
        entry.getxattr(&req(), 2, name, 3, &sink);
        entry.getxattr(&req(), 2, name, 64, &sink);
        entry.listxattr(&req(), 2, 64, &sink);
        assert_eq!(
            sink.take(),
            vec![
                Seen::Xattr(5),
                Seen::Err(libc::ERANGE),
                Seen::Bytes(b"value".to_vec()),
                Seen::Bytes(b"user.a\0user.b\0".to_vec()),
            ]
        );
    }

    #[test]
    fn readdir_reports_entries_then_completes() {
        let mut fs = MockFileSystem::new();
        fs.expect_readdir().returning(|_, _, _| {
            Ok(["a", "b", "c"]
                .iter()
                .enumerate()
                .map(|(i, name)| DirEntry {
                    ino: i as u64 + 2,
                    offset: i as i64 + 1,
                    kind: FileType::RegularFile,
                    name: OsString::from(name),
                })
                .collect())
        });
        let entry = mounted(fs);
        let sink = Recorder::default();
        // room for two 32-byte records
        entry.readdir(&req(), 1, 0, 0, 64, &sink);
        let seen = sink.take();
        assert_eq!(seen[0], Seen::Dirent("a".into()));
        assert_eq!(seen[1], Seen::Dirent("b".into()));
        assert!(matches!(&seen[2], Seen::Bytes(bytes) if bytes.len() == 64));
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn forget_replies_none() {
        let mut fs = MockFileSystem::new();
        fs.expect_forget().with(eq(5), eq(2)).times(1).return_const(());
        let entry = mounted(fs);
        let sink = Recorder::default();
        entry.forget(&req(), 5, 2, &sink);
        assert_eq!(sink.take(), vec![Seen::Kind(ReplyKind::None)]);
    }

    #[test]
    fn oversized_readdir_limits_are_answered() {
        let mut fs = MockFileSystem::new();
        fs.expect_readdir().returning(|_, _, _| {
            Ok(vec![DirEntry {
                ino: 2,
                offset: 1,
                kind: FileType::Directory,
                name: OsString::from("only"),
            }])
        });
        let entry = mounted(fs);
        let sink = Recorder::default();
        entry.readdir(&req(), 1, 0, 0, usize::MAX, &sink);
        let seen = sink.take();
        assert_eq!(seen[0], Seen::Dirent("only".into()));
        assert!(matches!(&seen[1], Seen::Bytes(bytes) if bytes.len() == 32));
    }

    #[test]
    fn panics_in_the_filesystem_answer_eio() {
        struct Exploding;
        impl FileSystem for Exploding {
            fn getattr(&self, _ino: u64) -> FsResult<(FileAttr, Duration)> {
                panic!("getattr exploded")
            }
            fn read(&self, _ino: u64, _fh: u64, _offset: i64, _size: u32) -> FsResult<Vec<u8>> {
                panic!("read exploded")
            }
            fn forget(&self, _ino: u64, _nlookup: u64) {
                panic!("forget exploded")
            }
        }

        let entry = mounted_with(Arc::new(Exploding));
        let sink = Recorder::default();
        entry.getattr(&req(), 1, &sink);
        entry.read(&req(), 2, 0, 0, 16, &sink);
        entry.forget(&req(), 2, 1, &sink);
        assert_eq!(
            sink.take(),
            vec![
                Seen::Err(libc::EIO),
                Seen::Err(libc::EIO),
                Seen::Kind(ReplyKind::None)
            ]
        );
    }

    #[test]
    fn namespace_operations_answer_with_entries() {
        let attr = FileAttr::new(7, FileType::Symlink, 0o777, UNIX_EPOCH);
        let mut fs = MockFileSystem::new();
        fs.expect_symlink()
            .with(eq(1), eq(OsStr::new("ln")), eq(OsStr::new("target")))
            .times(1)
            .returning(move |_, _, _| Ok(EntryParam::new(attr, Duration::from_secs(1))));
        fs.expect_link()
            .with(eq(7), eq(1), eq(OsStr::new("ln2")))
            .times(1)
            .returning(move |_, _, _| Ok(EntryParam::new(attr, Duration::from_secs(1))));
        fs.expect_mknod()
            .with(eq(1), eq(OsStr::new("fifo")), eq(libc::S_IFIFO as u32 | 0o600), eq(0))
            .times(1)
            .returning(|_, _, _, _| Err(FsError::AlreadyExists));
        fs.expect_rename()
            .with(eq(1), eq(OsStr::new("a")), eq(1), eq(OsStr::new("b")))
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let entry = mounted(fs);
        let sink = Recorder::default();
        entry.symlink(&req(), 1, OsStr::new("ln"), OsStr::new("target"), &sink);
        entry.link(&req(), 7, 1, OsStr::new("ln2"), &sink);
        entry.mknod(&req(), 1, OsStr::new("fifo"), libc::S_IFIFO as u32 | 0o600, 0, &sink);
        entry.rename(&req(), 1, OsStr::new("a"), 1, OsStr::new("b"), &sink);
        assert_eq!(
            sink.take(),
            vec![
                Seen::Kind(ReplyKind::Entry),
                Seen::Kind(ReplyKind::Entry),
                Seen::Err(libc::EEXIST),
                Seen::Err(0),
            ]
        );
    }

    #[test]
    fn setattr_and_xattr_updates() {
        let mut fs = MockFileSystem::new();
        fs.expect_setattr()
            .withf(|ino, changes| *ino == 3 && changes.size == Some(0) && changes.mode.is_none())
            .times(1)
            .returning(|ino, _| Ok((FileAttr::new(ino, FileType::RegularFile, 0o644, UNIX_EPOCH), Duration::ZERO)));
        fs.expect_setxattr()
            .withf(|ino, name, value, flags| {
                *ino == 3 && name == OsStr::new("user.k") && value == b"v".as_slice() && *flags == libc::XATTR_CREATE
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        fs.expect_removexattr().returning(|_, _| Err(FsError::NoAttribute));
        let entry = mounted(fs);
        let sink = Recorder::default();
        let truncate = SetAttr {
            size: Some(0),
            ..Default::default()
        };
        entry.setattr(&req(), 3, truncate, &sink);
        entry.setxattr(
            &req(),
            3,
            OsStr::new("user.k"),
            NativeBuf::from_slice(b"v"),
            libc::XATTR_CREATE,
            &sink,
        );
        entry.removexattr(&req(), 3, OsStr::new("user.k"), &sink);
        assert_eq!(
            sink.take(),
            vec![Seen::Kind(ReplyKind::Attr), Seen::Err(0), Seen::Err(libc::ENODATA)]
        );
    }

    #[test]
    fn sync_operations_default_to_success() {
        struct Defaults;
        impl FileSystem for Defaults {}

        let entry = mounted_with(Arc::new(Defaults));
        let sink = Recorder::default();
        entry.flush(&req(), 2, 0, &sink);
        entry.fsync(&req(), 2, 0, true, &sink);
        entry.fsyncdir(&req(), 1, 0, false, &sink);
        assert_eq!(sink.take(), vec![Seen::Err(0), Seen::Err(0), Seen::Err(0)]);
    }
}
