// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! fuser-backed native loop
//!
//! Every kernel request is registered with the bridge, handed to the request
//! entry points and answered through the reply dispatcher. The registered
//! handler owns the fuser reply object and completes it.

#[cfg(not(all(feature = "fuse", target_os = "linux")))]
compile_error!("This module requires the 'fuse' feature on Linux");

use fsbridge_core::{
    Bridge, ChannelHandle, FileAttr, FileInfo, FileType, FuseArgs, NativeBuf, NativeLoop, NativeRequest, Reply,
    ReplySink, RequestEntryPoints, RequestRegistry, SessionHandle, SetAttr,
};
use fuser::consts::{FOPEN_DIRECT_IO, FOPEN_KEEP_CACHE, FOPEN_NONSEEKABLE};
use fuser::{
    MountOption, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen,
    ReplyStatfs, ReplyWrite, ReplyXattr, Request, Session, SessionUnmounter, TimeOrNow,
};
use libc::c_int;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

/// Directory buffer offered to the entry points per readdir; fuser stops
/// accepting entries once its own kernel-sized buffer is full.
const READDIR_BUFFER: usize = 4096;

/// A fuser reply object that can always be failed.
trait Replier: Send + 'static {
    fn error(self, errno: c_int);
}

macro_rules! replier {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Replier for $ty {
                fn error(self, errno: c_int) {
                    <$ty>::error(self, errno)
                }
            }
        )*
    };
}

replier!(
    ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs,
    ReplyWrite, ReplyXattr,
);

/// `forget` has nothing to answer.
impl Replier for () {
    fn error(self, _errno: c_int) {}
}

fn file_type(kind: FileType) -> fuser::FileType {
    match kind {
        FileType::NamedPipe => fuser::FileType::NamedPipe,
        FileType::CharDevice => fuser::FileType::CharDevice,
        FileType::BlockDevice => fuser::FileType::BlockDevice,
        FileType::Directory => fuser::FileType::Directory,
        FileType::RegularFile => fuser::FileType::RegularFile,
        FileType::Symlink => fuser::FileType::Symlink,
        FileType::Socket => fuser::FileType::Socket,
    }
}

fn file_attr(attr: &FileAttr) -> fuser::FileAttr {
    fuser::FileAttr {
        ino: attr.ino,
        size: attr.size,
        blocks: attr.blocks,
        atime: attr.atime,
        mtime: attr.mtime,
        ctime: attr.ctime,
        crtime: attr.ctime,
        kind: file_type(attr.kind),
        perm: attr.perm,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: attr.rdev,
        blksize: attr.blksize,
        flags: 0,
    }
}

fn system_time(time: TimeOrNow) -> SystemTime {
    match time {
        TimeOrNow::SpecificTime(time) => time,
        TimeOrNow::Now => SystemTime::now(),
    }
}

fn open_flags(info: &FileInfo) -> u32 {
    let mut flags = 0;
    if info.direct_io {
        flags |= FOPEN_DIRECT_IO;
    }
    if info.keep_cache {
        flags |= FOPEN_KEEP_CACHE;
    }
    if info.nonseekable {
        flags |= FOPEN_NONSEEKABLE;
    }
    flags
}

/// Map one `-o` value onto fuser's option set.
pub fn mount_option(option: &str) -> MountOption {
    match option {
        "ro" => MountOption::RO,
        "rw" => MountOption::RW,
        "allow_other" => MountOption::AllowOther,
        "allow_root" => MountOption::AllowRoot,
        "auto_unmount" => MountOption::AutoUnmount,
        "default_permissions" => MountOption::DefaultPermissions,
        "dev" => MountOption::Dev,
        "nodev" => MountOption::NoDev,
        "suid" => MountOption::Suid,
        "nosuid" => MountOption::NoSuid,
        "exec" => MountOption::Exec,
        "noexec" => MountOption::NoExec,
        "atime" => MountOption::Atime,
        "noatime" => MountOption::NoAtime,
        "dirsync" => MountOption::DirSync,
        "sync" => MountOption::Sync,
        "async" => MountOption::Async,
        other => {
            if let Some(name) = other.strip_prefix("fsname=") {
                MountOption::FSName(name.to_owned())
            } else if let Some(name) = other.strip_prefix("subtype=") {
                MountOption::Subtype(name.to_owned())
            } else {
                MountOption::CUSTOM(other.to_owned())
            }
        }
    }
}

/// Options for a mount: the `-o` values plus a default name and subtype.
pub fn mount_options(args: &FuseArgs) -> Vec<MountOption> {
    let mut options: Vec<MountOption> = args.mount_options().iter().map(|o| mount_option(o)).collect();
    if !options.iter().any(|o| matches!(o, MountOption::FSName(_))) {
        options.push(MountOption::FSName("fsbridge".to_string()));
    }
    if !options.iter().any(|o| matches!(o, MountOption::Subtype(_))) {
        options.push(MountOption::Subtype("fsbridge".to_string()));
    }
    options
}

/// `fuser::Filesystem` for one mountpoint, forwarding into the bridge.
pub struct FuserEntryPoints {
    mountpoint: PathBuf,
    requests: Arc<RequestRegistry>,
    entry_points: RequestEntryPoints,
    sink: Arc<dyn ReplySink>,
}

impl FuserEntryPoints {
    pub fn new(bridge: &Bridge, mountpoint: impl Into<PathBuf>) -> Self {
        Self {
            mountpoint: mountpoint.into(),
            requests: Arc::clone(bridge.requests()),
            entry_points: bridge.entry_points().clone(),
            sink: bridge.dispatch_sink(),
        }
    }

    /// Register a request whose single terminal reply completes `reply`.
    ///
    /// Error replies fail the fuser request directly; anything else goes to
    /// `complete`, which hands the reply object back when the shape is wrong.
    fn issue<R, F>(&self, req: &Request<'_>, op: &'static str, reply: R, complete: F) -> NativeRequest
    where
        R: Replier,
        F: FnOnce(R, Reply<'_>) -> Option<R> + Send + 'static,
    {
        let mut pending = Some((reply, complete));
        let id = self.requests.allocate(&self.mountpoint, move |answer| {
            let Some((reply, complete)) = pending.take() else {
                return -libc::EPROTO;
            };
            match answer {
                Reply::Err(errno) if errno != 0 => reply.error(errno),
                answer => {
                    let kind = answer.kind();
                    if let Some(reply) = complete(reply, answer) {
                        warn!(target: "fsbridge::fuse", op, reply = %kind, "reply does not fit the request");
                        reply.error(libc::EIO);
                    }
                }
            }
            0
        });
        self.native_request(req, id)
    }

    fn native_request(&self, req: &Request<'_>, id: fsbridge_core::RequestId) -> NativeRequest {
        NativeRequest::new(id, self.mountpoint.clone()).with_caller(req.uid(), req.gid(), req.pid())
    }

    /// Entry points reply synchronously, so anything still pending here got
    /// no reply. Dropping its fuser reply object fails the kernel request.
    fn finished(&self, op: &'static str, native: &NativeRequest, status: c_int) {
        if status != 0 {
            debug!(target: "fsbridge::fuse", op, request_id = %native.id, status, "reply dispatch returned non-zero");
        }
        if self.requests.release(native.id) {
            error!(target: "fsbridge::fuse", op, request_id = %native.id, "entry point returned without replying");
        }
    }
}

fn entry_reply(reply: ReplyEntry, answer: Reply<'_>) -> Option<ReplyEntry> {
    match answer {
        Reply::Entry(entry) => {
            reply.entry(&entry.entry_timeout, &file_attr(&entry.attr), entry.generation);
            None
        }
        _ => Some(reply),
    }
}

fn attr_reply(reply: ReplyAttr, answer: Reply<'_>) -> Option<ReplyAttr> {
    match answer {
        Reply::Attr { attr, timeout } => {
            reply.attr(&timeout, &file_attr(&attr));
            None
        }
        _ => Some(reply),
    }
}

fn empty_reply(reply: ReplyEmpty, answer: Reply<'_>) -> Option<ReplyEmpty> {
    match answer {
        Reply::Err(0) => {
            reply.ok();
            None
        }
        _ => Some(reply),
    }
}

fn open_reply(reply: ReplyOpen, answer: Reply<'_>) -> Option<ReplyOpen> {
    match answer {
        Reply::Open(info) => {
            reply.opened(info.fh, open_flags(&info));
            None
        }
        _ => Some(reply),
    }
}

fn xattr_reply(reply: ReplyXattr, answer: Reply<'_>) -> Option<ReplyXattr> {
    match answer {
        Reply::Xattr(size) => {
            reply.size(u32::try_from(size).unwrap_or(u32::MAX));
            None
        }
        Reply::Buf(buf) => {
            reply.data(&buf);
            None
        }
        _ => Some(reply),
    }
}

impl fuser::Filesystem for FuserEntryPoints {
    fn init(&mut self, _req: &Request, _config: &mut fuser::KernelConfig) -> Result<(), c_int> {
        match self.entry_points.init(&self.mountpoint) {
            Ok(()) => {
                info!(target: "fsbridge::fuse", mountpoint = %self.mountpoint.display(), "filesystem initialized");
                Ok(())
            }
            Err(err) => {
                error!(target: "fsbridge::fuse", mountpoint = %self.mountpoint.display(), error = %err, "filesystem init failed");
                Err(err.errno())
            }
        }
    }

    fn destroy(&mut self) {
        self.entry_points.destroy(&self.mountpoint);
        info!(target: "fsbridge::fuse", mountpoint = %self.mountpoint.display(), "filesystem destroyed");
    }

    fn lookup(&mut self, req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let native = self.issue(req, "lookup", reply, entry_reply);
        let status = self.entry_points.lookup(&native, parent, name, self.sink.as_ref());
        self.finished("lookup", &native, status);
    }

    fn forget(&mut self, req: &Request, ino: u64, nlookup: u64) {
        let native = self.issue(req, "forget", (), |(), answer| match answer {
            Reply::None => None,
            _ => Some(()),
        });
        let status = self.entry_points.forget(&native, ino, nlookup, self.sink.as_ref());
        self.finished("forget", &native, status);
    }

    fn getattr(&mut self, req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let native = self.issue(req, "getattr", reply, attr_reply);
        let status = self.entry_points.getattr(&native, ino, self.sink.as_ref());
        self.finished("getattr", &native, status);
    }

    fn setattr(
        &mut self,
        req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let changes = SetAttr {
            mode,
            uid,
            gid,
            size,
            atime: atime.map(system_time),
            mtime: mtime.map(system_time),
            fh,
        };
        let native = self.issue(req, "setattr", reply, attr_reply);
        let status = self.entry_points.setattr(&native, ino, changes, self.sink.as_ref());
        self.finished("setattr", &native, status);
    }

    fn readlink(&mut self, req: &Request, ino: u64, reply: ReplyData) {
        let native = self.issue(req, "readlink", reply, |reply, answer| match answer {
            Reply::Readlink(target) => {
                reply.data(target.as_bytes());
                None
            }
            _ => Some(reply),
        });
        let status = self.entry_points.readlink(&native, ino, self.sink.as_ref());
        self.finished("readlink", &native, status);
    }

    fn mknod(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        let native = self.issue(req, "mknod", reply, entry_reply);
        let status = self
            .entry_points
            .mknod(&native, parent, name, mode & !umask, rdev, self.sink.as_ref());
        self.finished("mknod", &native, status);
    }

    fn mkdir(&mut self, req: &Request, parent: u64, name: &OsStr, mode: u32, umask: u32, reply: ReplyEntry) {
        let native = self.issue(req, "mkdir", reply, entry_reply);
        let status = self
            .entry_points
            .mkdir(&native, parent, name, mode & !umask, self.sink.as_ref());
        self.finished("mkdir", &native, status);
    }

    fn unlink(&mut self, req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let native = self.issue(req, "unlink", reply, empty_reply);
        let status = self.entry_points.unlink(&native, parent, name, self.sink.as_ref());
        self.finished("unlink", &native, status);
    }

    fn rmdir(&mut self, req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let native = self.issue(req, "rmdir", reply, empty_reply);
        let status = self.entry_points.rmdir(&native, parent, name, self.sink.as_ref());
        self.finished("rmdir", &native, status);
    }

    fn symlink(&mut self, req: &Request, parent: u64, link_name: &OsStr, target: &Path, reply: ReplyEntry) {
        let native = self.issue(req, "symlink", reply, entry_reply);
        let status = self
            .entry_points
            .symlink(&native, parent, link_name, target.as_os_str(), self.sink.as_ref());
        self.finished("symlink", &native, status);
    }

    /// `RENAME_EXCHANGE` and `RENAME_NOREPLACE` are not supported.
    fn rename(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        if flags != 0 {
            debug!(target: "fsbridge::fuse", flags, "rename flags not supported");
            reply.error(libc::EINVAL);
            return;
        }
        let native = self.issue(req, "rename", reply, empty_reply);
        let status = self
            .entry_points
            .rename(&native, parent, name, newparent, newname, self.sink.as_ref());
        self.finished("rename", &native, status);
    }

    fn link(&mut self, req: &Request, ino: u64, newparent: u64, newname: &OsStr, reply: ReplyEntry) {
        let native = self.issue(req, "link", reply, entry_reply);
        let status = self
            .entry_points
            .link(&native, ino, newparent, newname, self.sink.as_ref());
        self.finished("link", &native, status);
    }

    fn open(&mut self, req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        let native = self.issue(req, "open", reply, open_reply);
        let status = self.entry_points.open(&native, ino, flags, self.sink.as_ref());
        self.finished("open", &native, status);
    }

    fn read(
        &mut self,
        req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let native = self.issue(req, "read", reply, |reply, answer| match answer {
            Reply::Buf(buf) => {
                reply.data(&buf);
                None
            }
            _ => Some(reply),
        });
        let status = self
            .entry_points
            .read(&native, ino, fh, offset, size, self.sink.as_ref());
        self.finished("read", &native, status);
    }

    fn write(
        &mut self,
        req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let native = self.issue(req, "write", reply, |reply, answer| match answer {
            Reply::Write(count) => {
                reply.written(u32::try_from(count).unwrap_or(u32::MAX));
                None
            }
            _ => Some(reply),
        });
        let status = self.entry_points.write(
            &native,
            ino,
            fh,
            offset,
            NativeBuf::from_slice(data),
            self.sink.as_ref(),
        );
        self.finished("write", &native, status);
    }

    fn flush(&mut self, req: &Request, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        let native = self.issue(req, "flush", reply, empty_reply);
        let status = self.entry_points.flush(&native, ino, fh, self.sink.as_ref());
        self.finished("flush", &native, status);
    }

    fn release(
        &mut self,
        req: &Request,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let native = self.issue(req, "release", reply, empty_reply);
        let status = self.entry_points.release(&native, ino, fh, self.sink.as_ref());
        self.finished("release", &native, status);
    }

    fn fsync(&mut self, req: &Request, ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        let native = self.issue(req, "fsync", reply, empty_reply);
        let status = self.entry_points.fsync(&native, ino, fh, datasync, self.sink.as_ref());
        self.finished("fsync", &native, status);
    }

    fn opendir(&mut self, req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        let native = self.issue(req, "opendir", reply, open_reply);
        let status = self.entry_points.opendir(&native, ino, flags, self.sink.as_ref());
        self.finished("opendir", &native, status);
    }

    /// Entries are added to the fuser buffer as they are reported; the final
    /// buffer reply only completes the request.
    fn readdir(&mut self, req: &Request, ino: u64, fh: u64, offset: i64, reply: ReplyDirectory) {
        let mut pending = Some(reply);
        let id = self.requests.allocate(&self.mountpoint, move |answer| match answer {
            Reply::AddDirentry { buf, name, attr, off } => match pending.as_mut() {
                Some(reply) => {
                    let full = reply.add(attr.ino, off, file_type(attr.kind), &name);
                    if full {
                        0
                    } else {
                        buf.len() as c_int
                    }
                }
                None => -libc::EPROTO,
            },
            Reply::Buf(_) => match pending.take() {
                Some(reply) => {
                    reply.ok();
                    0
                }
                None => -libc::EPROTO,
            },
            other => match pending.take() {
                Some(reply) => {
                    match other {
                        Reply::Err(errno) if errno != 0 => reply.error(errno),
                        _ => reply.error(libc::EIO),
                    }
                    0
                }
                None => -libc::EPROTO,
            },
        });
        let native = self.native_request(req, id);
        let status = self
            .entry_points
            .readdir(&native, ino, fh, offset, READDIR_BUFFER, self.sink.as_ref());
        self.finished("readdir", &native, status);
    }

    fn releasedir(&mut self, req: &Request, ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        let native = self.issue(req, "releasedir", reply, empty_reply);
        let status = self.entry_points.releasedir(&native, ino, fh, self.sink.as_ref());
        self.finished("releasedir", &native, status);
    }

    fn fsyncdir(&mut self, req: &Request, ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        let native = self.issue(req, "fsyncdir", reply, empty_reply);
        let status = self.entry_points.fsyncdir(&native, ino, fh, datasync, self.sink.as_ref());
        self.finished("fsyncdir", &native, status);
    }

    fn statfs(&mut self, req: &Request, ino: u64, reply: ReplyStatfs) {
        let native = self.issue(req, "statfs", reply, |reply, answer| match answer {
            Reply::Statfs(st) => {
                reply.statfs(st.blocks, st.bfree, st.bavail, st.files, st.ffree, st.bsize, st.namelen, st.frsize);
                None
            }
            _ => Some(reply),
        });
        let status = self.entry_points.statfs(&native, ino, self.sink.as_ref());
        self.finished("statfs", &native, status);
    }

    fn setxattr(
        &mut self,
        req: &Request,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let native = self.issue(req, "setxattr", reply, empty_reply);
        let status = self.entry_points.setxattr(
            &native,
            ino,
            name,
            NativeBuf::from_slice(value),
            flags,
            self.sink.as_ref(),
        );
        self.finished("setxattr", &native, status);
    }

    fn getxattr(&mut self, req: &Request, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let native = self.issue(req, "getxattr", reply, xattr_reply);
        let status = self.entry_points.getxattr(&native, ino, name, size, self.sink.as_ref());
        self.finished("getxattr", &native, status);
    }

    fn listxattr(&mut self, req: &Request, ino: u64, size: u32, reply: ReplyXattr) {
        let native = self.issue(req, "listxattr", reply, xattr_reply);
        let status = self.entry_points.listxattr(&native, ino, size, self.sink.as_ref());
        self.finished("listxattr", &native, status);
    }

    fn removexattr(&mut self, req: &Request, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let native = self.issue(req, "removexattr", reply, empty_reply);
        let status = self.entry_points.removexattr(&native, ino, name, self.sink.as_ref());
        self.finished("removexattr", &native, status);
    }

    fn access(&mut self, req: &Request, ino: u64, mask: i32, reply: ReplyEmpty) {
        let native = self.issue(req, "access", reply, empty_reply);
        let status = self.entry_points.access(&native, ino, mask, self.sink.as_ref());
        self.finished("access", &native, status);
    }

    fn create(
        &mut self,
        req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let native = self.issue(req, "create", reply, |reply, answer| match answer {
            Reply::Create { entry, info } => {
                reply.created(
                    &entry.entry_timeout,
                    &file_attr(&entry.attr),
                    entry.generation,
                    info.fh,
                    open_flags(&info),
                );
                None
            }
            _ => Some(reply),
        });
        let status = self
            .entry_points
            .create(&native, parent, name, mode & !umask, flags, self.sink.as_ref());
        self.finished("create", &native, status);
    }
}

struct MountSlot {
    session: Option<Session<FuserEntryPoints>>,
    unmounter: Option<SessionUnmounter>,
}

/// `NativeLoop` over fuser sessions.
///
/// fuser opens the channel and the session in one step, so `mount` creates
/// the session and `new_session` only confirms it. Both handles name the
/// same slot.
pub struct FuserLoop {
    bridge: Arc<Bridge>,
    next_handle: AtomicUsize,
    slots: Mutex<HashMap<usize, MountSlot>>,
}

impl FuserLoop {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self {
            bridge,
            next_handle: AtomicUsize::new(1),
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<usize, MountSlot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NativeLoop for FuserLoop {
    fn parse_mountpoint(&self, args: &FuseArgs) -> Option<PathBuf> {
        args.mountpoint()
    }

    fn mount(&self, mountpoint: &Path, args: &FuseArgs) -> Option<ChannelHandle> {
        let options = mount_options(args);
        debug!(target: "fsbridge::fuse", mountpoint = %mountpoint.display(), ?options, "mounting");
        let filesystem = FuserEntryPoints::new(&self.bridge, mountpoint);
        let mut session = match Session::new(filesystem, mountpoint, &options) {
            Ok(session) => session,
            Err(err) => {
                error!(target: "fsbridge::fuse", mountpoint = %mountpoint.display(), error = %err, "fuse mount failed");
                return None;
            }
        };
        let unmounter = session.unmount_callable();
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.slots().insert(
            handle,
            MountSlot {
                session: Some(session),
                unmounter: Some(unmounter),
            },
        );
        ChannelHandle::from_raw(handle)
    }

    fn new_session(&self, _mountpoint: &Path, _args: &FuseArgs, channel: ChannelHandle) -> Option<SessionHandle> {
        let raw = channel.as_raw();
        let ready = self.slots().get(&raw).is_some_and(|slot| slot.session.is_some());
        if ready {
            SessionHandle::from_raw(raw)
        } else {
            None
        }
    }

    fn run(&self, mountpoint: &Path, session: SessionHandle, _channel: ChannelHandle) -> c_int {
        let taken = self
            .slots()
            .get_mut(&session.as_raw())
            .and_then(|slot| slot.session.take());
        let Some(mut fuse_session) = taken else {
            error!(target: "fsbridge::fuse", mountpoint = %mountpoint.display(), "no session to run");
            return -libc::EINVAL;
        };

        let status = match fuse_session.run() {
            Ok(()) => 0,
            Err(err) => {
                error!(target: "fsbridge::fuse", mountpoint = %mountpoint.display(), error = %err, "fuse session failed");
                -err.raw_os_error().unwrap_or(libc::EIO)
            }
        };
        self.slots().remove(&session.as_raw());
        status
    }

    fn exit(&self, mountpoint: &Path, session: SessionHandle, _channel: ChannelHandle) {
        let unmounter = self
            .slots()
            .get_mut(&session.as_raw())
            .and_then(|slot| slot.unmounter.take());
        match unmounter {
            Some(mut unmounter) => {
                if let Err(err) = unmounter.unmount() {
                    error!(target: "fsbridge::fuse", mountpoint = %mountpoint.display(), error = %err, "fuse unmount failed");
                }
            }
            None => debug!(target: "fsbridge::fuse", mountpoint = %mountpoint.display(), "session already gone"),
        }
    }

    fn unmount(&self, mountpoint: &Path, channel: ChannelHandle) {
        // dropping an unrun session unmounts it
        if self.slots().remove(&channel.as_raw()).is_some() {
            info!(target: "fsbridge::fuse", mountpoint = %mountpoint.display(), "released fuse mount");
        }
    }
}
