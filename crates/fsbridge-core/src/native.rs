// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Seams to the native event loop
//!
//! The loop itself is external. `NativeLoop` covers mount-time setup and the
//! blocking run; `NativeOps` covers the native bridging calls a request is
//! issued through. Native resources are only ever held as opaque handles.

use crate::buffer::NativeBuf;
use crate::error::{BridgeError, BridgeResult};
use crate::requests::RequestId;
use crate::types::SetAttr;
use libc::c_int;
use std::ffi::{CStr, CString, OsStr};
use std::num::NonZeroUsize;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Opaque native channel (`struct fuse_chan`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelHandle(NonZeroUsize);

/// Opaque native session (`struct fuse_session`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionHandle(NonZeroUsize);

macro_rules! opaque_handle {
    ($name:ident) => {
        impl $name {
            /// `None` for the null handle.
            pub fn from_raw(raw: usize) -> Option<Self> {
                NonZeroUsize::new(raw).map(Self)
            }

            pub fn as_raw(self) -> usize {
                self.0.get()
            }
        }
    };
}

opaque_handle!(ChannelHandle);
opaque_handle!(SessionHandle);

/// Argument vector in the native loop's command-line conventions
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FuseArgs {
    argv: Vec<CString>,
}

impl FuseArgs {
    pub const HELP_FLAG: &'static CStr = c"-h";

    /// Build the vector, appending the help flag when nothing but the
    /// program name was supplied.
    pub fn new<I, S>(args: I) -> BridgeResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut argv = args
            .into_iter()
            .map(|arg| {
                CString::new(arg.as_ref().as_bytes()).map_err(|_| {
                    BridgeError::InvalidArgument(format!(
                        "argument contains a NUL byte: {}",
                        arg.as_ref().to_string_lossy()
                    ))
                })
            })
            .collect::<BridgeResult<Vec<_>>>()?;
        if argv.len() < 2 {
            argv.push(Self::HELP_FLAG.to_owned());
        }
        Ok(Self { argv })
    }

    pub fn argv(&self) -> &[CString] {
        &self.argv
    }

    pub fn len(&self) -> usize {
        self.argv.len()
    }

    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OsStr> {
        self.argv.iter().map(|arg| OsStr::from_bytes(arg.as_bytes()))
    }

    /// True when the vector asks for usage output instead of a mount
    pub fn wants_help(&self) -> bool {
        self.iter().skip(1).any(|arg| arg == "-h" || arg == "--help")
    }

    /// First positional argument, skipping `-o` values; `None` when help
    /// was requested.
    pub fn mountpoint(&self) -> Option<PathBuf> {
        if self.wants_help() {
            return None;
        }
        let mut iter = self.iter().skip(1);
        while let Some(arg) = iter.next() {
            if arg == "-o" {
                iter.next();
            } else if !arg.as_bytes().starts_with(b"-") {
                return Some(PathBuf::from(arg));
            }
        }
        None
    }

    /// Comma-separated `-o` values, in order.
    pub fn mount_options(&self) -> Vec<String> {
        let mut options = Vec::new();
        let mut iter = self.iter().skip(1);
        while let Some(arg) = iter.next() {
            let value = if arg == "-o" {
                iter.next()
            } else {
                arg.to_str().and_then(|a| a.strip_prefix("-o")).map(OsStr::new)
            };
            if let Some(value) = value {
                options.extend(
                    value
                        .to_string_lossy()
                        .split(',')
                        .filter(|o| !o.is_empty())
                        .map(str::to_owned),
                );
            }
        }
        options
    }
}

pub trait NativeLoop: Send + Sync {
    /// Mountpoint named by the arguments, `None` on parse failure.
    fn parse_mountpoint(&self, args: &FuseArgs) -> Option<PathBuf>;

    /// Mount and open the channel, `None` on failure.
    fn mount(&self, mountpoint: &Path, args: &FuseArgs) -> Option<ChannelHandle>;

    /// Create a session over `channel`, `None` on failure.
    fn new_session(
        &self,
        mountpoint: &Path,
        args: &FuseArgs,
        channel: ChannelHandle,
    ) -> Option<SessionHandle>;

    /// Run the event loop; blocks until the session exits.
    fn run(&self, mountpoint: &Path, session: SessionHandle, channel: ChannelHandle) -> c_int;

    /// Ask a running session to exit and unmount.
    fn exit(&self, mountpoint: &Path, session: SessionHandle, channel: ChannelHandle);

    /// Release a channel that never got a session.
    fn unmount(&self, mountpoint: &Path, channel: ChannelHandle);
}

/// Request context handed across the boundary: an identifier instead of a pointer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeRequest {
    pub id: RequestId,
    pub mountpoint: PathBuf,
    pub uid: u32,
    pub gid: u32,
    pub pid: u32,
}

impl NativeRequest {
    pub fn new(id: RequestId, mountpoint: impl Into<PathBuf>) -> Self {
        Self {
            id,
            mountpoint: mountpoint.into(),
            uid: 0,
            gid: 0,
            pid: 0,
        }
    }

    pub fn with_caller(mut self, uid: u32, gid: u32, pid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self.pid = pid;
        self
    }
}

/// Native bridging calls. Each one eventually answers through the reply
/// dispatcher with `req.id`, possibly on another thread.
pub trait NativeOps: Send + Sync {
    fn lookup(&self, req: NativeRequest, parent: u64, name: &OsStr);
    fn forget(&self, req: NativeRequest, ino: u64, nlookup: u64);
    fn getattr(&self, req: NativeRequest, ino: u64);
    fn setattr(&self, req: NativeRequest, ino: u64, changes: SetAttr);
    fn readlink(&self, req: NativeRequest, ino: u64);
    fn mknod(&self, req: NativeRequest, parent: u64, name: &OsStr, mode: u32, rdev: u32);
    fn mkdir(&self, req: NativeRequest, parent: u64, name: &OsStr, mode: u32);
    fn unlink(&self, req: NativeRequest, parent: u64, name: &OsStr);
    fn rmdir(&self, req: NativeRequest, parent: u64, name: &OsStr);
    fn symlink(&self, req: NativeRequest, parent: u64, name: &OsStr, target: &OsStr);
    fn rename(&self, req: NativeRequest, parent: u64, name: &OsStr, newparent: u64, newname: &OsStr);
    fn link(&self, req: NativeRequest, ino: u64, newparent: u64, newname: &OsStr);
    fn open(&self, req: NativeRequest, ino: u64, flags: i32);
    fn read(&self, req: NativeRequest, ino: u64, fh: u64, offset: i64, size: u32);
    fn write(&self, req: NativeRequest, ino: u64, fh: u64, offset: i64, data: NativeBuf<'_>);
    fn flush(&self, req: NativeRequest, ino: u64, fh: u64);
    fn release(&self, req: NativeRequest, ino: u64, fh: u64);
    fn fsync(&self, req: NativeRequest, ino: u64, fh: u64, datasync: bool);
    fn opendir(&self, req: NativeRequest, ino: u64, flags: i32);
    fn readdir(&self, req: NativeRequest, ino: u64, fh: u64, offset: i64, size: usize);
    fn releasedir(&self, req: NativeRequest, ino: u64, fh: u64);
    fn fsyncdir(&self, req: NativeRequest, ino: u64, fh: u64, datasync: bool);
    fn statfs(&self, req: NativeRequest, ino: u64);
    fn setxattr(&self, req: NativeRequest, ino: u64, name: &OsStr, value: NativeBuf<'_>, flags: i32);
    fn getxattr(&self, req: NativeRequest, ino: u64, name: &OsStr, size: u32);
    fn listxattr(&self, req: NativeRequest, ino: u64, size: u32);
    fn removexattr(&self, req: NativeRequest, ino: u64, name: &OsStr);
    fn access(&self, req: NativeRequest, ino: u64, mask: i32);
    fn create(&self, req: NativeRequest, parent: u64, name: &OsStr, mode: u32, flags: i32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_program_name_gets_help_flag() {
        let args = FuseArgs::new(["prog"]).unwrap();
        assert_eq!(args.len(), 2);
        assert!(args.wants_help());

        let args = FuseArgs::new(Vec::<String>::new()).unwrap();
        assert_eq!(args.iter().collect::<Vec<_>>(), vec![OsStr::new("-h")]);
    }

    #[test]
    fn mount_arguments_are_kept_verbatim() {
        let args = FuseArgs::new(["prog", "/tmp/mnt", "-o", "ro"]).unwrap();
        let collected: Vec<_> = args.iter().collect();
        assert_eq!(collected, ["prog", "/tmp/mnt", "-o", "ro"].map(OsStr::new).to_vec());
        assert!(!args.wants_help());
    }

    #[test]
    fn mountpoint_and_options_are_separated() {
        let args = FuseArgs::new(["prog", "-o", "ro,allow_other", "/tmp/mnt", "-oauto_unmount", "-f"]).unwrap();
        assert_eq!(args.mountpoint(), Some(PathBuf::from("/tmp/mnt")));
        assert_eq!(args.mount_options(), vec!["ro", "allow_other", "auto_unmount"]);
        assert_eq!(FuseArgs::new(["prog", "-f"]).unwrap().mountpoint(), None);
    }

    #[test]
    fn nul_bytes_are_rejected() {
        let err = FuseArgs::new(["prog", "/tmp/\0mnt"]).unwrap_err();
        assert_eq!(err.status(), -1);
    }

    #[test]
    fn null_handles_do_not_exist() {
        assert!(ChannelHandle::from_raw(0).is_none());
        assert_eq!(SessionHandle::from_raw(17).map(SessionHandle::as_raw), Some(17));
    }
}
