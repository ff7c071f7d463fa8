// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the bridge and for filesystem implementations

use crate::requests::RequestId;
use libc::c_int;
use std::io;
use std::path::PathBuf;

/// Errors raised by the bridge itself (mount setup, unmount, request issue).
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("no mount point specified")]
    NoMountpoint,
    #[error("failed to create native channel for {0}")]
    ChannelCreation(PathBuf),
    #[error("failed to create native session for {0}")]
    SessionCreation(PathBuf),
    #[error("mount point {0} is already mounted")]
    MountpointInUse(PathBuf),
    #[error("mount point {0} is not mounted")]
    NotMounted(PathBuf),
    #[error("couldn't get current working directory: {0}")]
    CurrentDir(#[source] io::Error),
    #[error("couldn't get absolute path of {path}: {reason}")]
    AbsolutePath { path: PathBuf, reason: String },
    #[error("no reply was delivered for request {0}")]
    NoReply(RequestId),
    #[error("unexpected {kind} reply for request {id}")]
    UnexpectedReply { id: RequestId, kind: &'static str },
    #[error("operation failed with errno {0}")]
    Status(c_int),
}

impl BridgeError {
    /// Negative status reported by a failed mount call.
    pub fn status(&self) -> c_int {
        match self {
            BridgeError::InvalidArgument(_)
            | BridgeError::NoMountpoint
            | BridgeError::CurrentDir(_)
            | BridgeError::AbsolutePath { .. } => -1,
            BridgeError::ChannelCreation(_) => -2,
            BridgeError::SessionCreation(_) => -3,
            BridgeError::MountpointInUse(_) => -4,
            BridgeError::NotMounted(_) => -5,
            BridgeError::NoReply(_) | BridgeError::UnexpectedReply { .. } => -libc::EPROTO,
            BridgeError::Status(errno) => -errno.abs(),
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors returned by `FileSystem` implementations
#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("access denied")]
    AccessDenied,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("directory not empty")]
    NotEmpty,
    #[error("bad file descriptor")]
    BadFileDescriptor,
    #[error("no such attribute")]
    NoAttribute,
    #[error("name too long")]
    NameTooLong,
    #[error("no space left")]
    NoSpace,
    #[error("file too large")]
    FileTooLarge,
    #[error("operation not permitted")]
    NotPermitted,
    #[error("filesystem panicked: {0}")]
    Panicked(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("not implemented")]
    NotImplemented,
    #[error("errno {0}")]
    Errno(c_int),
}

impl FsError {
    /// Native errno carried back in an error reply.
    pub fn errno(&self) -> c_int {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::AccessDenied => libc::EACCES,
            FsError::InvalidArgument => libc::EINVAL,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::IsADirectory => libc::EISDIR,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::BadFileDescriptor => libc::EBADF,
            FsError::NoAttribute => libc::ENODATA,
            FsError::NameTooLong => libc::ENAMETOOLONG,
            FsError::NoSpace => libc::ENOSPC,
            FsError::FileTooLarge => libc::EFBIG,
            FsError::NotPermitted => libc::EPERM,
            FsError::Panicked(_) => libc::EIO,
            FsError::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            FsError::NotImplemented => libc::ENOSYS,
            FsError::Errno(errno) => *errno,
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_failures_are_negative_and_distinct() {
        let parse = BridgeError::NoMountpoint.status();
        let channel = BridgeError::ChannelCreation(PathBuf::from("/mnt")).status();
        let session = BridgeError::SessionCreation(PathBuf::from("/mnt")).status();
        let in_use = BridgeError::MountpointInUse(PathBuf::from("/mnt")).status();
        for status in [parse, channel, session, in_use] {
            assert!(status < 0);
        }
        assert_ne!(parse, channel);
        assert_ne!(channel, session);
        assert_ne!(session, in_use);
    }

    #[test]
    fn io_errors_keep_their_os_errno() {
        let err = FsError::from(io::Error::from_raw_os_error(libc::EROFS));
        assert_eq!(err.errno(), libc::EROFS);
        let err = FsError::from(io::Error::new(io::ErrorKind::Other, "opaque"));
        assert_eq!(err.errno(), libc::EIO);
    }
}
