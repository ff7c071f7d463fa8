// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Capability interface implemented by filesystems mounted through the bridge

use crate::error::{FsError, FsResult};
use crate::types::{DirEntry, EntryParam, FileAttr, FileInfo, SetAttr, StatFs};
use std::ffi::{OsStr, OsString};
use std::time::Duration;

/// Operations are keyed by inode number. Any method left at its default
/// answers `ENOSYS`, except the ones documented otherwise.
///
/// Byte slices handed to `write` alias native memory for the duration of the
/// call only; implementations copy what they keep.
#[cfg_attr(test, mockall::automock)]
pub trait FileSystem: Send + Sync {
    /// Called once the native session is up. Defaults to success.
    fn init(&self) -> FsResult<()> {
        Ok(())
    }

    fn destroy(&self) {}

    fn lookup(&self, _parent: u64, _name: &OsStr) -> FsResult<EntryParam> {
        Err(FsError::NotImplemented)
    }

    /// No reply is sent for forget.
    fn forget(&self, _ino: u64, _nlookup: u64) {}

    fn getattr(&self, _ino: u64) -> FsResult<(FileAttr, Duration)> {
        Err(FsError::NotImplemented)
    }

    /// Apply the fields set in `changes` and answer with the new attributes.
    fn setattr(&self, _ino: u64, _changes: SetAttr) -> FsResult<(FileAttr, Duration)> {
        Err(FsError::NotImplemented)
    }

    fn readlink(&self, _ino: u64) -> FsResult<OsString> {
        Err(FsError::NotImplemented)
    }

    /// `mode` carries the file type bits.
    fn mknod(&self, _parent: u64, _name: &OsStr, _mode: u32, _rdev: u32) -> FsResult<EntryParam> {
        Err(FsError::NotImplemented)
    }

    fn mkdir(&self, _parent: u64, _name: &OsStr, _mode: u32) -> FsResult<EntryParam> {
        Err(FsError::NotImplemented)
    }

    fn unlink(&self, _parent: u64, _name: &OsStr) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    fn rmdir(&self, _parent: u64, _name: &OsStr) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    fn symlink(&self, _parent: u64, _name: &OsStr, _target: &OsStr) -> FsResult<EntryParam> {
        Err(FsError::NotImplemented)
    }

    /// Replaces an existing `newname` when the types are compatible.
    fn rename(&self, _parent: u64, _name: &OsStr, _newparent: u64, _newname: &OsStr) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    fn link(&self, _ino: u64, _newparent: u64, _newname: &OsStr) -> FsResult<EntryParam> {
        Err(FsError::NotImplemented)
    }

    /// Defaults to a stateless open with `fh = 0`.
    fn open(&self, _ino: u64, flags: i32) -> FsResult<FileInfo> {
        Ok(FileInfo::with_handle(0, flags))
    }

    fn read(&self, _ino: u64, _fh: u64, _offset: i64, _size: u32) -> FsResult<Vec<u8>> {
        Err(FsError::NotImplemented)
    }

    fn write(&self, _ino: u64, _fh: u64, _offset: i64, _data: &[u8]) -> FsResult<u64> {
        Err(FsError::NotImplemented)
    }

    /// Called on every close of a descriptor. Defaults to success.
    fn flush(&self, _ino: u64, _fh: u64) -> FsResult<()> {
        Ok(())
    }

    fn release(&self, _ino: u64, _fh: u64) -> FsResult<()> {
        Ok(())
    }

    fn fsync(&self, _ino: u64, _fh: u64, _datasync: bool) -> FsResult<()> {
        Ok(())
    }

    fn opendir(&self, _ino: u64, flags: i32) -> FsResult<FileInfo> {
        Ok(FileInfo::with_handle(0, flags))
    }

    /// Entries at and after `offset`; each entry carries the offset of its successor.
    fn readdir(&self, _ino: u64, _fh: u64, _offset: i64) -> FsResult<Vec<DirEntry>> {
        Err(FsError::NotImplemented)
    }

    fn releasedir(&self, _ino: u64, _fh: u64) -> FsResult<()> {
        Ok(())
    }

    fn fsyncdir(&self, _ino: u64, _fh: u64, _datasync: bool) -> FsResult<()> {
        Ok(())
    }

    fn statfs(&self, _ino: u64) -> FsResult<StatFs> {
        Ok(StatFs {
            bsize: 512,
            namelen: 255,
            ..Default::default()
        })
    }

    /// `flags` is `XATTR_CREATE`, `XATTR_REPLACE` or zero.
    fn setxattr(&self, _ino: u64, _name: &OsStr, _value: &[u8], _flags: i32) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    fn getxattr(&self, _ino: u64, _name: &OsStr) -> FsResult<Vec<u8>> {
        Err(FsError::NotImplemented)
    }

    fn listxattr(&self, _ino: u64) -> FsResult<Vec<OsString>> {
        Err(FsError::NotImplemented)
    }

    fn removexattr(&self, _ino: u64, _name: &OsStr) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    fn access(&self, _ino: u64, _mask: i32) -> FsResult<()> {
        Ok(())
    }

    fn create(
        &self,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _flags: i32,
    ) -> FsResult<(EntryParam, FileInfo)> {
        Err(FsError::NotImplemented)
    }
}
