// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Owned reply payload types shared by filesystems, entry points and handlers

use std::ffi::OsString;
use std::time::{Duration, SystemTime};

/// Inode number of the filesystem root
pub const ROOT_INO: u64 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileType {
    NamedPipe,
    CharDevice,
    BlockDevice,
    Directory,
    RegularFile,
    Symlink,
    Socket,
}

impl FileType {
    /// Decode the `S_IFMT` bits of a mode
    pub fn from_mode(mode: u32) -> Self {
        match mode & libc::S_IFMT as u32 {
            m if m == libc::S_IFDIR as u32 => FileType::Directory,
            m if m == libc::S_IFLNK as u32 => FileType::Symlink,
            m if m == libc::S_IFCHR as u32 => FileType::CharDevice,
            m if m == libc::S_IFBLK as u32 => FileType::BlockDevice,
            m if m == libc::S_IFIFO as u32 => FileType::NamedPipe,
            m if m == libc::S_IFSOCK as u32 => FileType::Socket,
            _ => FileType::RegularFile,
        }
    }

    pub fn mode_bits(self) -> u32 {
        (match self {
            FileType::NamedPipe => libc::S_IFIFO,
            FileType::CharDevice => libc::S_IFCHR,
            FileType::BlockDevice => libc::S_IFBLK,
            FileType::Directory => libc::S_IFDIR,
            FileType::RegularFile => libc::S_IFREG,
            FileType::Symlink => libc::S_IFLNK,
            FileType::Socket => libc::S_IFSOCK,
        }) as u32
    }

    /// `DT_*` value stored in directory entries
    pub fn dirent_type(self) -> u32 {
        self.mode_bits() >> 12
    }
}

/// Attributes of one inode, the owned form of a native `struct stat`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileAttr {
    pub ino: u64,
    pub size: u64,
    pub blocks: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub kind: FileType,
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u32,
    pub blksize: u32,
}

impl FileAttr {
    /// Attributes for a fresh inode with all timestamps at `now`.
    pub fn new(ino: u64, kind: FileType, perm: u16, now: SystemTime) -> Self {
        Self {
            ino,
            size: 0,
            blocks: 0,
            atime: now,
            mtime: now,
            ctime: now,
            kind,
            perm,
            nlink: if kind == FileType::Directory { 2 } else { 1 },
            uid: 0,
            gid: 0,
            rdev: 0,
            blksize: 512,
        }
    }

    /// Full `st_mode` value (type bits plus permissions)
    pub fn mode(&self) -> u32 {
        self.kind.mode_bits() | u32::from(self.perm & 0o7777)
    }
}

/// Answer to a name lookup, mirrors `struct fuse_entry_param`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryParam {
    pub ino: u64,
    pub generation: u64,
    pub attr: FileAttr,
    pub attr_timeout: Duration,
    pub entry_timeout: Duration,
}

impl EntryParam {
    pub fn new(attr: FileAttr, timeout: Duration) -> Self {
        Self {
            ino: attr.ino,
            generation: 0,
            attr,
            attr_timeout: timeout,
            entry_timeout: timeout,
        }
    }
}

/// Open-file information returned by open, opendir and create
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub flags: i32,
    pub fh: u64,
    pub direct_io: bool,
    pub keep_cache: bool,
    pub nonseekable: bool,
}

impl FileInfo {
    pub fn with_handle(fh: u64, flags: i32) -> Self {
        Self {
            flags,
            fh,
            ..Default::default()
        }
    }
}

/// Filesystem statistics, the owned form of a native `struct statvfs`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatFs {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

/// Attribute changes carried by setattr; `None` leaves the field as it is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetAttr {
    /// Permission bits; the file type is never changed
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// New length, truncating or zero-extending
    pub size: Option<u64>,
    pub atime: Option<SystemTime>,
    pub mtime: Option<SystemTime>,
    /// Open handle when the change came through one (ftruncate, fchmod)
    pub fh: Option<u64>,
}

impl SetAttr {
    pub fn is_empty(&self) -> bool {
        self.mode.is_none()
            && self.uid.is_none()
            && self.gid.is_none()
            && self.size.is_none()
            && self.atime.is_none()
            && self.mtime.is_none()
    }
}

/// One directory listing row
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u64,
    /// Offset of the entry following this one
    pub offset: i64,
    pub kind: FileType,
    pub name: OsString,
}
