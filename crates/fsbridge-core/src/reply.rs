// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The closed set of reply shapes a request can be answered with

use crate::buffer::NativeBuf;
use crate::error::FsError;
use crate::types::{EntryParam, FileAttr, FileInfo, StatFs};
use libc::c_int;
use std::ffi::OsString;
use std::fmt;
use std::time::Duration;

/// A typed reply payload.
///
/// `Buf` and `AddDirentry` borrow native memory that is only valid while the
/// reply is being dispatched; handlers copy what they keep.
#[derive(Debug)]
pub enum Reply<'a> {
    /// `0` reports success for operations without a payload
    Err(c_int),
    None,
    Entry(EntryParam),
    Attr {
        attr: FileAttr,
        timeout: Duration,
    },
    Xattr(u64),
    Statfs(StatFs),
    Readlink(OsString),
    Open(FileInfo),
    Create {
        entry: EntryParam,
        info: FileInfo,
    },
    Write(u64),
    Buf(NativeBuf<'a>),
    /// One directory entry appended to a readdir buffer; does not complete the request
    AddDirentry {
        buf: NativeBuf<'a>,
        name: OsString,
        attr: FileAttr,
        off: i64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReplyKind {
    Err,
    None,
    Entry,
    Attr,
    Xattr,
    Statfs,
    Readlink,
    Open,
    Create,
    Write,
    Buf,
    AddDirentry,
}

impl ReplyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReplyKind::Err => "err",
            ReplyKind::None => "none",
            ReplyKind::Entry => "entry",
            ReplyKind::Attr => "attr",
            ReplyKind::Xattr => "xattr",
            ReplyKind::Statfs => "statfs",
            ReplyKind::Readlink => "readlink",
            ReplyKind::Open => "open",
            ReplyKind::Create => "create",
            ReplyKind::Write => "write",
            ReplyKind::Buf => "buf",
            ReplyKind::AddDirentry => "add_direntry",
        }
    }
}

impl fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Reply<'_> {
    pub fn kind(&self) -> ReplyKind {
        match self {
            Reply::Err(_) => ReplyKind::Err,
            Reply::None => ReplyKind::None,
            Reply::Entry(_) => ReplyKind::Entry,
            Reply::Attr { .. } => ReplyKind::Attr,
            Reply::Xattr(_) => ReplyKind::Xattr,
            Reply::Statfs(_) => ReplyKind::Statfs,
            Reply::Readlink(_) => ReplyKind::Readlink,
            Reply::Open(_) => ReplyKind::Open,
            Reply::Create { .. } => ReplyKind::Create,
            Reply::Write(_) => ReplyKind::Write,
            Reply::Buf(_) => ReplyKind::Buf,
            Reply::AddDirentry { .. } => ReplyKind::AddDirentry,
        }
    }

    /// Whether this reply completes its request.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Reply::AddDirentry { .. })
    }

    pub fn ok() -> Reply<'static> {
        Reply::Err(0)
    }
}

impl From<FsError> for Reply<'static> {
    fn from(err: FsError) -> Self {
        Reply::Err(err.errno())
    }
}
