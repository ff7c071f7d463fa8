// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Where request entry points send their replies

use crate::dispatch::ReplyDispatcher;
use crate::native::NativeRequest;
use crate::reply::Reply;
use libc::c_int;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::sync::Arc;
use tracing::error;

/// Native reply channel for a request; returns the native status code.
pub trait ReplySink: Send + Sync {
    fn send(&self, req: &NativeRequest, reply: Reply<'_>) -> c_int;
}

/// Hands typed replies straight to the dispatcher.
#[derive(Clone)]
pub struct DispatchSink {
    dispatcher: Arc<ReplyDispatcher>,
}

impl DispatchSink {
    pub fn new(dispatcher: Arc<ReplyDispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl ReplySink for DispatchSink {
    fn send(&self, req: &NativeRequest, reply: Reply<'_>) -> c_int {
        self.dispatcher.dispatch(req.id, reply)
    }
}

/// Lowers every reply into the native structures and enters through the raw
/// dispatcher entry points, the path an intercepted native reply function
/// takes.
#[derive(Clone)]
pub struct RawReplySink {
    dispatcher: Arc<ReplyDispatcher>,
}

impl RawReplySink {
    pub fn new(dispatcher: Arc<ReplyDispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl ReplySink for RawReplySink {
    fn send(&self, req: &NativeRequest, reply: Reply<'_>) -> c_int {
        let d = &self.dispatcher;
        let id = req.id;
        // SAFETY: every pointer below refers to a local that outlives the call.
        unsafe {
            match reply {
                Reply::Err(errno) => d.reply_err(id, errno),
                Reply::None => {
                    d.reply_none(id);
                    0
                }
                Reply::Entry(entry) => d.reply_entry(id, &entry.to_raw()),
                Reply::Attr { attr, timeout } => {
                    d.reply_attr(id, &attr.to_stat(), timeout.as_secs_f64())
                }
                Reply::Xattr(size) => d.reply_xattr(id, size as usize),
                Reply::Statfs(stats) => d.reply_statfs(id, &stats.to_statvfs()),
                Reply::Readlink(target) => match CString::new(target.as_bytes()) {
                    Ok(link) => d.reply_readlink(id, link.as_ptr()),
                    Err(_) => {
                        error!(target: "fsbridge::dispatch", request_id = %id, "symlink target contains a NUL byte");
                        d.reply_err(id, libc::EIO)
                    }
                },
                Reply::Open(info) => d.reply_open(id, &info.to_raw()),
                Reply::Create { entry, info } => d.reply_create(id, &entry.to_raw(), &info.to_raw()),
                Reply::Write(count) => d.reply_write(id, count as usize),
                Reply::Buf(buf) => d.reply_buf(id, buf.as_ptr().cast(), buf.len()),
                Reply::AddDirentry {
                    buf,
                    name,
                    attr,
                    off,
                } => match CString::new(name.as_bytes()) {
                    Ok(name) => d.add_direntry(
                        id,
                        buf.as_ptr().cast(),
                        buf.len(),
                        name.as_ptr(),
                        &attr.to_stat(),
                        off as libc::off_t,
                    ),
                    Err(_) => -libc::EINVAL,
                },
            }
        }
    }
}
