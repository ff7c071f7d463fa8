// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Reply dispatcher: routes native replies to the handler registered for
//! the request identifier.
//!
//! The `reply_*` methods are the raw entry points native code calls with
//! loop-owned structures. They copy what they need into a [`Reply`] and
//! call [`ReplyDispatcher::dispatch`].

use crate::buffer::NativeBuf;
use crate::config::ViolationPolicy;
use crate::raw::{RawEntryParam, RawFileInfo};
use crate::reply::{Reply, ReplyKind};
use crate::requests::{RequestId, RequestRegistry};
use crate::types::{EntryParam, FileAttr, FileInfo, StatFs};
use libc::{c_char, c_int};
use std::ffi::{CStr, OsString};
use std::os::unix::ffi::OsStringExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

pub struct ReplyDispatcher {
    requests: Arc<RequestRegistry>,
    policy: ViolationPolicy,
}

impl ReplyDispatcher {
    pub fn new(requests: Arc<RequestRegistry>, policy: ViolationPolicy) -> Self {
        Self { requests, policy }
    }

    pub fn requests(&self) -> &Arc<RequestRegistry> {
        &self.requests
    }

    pub fn policy(&self) -> ViolationPolicy {
        self.policy
    }

    /// Deliver `reply` to the handler registered for `id`.
    ///
    /// Terminal replies remove the request before the handler runs, so a
    /// second reply for the same identifier is detected as a violation.
    pub fn dispatch(&self, id: RequestId, reply: Reply<'_>) -> c_int {
        let kind = reply.kind();
        let terminal = reply.is_terminal();
        let Some(mut request) = self.requests.take(id) else {
            return self.violation(id, kind);
        };

        debug!(
            target: "fsbridge::dispatch",
            request_id = %id,
            reply = %kind,
            mountpoint = %request.mountpoint.display(),
            "dispatching reply"
        );
        let status = (request.handler)(reply);

        if !terminal {
            self.requests.restore(request);
        }
        status
    }

    fn violation(&self, id: RequestId, kind: ReplyKind) -> c_int {
        error!(
            target: "fsbridge::dispatch",
            request_id = %id,
            reply = %kind,
            policy = ?self.policy,
            "reply dispatched for a request with no pending handler"
        );
        match self.policy {
            ViolationPolicy::Abort => std::process::abort(),
            ViolationPolicy::Panic => {
                panic!("{} reply dispatched for request {} which has no pending handler", kind, id)
            }
            ViolationPolicy::Report => -libc::EPROTO,
        }
    }

    fn null_payload(&self, id: RequestId, kind: ReplyKind) -> c_int {
        error!(target: "fsbridge::dispatch", request_id = %id, reply = %kind, "native reply carried a null payload");
        -libc::EINVAL
    }

    pub fn reply_err(&self, id: RequestId, err: c_int) -> c_int {
        self.dispatch(id, Reply::Err(err))
    }

    pub fn reply_none(&self, id: RequestId) {
        self.dispatch(id, Reply::None);
    }

    /// # Safety
    ///
    /// `e` must be null or point to a valid `RawEntryParam` for the duration of the call.
    pub unsafe fn reply_entry(&self, id: RequestId, e: *const RawEntryParam) -> c_int {
        match e.as_ref() {
            Some(e) => self.dispatch(id, Reply::Entry(EntryParam::from_raw(e))),
            None => self.null_payload(id, ReplyKind::Entry),
        }
    }

    /// # Safety
    ///
    /// `e` and `fi` must be null or point to valid structures for the duration of the call.
    pub unsafe fn reply_create(
        &self,
        id: RequestId,
        e: *const RawEntryParam,
        fi: *const RawFileInfo,
    ) -> c_int {
        match (e.as_ref(), fi.as_ref()) {
            (Some(e), Some(fi)) => self.dispatch(
                id,
                Reply::Create {
                    entry: EntryParam::from_raw(e),
                    info: FileInfo::from_raw(fi),
                },
            ),
            _ => self.null_payload(id, ReplyKind::Create),
        }
    }

    /// # Safety
    ///
    /// `attr` must be null or point to a valid `stat` for the duration of the call.
    pub unsafe fn reply_attr(&self, id: RequestId, attr: *const libc::stat, timeout: f64) -> c_int {
        match attr.as_ref() {
            Some(attr) => {
                let timeout = if timeout.is_finite() && timeout > 0.0 {
                    Duration::from_secs_f64(timeout)
                } else {
                    Duration::ZERO
                };
                self.dispatch(
                    id,
                    Reply::Attr {
                        attr: FileAttr::from_stat(attr),
                        timeout,
                    },
                )
            }
            None => self.null_payload(id, ReplyKind::Attr),
        }
    }

    /// # Safety
    ///
    /// `link` must be null or a NUL-terminated string valid for the duration of the call.
    pub unsafe fn reply_readlink(&self, id: RequestId, link: *const c_char) -> c_int {
        if link.is_null() {
            return self.null_payload(id, ReplyKind::Readlink);
        }
        let target = OsString::from_vec(CStr::from_ptr(link).to_bytes().to_vec());
        self.dispatch(id, Reply::Readlink(target))
    }

    /// # Safety
    ///
    /// `fi` must be null or point to a valid `RawFileInfo` for the duration of the call.
    pub unsafe fn reply_open(&self, id: RequestId, fi: *const RawFileInfo) -> c_int {
        match fi.as_ref() {
            Some(fi) => self.dispatch(id, Reply::Open(FileInfo::from_raw(fi))),
            None => self.null_payload(id, ReplyKind::Open),
        }
    }

    pub fn reply_write(&self, id: RequestId, count: usize) -> c_int {
        self.dispatch(id, Reply::Write(count as u64))
    }

    /// # Safety
    ///
    /// For a non-zero `size`, `buf` must point to `size` readable bytes for the
    /// duration of the call.
    pub unsafe fn reply_buf(&self, id: RequestId, buf: *const c_char, size: usize) -> c_int {
        match NativeBuf::from_raw(buf.cast(), size) {
            Some(buf) => self.dispatch(id, Reply::Buf(buf)),
            None => self.null_payload(id, ReplyKind::Buf),
        }
    }

    /// # Safety
    ///
    /// `stbuf` must be null or point to a valid `statvfs` for the duration of the call.
    pub unsafe fn reply_statfs(&self, id: RequestId, stbuf: *const libc::statvfs) -> c_int {
        match stbuf.as_ref() {
            Some(st) => self.dispatch(id, Reply::Statfs(StatFs::from_statvfs(st))),
            None => self.null_payload(id, ReplyKind::Statfs),
        }
    }

    pub fn reply_xattr(&self, id: RequestId, size: usize) -> c_int {
        self.dispatch(id, Reply::Xattr(size as u64))
    }

    /// # Safety
    ///
    /// `buf` must satisfy [`NativeBuf::from_raw`] for `size`, `name` must be a
    /// NUL-terminated string and `stbuf` a valid `stat`, all for the duration
    /// of the call.
    pub unsafe fn add_direntry(
        &self,
        id: RequestId,
        buf: *const c_char,
        size: usize,
        name: *const c_char,
        stbuf: *const libc::stat,
        off: libc::off_t,
    ) -> c_int {
        let (Some(buf), Some(stbuf)) = (NativeBuf::from_raw(buf.cast(), size), stbuf.as_ref())
        else {
            return self.null_payload(id, ReplyKind::AddDirentry);
        };
        if name.is_null() {
            return self.null_payload(id, ReplyKind::AddDirentry);
        }
        let name = OsString::from_vec(CStr::from_ptr(name).to_bytes().to_vec());
        self.dispatch(
            id,
            Reply::AddDirentry {
                buf,
                name,
                attr: FileAttr::from_stat(stbuf),
                off: off as i64,
            },
        )
    }
}
