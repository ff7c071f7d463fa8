// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! C API through which the native event loop delivers replies
//!
//! Requests are identified by the `u64` the bridge handed out when the
//! request was issued. Every `fsbridge_reply_*` call completes its request;
//! `fsbridge_add_direntry` may be called any number of times before the
//! final `fsbridge_reply_buf` of a readdir.

use fsbridge_core::{Bridge, BridgeConfig, RawEntryParam, RawFileInfo, RequestId};
use libc::{c_char, c_double, c_int, off_t, size_t};
use std::path::PathBuf;
use tracing::warn;

lazy_static::lazy_static! {
    static ref BRIDGE: Bridge = Bridge::new(config_from_env());
}

/// Config file named by `FSBRIDGE_CONFIG`, with the usual environment
/// overrides; defaults when unset or unreadable.
fn config_from_env() -> BridgeConfig {
    let path = std::env::var_os("FSBRIDGE_CONFIG").map(PathBuf::from);
    BridgeConfig::load(path.as_deref()).unwrap_or_else(|err| {
        warn!(target: "fsbridge::ffi", error = %err, "falling back to default bridge config");
        let mut config = BridgeConfig::default();
        config.apply_env();
        config
    })
}

/// The process-wide bridge the exported functions dispatch into.
pub fn global() -> &'static Bridge {
    &BRIDGE
}

fn id(req: u64) -> RequestId {
    RequestId::from_raw(req)
}

#[no_mangle]
pub extern "C" fn fsbridge_reply_err(req: u64, err: c_int) -> c_int {
    BRIDGE.dispatcher().reply_err(id(req), err)
}

#[no_mangle]
pub extern "C" fn fsbridge_reply_none(req: u64) {
    BRIDGE.dispatcher().reply_none(id(req))
}

/// # Safety
///
/// `e` must be null or point to a valid `fuse_entry_param`.
#[no_mangle]
pub unsafe extern "C" fn fsbridge_reply_entry(req: u64, e: *const RawEntryParam) -> c_int {
    BRIDGE.dispatcher().reply_entry(id(req), e)
}

/// # Safety
///
/// `e` and `fi` must be null or point to valid structures.
#[no_mangle]
pub unsafe extern "C" fn fsbridge_reply_create(
    req: u64,
    e: *const RawEntryParam,
    fi: *const RawFileInfo,
) -> c_int {
    BRIDGE.dispatcher().reply_create(id(req), e, fi)
}

/// # Safety
///
/// `attr` must be null or point to a valid `struct stat`.
#[no_mangle]
pub unsafe extern "C" fn fsbridge_reply_attr(
    req: u64,
    attr: *const libc::stat,
    attr_timeout: c_double,
) -> c_int {
    BRIDGE.dispatcher().reply_attr(id(req), attr, attr_timeout)
}

/// # Safety
///
/// `link` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn fsbridge_reply_readlink(req: u64, link: *const c_char) -> c_int {
    BRIDGE.dispatcher().reply_readlink(id(req), link)
}

/// # Safety
///
/// `fi` must be null or point to a valid `fuse_file_info`.
#[no_mangle]
pub unsafe extern "C" fn fsbridge_reply_open(req: u64, fi: *const RawFileInfo) -> c_int {
    BRIDGE.dispatcher().reply_open(id(req), fi)
}

#[no_mangle]
pub extern "C" fn fsbridge_reply_write(req: u64, count: size_t) -> c_int {
    BRIDGE.dispatcher().reply_write(id(req), count)
}

/// # Safety
///
/// When `size` is non-zero `buf` must point to `size` readable bytes. The
/// bytes are only borrowed for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn fsbridge_reply_buf(req: u64, buf: *const c_char, size: size_t) -> c_int {
    BRIDGE.dispatcher().reply_buf(id(req), buf, size)
}

/// # Safety
///
/// `stbuf` must be null or point to a valid `struct statvfs`.
#[no_mangle]
pub unsafe extern "C" fn fsbridge_reply_statfs(req: u64, stbuf: *const libc::statvfs) -> c_int {
    BRIDGE.dispatcher().reply_statfs(id(req), stbuf)
}

#[no_mangle]
pub extern "C" fn fsbridge_reply_xattr(req: u64, count: size_t) -> c_int {
    BRIDGE.dispatcher().reply_xattr(id(req), count)
}

/// Report one entry appended to a readdir buffer. The request stays
/// pending.
///
/// # Safety
///
/// `buf` must point to `size` readable bytes (or `size` is zero), `name`
/// must be a NUL-terminated string and `stbuf` a valid `struct stat`.
#[no_mangle]
pub unsafe extern "C" fn fsbridge_add_direntry(
    req: u64,
    buf: *const c_char,
    size: size_t,
    name: *const c_char,
    stbuf: *const libc::stat,
    off: off_t,
) -> c_int {
    BRIDGE.dispatcher().add_direntry(id(req), buf, size, name, stbuf, off)
}

/// Requests issued and not yet completed.
#[no_mangle]
pub extern "C" fn fsbridge_pending_requests() -> size_t {
    BRIDGE.requests().pending_count()
}
