// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Native reply structures (libfuse 2.9 ABI) and conversions to owned types

use crate::types::{EntryParam, FileAttr, FileInfo, FileType, SetAttr, StatFs};
use libc::{c_int, c_uint, c_ulong};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Layout of `struct fuse_entry_param`
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawEntryParam {
    pub ino: c_ulong,
    pub generation: c_ulong,
    pub attr: libc::stat,
    pub attr_timeout: f64,
    pub entry_timeout: f64,
}

const FI_DIRECT_IO: c_uint = 1 << 0;
const FI_KEEP_CACHE: c_uint = 1 << 1;
const FI_NONSEEKABLE: c_uint = 1 << 3;

/// Layout of `struct fuse_file_info`; the C bitfields live in `bits`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct RawFileInfo {
    pub flags: c_int,
    pub fh_old: c_ulong,
    pub writepage: c_int,
    pub bits: c_uint,
    pub fh: u64,
    pub lock_owner: u64,
}

fn system_time(sec: i64, nsec: i64) -> SystemTime {
    let nanos = nsec.clamp(0, 999_999_999) as u32;
    if sec >= 0 {
        UNIX_EPOCH + Duration::new(sec as u64, nanos)
    } else {
        UNIX_EPOCH - Duration::from_secs(sec.unsigned_abs()) + Duration::from_nanos(u64::from(nanos))
    }
}

fn timespec(time: SystemTime) -> (i64, i64) {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64, i64::from(d.subsec_nanos())),
        Err(before) => {
            let d = before.duration();
            let mut secs = -(d.as_secs() as i64);
            let mut nanos = i64::from(d.subsec_nanos());
            if nanos > 0 {
                secs -= 1;
                nanos = 1_000_000_000 - nanos;
            }
            (secs, nanos)
        }
    }
}

fn duration_from_secs(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

impl FileAttr {
    pub fn from_stat(st: &libc::stat) -> Self {
        let mode = st.st_mode as u32;
        Self {
            ino: st.st_ino as u64,
            size: st.st_size.max(0) as u64,
            blocks: st.st_blocks.max(0) as u64,
            atime: system_time(st.st_atime as i64, st.st_atime_nsec as i64),
            mtime: system_time(st.st_mtime as i64, st.st_mtime_nsec as i64),
            ctime: system_time(st.st_ctime as i64, st.st_ctime_nsec as i64),
            kind: FileType::from_mode(mode),
            perm: (mode & 0o7777) as u16,
            nlink: st.st_nlink as u32,
            uid: st.st_uid,
            gid: st.st_gid,
            rdev: st.st_rdev as u32,
            blksize: st.st_blksize as u32,
        }
    }

    pub fn to_stat(&self) -> libc::stat {
        // SAFETY: `libc::stat` is plain old data; all-zero is a valid value.
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        st.st_ino = self.ino as _;
        st.st_mode = self.mode() as _;
        st.st_nlink = self.nlink as _;
        st.st_uid = self.uid;
        st.st_gid = self.gid;
        st.st_rdev = self.rdev as _;
        st.st_size = self.size as _;
        st.st_blksize = self.blksize as _;
        st.st_blocks = self.blocks as _;
        let (sec, nsec) = timespec(self.atime);
        st.st_atime = sec as _;
        st.st_atime_nsec = nsec as _;
        let (sec, nsec) = timespec(self.mtime);
        st.st_mtime = sec as _;
        st.st_mtime_nsec = nsec as _;
        let (sec, nsec) = timespec(self.ctime);
        st.st_ctime = sec as _;
        st.st_ctime_nsec = nsec as _;
        st
    }
}

impl EntryParam {
    pub fn from_raw(raw: &RawEntryParam) -> Self {
        Self {
            ino: raw.ino as u64,
            generation: raw.generation as u64,
            attr: FileAttr::from_stat(&raw.attr),
            attr_timeout: duration_from_secs(raw.attr_timeout),
            entry_timeout: duration_from_secs(raw.entry_timeout),
        }
    }

    pub fn to_raw(&self) -> RawEntryParam {
        RawEntryParam {
            ino: self.ino as c_ulong,
            generation: self.generation as c_ulong,
            attr: self.attr.to_stat(),
            attr_timeout: self.attr_timeout.as_secs_f64(),
            entry_timeout: self.entry_timeout.as_secs_f64(),
        }
    }
}

impl FileInfo {
    pub fn from_raw(raw: &RawFileInfo) -> Self {
        Self {
            flags: raw.flags,
            fh: raw.fh,
            direct_io: raw.bits & FI_DIRECT_IO != 0,
            keep_cache: raw.bits & FI_KEEP_CACHE != 0,
            nonseekable: raw.bits & FI_NONSEEKABLE != 0,
        }
    }

    pub fn to_raw(&self) -> RawFileInfo {
        let mut bits = 0;
        if self.direct_io {
            bits |= FI_DIRECT_IO;
        }
        if self.keep_cache {
            bits |= FI_KEEP_CACHE;
        }
        if self.nonseekable {
            bits |= FI_NONSEEKABLE;
        }
        RawFileInfo {
            flags: self.flags,
            bits,
            fh: self.fh,
            ..Default::default()
        }
    }
}

/// `to_set` bits of the libfuse setattr callback
pub const FUSE_SET_ATTR_MODE: c_int = 1 << 0;
pub const FUSE_SET_ATTR_UID: c_int = 1 << 1;
pub const FUSE_SET_ATTR_GID: c_int = 1 << 2;
pub const FUSE_SET_ATTR_SIZE: c_int = 1 << 3;
pub const FUSE_SET_ATTR_ATIME: c_int = 1 << 4;
pub const FUSE_SET_ATTR_MTIME: c_int = 1 << 5;
pub const FUSE_SET_ATTR_ATIME_NOW: c_int = 1 << 7;
pub const FUSE_SET_ATTR_MTIME_NOW: c_int = 1 << 8;

impl SetAttr {
    /// Decode the fields of `st` selected by `to_set`. The `*_NOW` bits are
    /// resolved against `now`.
    pub fn from_raw(st: &libc::stat, to_set: c_int, fh: Option<u64>, now: SystemTime) -> Self {
        let has = |bit: c_int| to_set & bit != 0;
        let time = |set: c_int, set_now: c_int, sec: i64, nsec: i64| {
            if has(set_now) {
                Some(now)
            } else if has(set) {
                Some(system_time(sec, nsec))
            } else {
                None
            }
        };
        Self {
            mode: has(FUSE_SET_ATTR_MODE).then_some(st.st_mode as u32 & 0o7777),
            uid: has(FUSE_SET_ATTR_UID).then_some(st.st_uid),
            gid: has(FUSE_SET_ATTR_GID).then_some(st.st_gid),
            size: has(FUSE_SET_ATTR_SIZE).then_some(st.st_size.max(0) as u64),
            atime: time(
                FUSE_SET_ATTR_ATIME,
                FUSE_SET_ATTR_ATIME_NOW,
                st.st_atime as i64,
                st.st_atime_nsec as i64,
            ),
            mtime: time(
                FUSE_SET_ATTR_MTIME,
                FUSE_SET_ATTR_MTIME_NOW,
                st.st_mtime as i64,
                st.st_mtime_nsec as i64,
            ),
            fh,
        }
    }
}

impl StatFs {
    pub fn from_statvfs(st: &libc::statvfs) -> Self {
        Self {
            blocks: st.f_blocks as u64,
            bfree: st.f_bfree as u64,
            bavail: st.f_bavail as u64,
            files: st.f_files as u64,
            ffree: st.f_ffree as u64,
            bsize: st.f_bsize as u32,
            namelen: st.f_namemax as u32,
            frsize: st.f_frsize as u32,
        }
    }

    pub fn to_statvfs(&self) -> libc::statvfs {
        // SAFETY: `libc::statvfs` is plain old data; all-zero is a valid value.
        let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
        st.f_blocks = self.blocks as _;
        st.f_bfree = self.bfree as _;
        st.f_bavail = self.bavail as _;
        st.f_files = self.files as _;
        st.f_ffree = self.ffree as _;
        st.f_bsize = self.bsize as _;
        st.f_namemax = self.namelen as _;
        st.f_frsize = self.frsize as _;
        st
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_conversion_keeps_type_and_times() {
        let mtime = UNIX_EPOCH + Duration::new(1_700_000_000, 250);
        let mut attr = FileAttr::new(42, FileType::Symlink, 0o777, mtime);
        attr.size = 11;
        attr.uid = 1000;

        let st = attr.to_stat();
        assert_eq!(st.st_mode as u32 & libc::S_IFMT as u32, libc::S_IFLNK as u32);
        assert_eq!(FileAttr::from_stat(&st), attr);
    }

    #[test]
    fn pre_epoch_times_are_preserved() {
        let t = UNIX_EPOCH - Duration::new(5, 100);
        assert_eq!(timespec(t), (-6, 999_999_900));
        assert_eq!(system_time(-6, 999_999_900), t);
    }

    #[test]
    fn file_info_bits_follow_libfuse_layout() {
        let info = FileInfo {
            flags: libc::O_RDWR,
            fh: 7,
            direct_io: true,
            keep_cache: false,
            nonseekable: true,
        };
        let raw = info.to_raw();
        assert_eq!(raw.bits, FI_DIRECT_IO | FI_NONSEEKABLE);
        assert_eq!(FileInfo::from_raw(&raw), info);
    }

    #[test]
    fn negative_timeouts_clamp_to_zero() {
        let attr = FileAttr::new(3, FileType::RegularFile, 0o644, UNIX_EPOCH);
        let mut raw = EntryParam::new(attr, Duration::from_secs(1)).to_raw();
        raw.attr_timeout = -1.0;
        raw.entry_timeout = f64::NAN;
        let entry = EntryParam::from_raw(&raw);
        assert_eq!(entry.attr_timeout, Duration::ZERO);
        assert_eq!(entry.entry_timeout, Duration::ZERO);
    }

    #[test]
    fn setattr_only_takes_selected_fields() {
        let mtime = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        let mut attr = FileAttr::new(4, FileType::RegularFile, 0o600, mtime);
        attr.size = 99;
        attr.uid = 7;
        let st = attr.to_stat();
        let now = UNIX_EPOCH + Duration::from_secs(1_800_000_000);

        let changes = SetAttr::from_raw(&st, FUSE_SET_ATTR_SIZE | FUSE_SET_ATTR_MODE, Some(3), now);
        assert_eq!(changes.size, Some(99));
        assert_eq!(changes.mode, Some(0o600));
        assert_eq!(changes.uid, None);
        assert_eq!(changes.fh, Some(3));

        let changes = SetAttr::from_raw(&st, FUSE_SET_ATTR_MTIME | FUSE_SET_ATTR_ATIME_NOW, None, now);
        assert_eq!(changes.mtime, Some(mtime));
        assert_eq!(changes.atime, Some(now));
        assert!(!changes.is_empty());
        assert!(SetAttr::from_raw(&st, 0, None, now).is_empty());
    }
}
