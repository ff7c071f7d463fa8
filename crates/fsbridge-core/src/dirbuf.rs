// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Readdir reply buffer in the `fuse_dirent` layout

use crate::buffer::NativeBuf;
use crate::native::NativeRequest;
use crate::reply::Reply;
use crate::sink::ReplySink;
use crate::types::{DirEntry, FileAttr};
use std::os::unix::ffi::OsStrExt;
use std::time::UNIX_EPOCH;

/// Bytes before the name in a `fuse_dirent`
const DIRENT_NAME_OFFSET: usize = 24;

/// Encoded size of an entry named `name_len` bytes.
pub fn dirent_size(name_len: usize) -> usize {
    (DIRENT_NAME_OFFSET + name_len + 7) & !7
}

/// Accumulates directory entries up to the size the kernel asked for.
///
/// Storage grows with the entries actually added; `capacity` is only a
/// limit.
pub struct DirBuf {
    buf: Vec<u8>,
    capacity: usize,
}

impl DirBuf {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Encode `entry` and report it to `sink` as a directory-entry addition.
    ///
    /// Returns `false` when the buffer is full or the native side declined
    /// the entry; nothing is appended in that case.
    pub fn add(&mut self, sink: &dyn ReplySink, req: &NativeRequest, entry: &DirEntry) -> bool {
        let name = entry.name.as_bytes();
        let size = dirent_size(name.len());
        if size > self.capacity - self.buf.len() {
            return false;
        }

        let mut record = Vec::with_capacity(size);
        record.extend_from_slice(&entry.ino.to_ne_bytes());
        record.extend_from_slice(&(entry.offset as u64).to_ne_bytes());
        record.extend_from_slice(&(name.len() as u32).to_ne_bytes());
        record.extend_from_slice(&entry.kind.dirent_type().to_ne_bytes());
        record.extend_from_slice(name);
        record.resize(size, 0);

        let mut attr = FileAttr::new(entry.ino, entry.kind, 0, UNIX_EPOCH);
        attr.nlink = 0;
        let status = sink.send(
            req,
            Reply::AddDirentry {
                buf: NativeBuf::from_slice(&record),
                name: entry.name.clone(),
                attr,
                off: entry.offset,
            },
        );
        if status <= 0 {
            return false;
        }

        self.buf.extend_from_slice(&record);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::RequestId;
    use crate::types::FileType;
    use libc::c_int;
    use std::sync::Mutex;

    struct Recorder {
        names: Mutex<Vec<String>>,
        accept: usize,
    }

    impl ReplySink for Recorder {
        fn send(&self, _req: &NativeRequest, reply: Reply<'_>) -> c_int {
            match reply {
                Reply::AddDirentry { buf, name, .. } => {
                    let mut names = self.names.lock().unwrap();
                    if names.len() >= self.accept {
                        return 0;
                    }
                    names.push(name.to_string_lossy().into_owned());
                    buf.len() as c_int
                }
                _ => -1,
            }
        }
    }

    fn entry(ino: u64, offset: i64, name: &str) -> DirEntry {
        DirEntry {
            ino,
            offset,
            kind: FileType::RegularFile,
            name: name.into(),
        }
    }

    #[test]
    fn records_are_eight_byte_aligned() {
        assert_eq!(dirent_size(1), 32);
        assert_eq!(dirent_size(8), 32);
        assert_eq!(dirent_size(9), 40);
    }

    #[test]
    fn stops_when_capacity_is_reached() {
        let sink = Recorder {
            names: Mutex::new(Vec::new()),
            accept: usize::MAX,
        };
        let req = NativeRequest::new(RequestId::from_raw(1), "/mnt");
        let mut dir = DirBuf::new(64);
        assert!(dir.add(&sink, &req, &entry(2, 1, "a")));
        assert!(dir.add(&sink, &req, &entry(3, 2, "b")));
        assert!(!dir.add(&sink, &req, &entry(4, 3, "c")));
        assert_eq!(dir.len(), 64);
        assert_eq!(*sink.names.lock().unwrap(), vec!["a", "b"]);

        let first = dir.as_slice();
        assert_eq!(u64::from_ne_bytes(first[0..8].try_into().unwrap()), 2);
        assert_eq!(u64::from_ne_bytes(first[8..16].try_into().unwrap()), 1);
        assert_eq!(u32::from_ne_bytes(first[16..20].try_into().unwrap()), 1);
        assert_eq!(first[24], b'a');
    }

    #[test]
    fn declined_entries_are_not_appended() {
        let sink = Recorder {
            names: Mutex::new(Vec::new()),
            accept: 1,
        };
        let req = NativeRequest::new(RequestId::from_raw(1), "/mnt");
        let mut dir = DirBuf::new(4096);
        assert!(dir.add(&sink, &req, &entry(2, 1, "kept")));
        assert!(!dir.add(&sink, &req, &entry(3, 2, "dropped")));
        assert_eq!(dir.len(), dirent_size(4));
    }

    #[test]
    fn huge_limits_do_not_reserve_memory() {
        let sink = Recorder {
            names: Mutex::new(Vec::new()),
            accept: usize::MAX,
        };
        let req = NativeRequest::new(RequestId::from_raw(1), "/mnt");
        let mut dir = DirBuf::new(usize::MAX);
        assert!(dir.add(&sink, &req, &entry(2, 1, "a")));
        assert_eq!(dir.len(), dirent_size(1));
        assert!(dir.buf.capacity() < 4096);
    }
}
