// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory filesystem
//!
//! Directories, regular files, special files, symlinks, hard links and
//! extended attributes kept in a single inode table. Used by the host
//! binary and throughout the tests.

use crate::config::BridgeConfig;
use crate::error::{FsError, FsResult};
use crate::filesystem::FileSystem;
use crate::types::{DirEntry, EntryParam, FileAttr, FileInfo, FileType, SetAttr, StatFs, ROOT_INO};
use std::collections::{BTreeMap, HashMap};
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};
use tracing::debug;

const NAME_MAX: usize = 255;
const BLOCK_SIZE: u64 = 512;

/// Largest file a write or truncate may produce unless configured otherwise
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1 << 30;

enum Content {
    File(Vec<u8>),
    Dir(BTreeMap<OsString, u64>),
    Symlink(OsString),
}

struct Node {
    attr: FileAttr,
    /// Containing directory; only meaningful for directories
    parent: u64,
    content: Content,
    xattrs: BTreeMap<OsString, Vec<u8>>,
}

struct Inodes {
    nodes: HashMap<u64, Node>,
    next_ino: u64,
    next_fh: u64,
}

fn check_name(name: &OsStr) -> FsResult<()> {
    if name.len() > NAME_MAX {
        return Err(FsError::NameTooLong);
    }
    if name.is_empty() || name == "." || name == ".." || name.as_bytes().contains(&b'/') {
        return Err(FsError::InvalidArgument);
    }
    Ok(())
}

impl Inodes {
    fn node(&self, ino: u64) -> FsResult<&Node> {
        self.nodes.get(&ino).ok_or(FsError::NotFound)
    }

    fn node_mut(&mut self, ino: u64) -> FsResult<&mut Node> {
        self.nodes.get_mut(&ino).ok_or(FsError::NotFound)
    }

    fn children(&self, ino: u64) -> FsResult<&BTreeMap<OsString, u64>> {
        match &self.node(ino)?.content {
            Content::Dir(children) => Ok(children),
            _ => Err(FsError::NotADirectory),
        }
    }

    fn child(&self, parent: u64, name: &OsStr) -> FsResult<u64> {
        self.children(parent)?.get(name).copied().ok_or(FsError::NotFound)
    }

    fn handle(&mut self) -> u64 {
        let fh = self.next_fh;
        self.next_fh += 1;
        fh
    }

    /// Whether `dir` is `ino` or lies beneath it.
    fn within(&self, dir: u64, ino: u64) -> FsResult<bool> {
        let mut current = dir;
        loop {
            if current == ino {
                return Ok(true);
            }
            if current == ROOT_INO {
                return Ok(false);
            }
            current = self.node(current)?.parent;
        }
    }

    /// Bind `name` in `parent` to `ino`.
    fn attach(&mut self, parent: u64, name: &OsStr, ino: u64, now: SystemTime) -> FsResult<()> {
        let dir = self.node_mut(parent)?;
        match &mut dir.content {
            Content::Dir(children) => {
                children.insert(name.to_os_string(), ino);
            }
            _ => return Err(FsError::NotADirectory),
        }
        dir.attr.mtime = now;
        dir.attr.ctime = now;
        Ok(())
    }

    /// Unbind `name` from `parent`, returning the inode it named.
    fn take_name(&mut self, parent: u64, name: &OsStr, now: SystemTime) -> FsResult<u64> {
        let dir = self.node_mut(parent)?;
        let ino = match &mut dir.content {
            Content::Dir(children) => children.remove(name).ok_or(FsError::NotFound)?,
            _ => return Err(FsError::NotADirectory),
        };
        dir.attr.mtime = now;
        dir.attr.ctime = now;
        Ok(ino)
    }

    /// Link a new node under `parent`.
    fn insert(&mut self, parent: u64, name: &OsStr, kind: FileType, perm: u16, content: Content) -> FsResult<FileAttr> {
        check_name(name)?;
        if self.children(parent)?.contains_key(name) {
            return Err(FsError::AlreadyExists);
        }

        let ino = self.next_ino;
        self.next_ino += 1;
        let now = SystemTime::now();
        let mut attr = FileAttr::new(ino, kind, perm, now);
        if let Content::Symlink(target) = &content {
            attr.size = target.len() as u64;
        }
        self.nodes.insert(
            ino,
            Node {
                attr,
                parent,
                content,
                xattrs: BTreeMap::new(),
            },
        );
        self.attach(parent, name, ino, now)?;
        if kind == FileType::Directory {
            self.node_mut(parent)?.attr.nlink += 1;
        }
        Ok(attr)
    }

    /// Drop `name` from `parent`. A directory goes away at once, anything
    /// else with its last link.
    fn detach(&mut self, parent: u64, name: &OsStr) -> FsResult<()> {
        let now = SystemTime::now();
        let ino = self.take_name(parent, name, now)?;
        let node = self.node_mut(ino)?;
        let is_dir = node.attr.kind == FileType::Directory;
        node.attr.nlink = node.attr.nlink.saturating_sub(1);
        node.attr.ctime = now;
        if is_dir || node.attr.nlink == 0 {
            self.nodes.remove(&ino);
        }
        if is_dir {
            let dir = self.node_mut(parent)?;
            dir.attr.nlink = dir.attr.nlink.saturating_sub(1);
        }
        Ok(())
    }
}

pub struct MemoryFs {
    inodes: RwLock<Inodes>,
    attr_timeout: Duration,
    entry_timeout: Duration,
    max_file_size: u64,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Empty filesystem with a `0755` root directory.
    pub fn new() -> Self {
        Self::with_timeouts(Duration::from_secs(1), Duration::from_secs(1))
    }

    pub fn with_timeouts(attr_timeout: Duration, entry_timeout: Duration) -> Self {
        let root = Node {
            attr: FileAttr::new(ROOT_INO, FileType::Directory, 0o755, SystemTime::now()),
            parent: ROOT_INO,
            content: Content::Dir(BTreeMap::new()),
            xattrs: BTreeMap::new(),
        };
        Self {
            inodes: RwLock::new(Inodes {
                nodes: HashMap::from([(ROOT_INO, root)]),
                next_ino: ROOT_INO + 1,
                next_fh: 1,
            }),
            attr_timeout,
            entry_timeout,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Cap file sizes at `bytes`; larger writes and truncates fail with `EFBIG`.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::with_timeouts(config.attr_timeout(), config.entry_timeout())
    }

    /// Number of live inodes, the root included
    pub fn inode_count(&self) -> usize {
        self.inodes().nodes.len()
    }

    fn entry(&self, attr: FileAttr) -> EntryParam {
        let mut entry = EntryParam::new(attr, self.entry_timeout);
        entry.attr_timeout = self.attr_timeout;
        entry
    }

    fn inodes(&self) -> RwLockReadGuard<'_, Inodes> {
        self.inodes.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn inodes_mut(&self) -> RwLockWriteGuard<'_, Inodes> {
        self.inodes.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FileSystem for MemoryFs {
    fn init(&self) -> FsResult<()> {
        debug!(target: "fsbridge::memfs", inodes = self.inode_count(), "memory filesystem ready");
        Ok(())
    }

    fn lookup(&self, parent: u64, name: &OsStr) -> FsResult<EntryParam> {
        let inodes = self.inodes();
        let ino = match name.as_bytes() {
            b"." => parent,
            b".." => inodes.node(parent)?.parent,
            _ => inodes.child(parent, name)?,
        };
        Ok(self.entry(inodes.node(ino)?.attr))
    }

    fn getattr(&self, ino: u64) -> FsResult<(FileAttr, Duration)> {
        Ok((self.inodes().node(ino)?.attr, self.attr_timeout))
    }

    fn setattr(&self, ino: u64, changes: SetAttr) -> FsResult<(FileAttr, Duration)> {
        let mut inodes = self.inodes_mut();
        let node = inodes.node_mut(ino)?;
        let now = SystemTime::now();

        if let Some(size) = changes.size {
            let data = match &mut node.content {
                Content::File(data) => data,
                Content::Dir(_) => return Err(FsError::IsADirectory),
                Content::Symlink(_) => return Err(FsError::InvalidArgument),
            };
            if size > self.max_file_size {
                return Err(FsError::FileTooLarge);
            }
            data.resize(usize::try_from(size).map_err(|_| FsError::FileTooLarge)?, 0);
            node.attr.size = size;
            node.attr.blocks = size.div_ceil(BLOCK_SIZE);
            node.attr.mtime = now;
        }
        if let Some(mode) = changes.mode {
            node.attr.perm = (mode & 0o7777) as u16;
        }
        if let Some(uid) = changes.uid {
            node.attr.uid = uid;
        }
        if let Some(gid) = changes.gid {
            node.attr.gid = gid;
        }
        if let Some(atime) = changes.atime {
            node.attr.atime = atime;
        }
        if let Some(mtime) = changes.mtime {
            node.attr.mtime = mtime;
        }
        node.attr.ctime = now;
        Ok((node.attr, self.attr_timeout))
    }

    fn readlink(&self, ino: u64) -> FsResult<OsString> {
        match &self.inodes().node(ino)?.content {
            Content::Symlink(target) => Ok(target.clone()),
            _ => Err(FsError::InvalidArgument),
        }
    }

    fn mknod(&self, parent: u64, name: &OsStr, mode: u32, rdev: u32) -> FsResult<EntryParam> {
        let kind = FileType::from_mode(mode);
        if matches!(kind, FileType::Directory | FileType::Symlink) {
            return Err(FsError::InvalidArgument);
        }
        let mut inodes = self.inodes_mut();
        let mut attr = inodes.insert(parent, name, kind, (mode & 0o7777) as u16, Content::File(Vec::new()))?;
        attr.rdev = rdev;
        inodes.node_mut(attr.ino)?.attr.rdev = rdev;
        drop(inodes);
        Ok(self.entry(attr))
    }

    fn mkdir(&self, parent: u64, name: &OsStr, mode: u32) -> FsResult<EntryParam> {
        let attr = self.inodes_mut().insert(
            parent,
            name,
            FileType::Directory,
            (mode & 0o7777) as u16,
            Content::Dir(BTreeMap::new()),
        )?;
        Ok(self.entry(attr))
    }

    fn unlink(&self, parent: u64, name: &OsStr) -> FsResult<()> {
        let mut inodes = self.inodes_mut();
        let ino = inodes.child(parent, name)?;
        if matches!(inodes.node(ino)?.content, Content::Dir(_)) {
            return Err(FsError::IsADirectory);
        }
        inodes.detach(parent, name)
    }

    fn rmdir(&self, parent: u64, name: &OsStr) -> FsResult<()> {
        let mut inodes = self.inodes_mut();
        let ino = inodes.child(parent, name)?;
        if !inodes.children(ino)?.is_empty() {
            return Err(FsError::NotEmpty);
        }
        inodes.detach(parent, name)
    }

    fn symlink(&self, parent: u64, name: &OsStr, target: &OsStr) -> FsResult<EntryParam> {
        let attr = self.inodes_mut().insert(
            parent,
            name,
            FileType::Symlink,
            0o777,
            Content::Symlink(target.to_os_string()),
        )?;
        Ok(self.entry(attr))
    }

    fn rename(&self, parent: u64, name: &OsStr, newparent: u64, newname: &OsStr) -> FsResult<()> {
        check_name(newname)?;
        let mut inodes = self.inodes_mut();
        let ino = inodes.child(parent, name)?;
        let is_dir = inodes.node(ino)?.attr.kind == FileType::Directory;

        let replaced = inodes.children(newparent)?.get(newname).copied();
        if let Some(existing) = replaced {
            if existing == ino {
                return Ok(());
            }
            match (is_dir, &inodes.node(existing)?.content) {
                (true, Content::Dir(children)) if !children.is_empty() => return Err(FsError::NotEmpty),
                (true, Content::Dir(_)) | (false, Content::File(_) | Content::Symlink(_)) => {}
                (true, _) => return Err(FsError::NotADirectory),
                (false, Content::Dir(_)) => return Err(FsError::IsADirectory),
            }
        }
        if is_dir && inodes.within(newparent, ino)? {
            return Err(FsError::InvalidArgument);
        }

        if replaced.is_some() {
            inodes.detach(newparent, newname)?;
        }
        let now = SystemTime::now();
        inodes.take_name(parent, name, now)?;
        inodes.attach(newparent, newname, ino, now)?;
        let node = inodes.node_mut(ino)?;
        node.attr.ctime = now;
        if is_dir && parent != newparent {
            node.parent = newparent;
            let old = inodes.node_mut(parent)?;
            old.attr.nlink = old.attr.nlink.saturating_sub(1);
            inodes.node_mut(newparent)?.attr.nlink += 1;
        }
        Ok(())
    }

    fn link(&self, ino: u64, newparent: u64, newname: &OsStr) -> FsResult<EntryParam> {
        check_name(newname)?;
        let mut inodes = self.inodes_mut();
        if inodes.node(ino)?.attr.kind == FileType::Directory {
            return Err(FsError::NotPermitted);
        }
        if inodes.children(newparent)?.contains_key(newname) {
            return Err(FsError::AlreadyExists);
        }
        let now = SystemTime::now();
        inodes.attach(newparent, newname, ino, now)?;
        let node = inodes.node_mut(ino)?;
        node.attr.nlink += 1;
        node.attr.ctime = now;
        let attr = node.attr;
        drop(inodes);
        Ok(self.entry(attr))
    }

    fn open(&self, ino: u64, flags: i32) -> FsResult<FileInfo> {
        let mut inodes = self.inodes_mut();
        match inodes.node(ino)?.content {
            Content::Dir(_) => return Err(FsError::IsADirectory),
            Content::Symlink(_) => return Err(FsError::InvalidArgument),
            Content::File(_) => {}
        }
        if flags & libc::O_TRUNC != 0 && flags & libc::O_ACCMODE != libc::O_RDONLY {
            let node = inodes.node_mut(ino)?;
            if let Content::File(data) = &mut node.content {
                data.clear();
            }
            node.attr.size = 0;
            node.attr.blocks = 0;
        }
        let fh = inodes.handle();
        Ok(FileInfo::with_handle(fh, flags))
    }

    fn read(&self, ino: u64, _fh: u64, offset: i64, size: u32) -> FsResult<Vec<u8>> {
        let offset = usize::try_from(offset).map_err(|_| FsError::InvalidArgument)?;
        match &self.inodes().node(ino)?.content {
            Content::File(data) => {
                let start = offset.min(data.len());
                let end = start.saturating_add(size as usize).min(data.len());
                Ok(data[start..end].to_vec())
            }
            Content::Dir(_) => Err(FsError::IsADirectory),
            Content::Symlink(_) => Err(FsError::InvalidArgument),
        }
    }

    fn write(&self, ino: u64, _fh: u64, offset: i64, data: &[u8]) -> FsResult<u64> {
        let offset = usize::try_from(offset).map_err(|_| FsError::InvalidArgument)?;
        let mut inodes = self.inodes_mut();
        let node = inodes.node_mut(ino)?;
        let content = match &mut node.content {
            Content::File(content) => content,
            Content::Dir(_) => return Err(FsError::IsADirectory),
            Content::Symlink(_) => return Err(FsError::InvalidArgument),
        };
        let end = offset.checked_add(data.len()).ok_or(FsError::FileTooLarge)?;
        if end as u64 > self.max_file_size {
            return Err(FsError::FileTooLarge);
        }
        if content.len() < end {
            content.resize(end, 0);
        }
        content[offset..end].copy_from_slice(data);
        let size = content.len() as u64;

        let now = SystemTime::now();
        node.attr.size = size;
        node.attr.blocks = size.div_ceil(BLOCK_SIZE);
        node.attr.mtime = now;
        node.attr.ctime = now;
        Ok(data.len() as u64)
    }

    fn opendir(&self, ino: u64, flags: i32) -> FsResult<FileInfo> {
        let mut inodes = self.inodes_mut();
        inodes.children(ino)?;
        let fh = inodes.handle();
        Ok(FileInfo::with_handle(fh, flags))
    }

    fn readdir(&self, ino: u64, _fh: u64, offset: i64) -> FsResult<Vec<DirEntry>> {
        let inodes = self.inodes();
        let node = inodes.node(ino)?;
        let children = inodes.children(ino)?;

        let dots = [
            (ino, FileType::Directory, OsString::from(".")),
            (node.parent, FileType::Directory, OsString::from("..")),
        ];
        let rows = dots.into_iter().chain(children.iter().map(|(name, child)| {
            let kind = inodes
                .nodes
                .get(child)
                .map(|n| n.attr.kind)
                .unwrap_or(FileType::RegularFile);
            (*child, kind, name.clone())
        }));

        let skip = usize::try_from(offset).unwrap_or(0);
        Ok(rows
            .enumerate()
            .skip(skip)
            .map(|(index, (ino, kind, name))| DirEntry {
                ino,
                offset: index as i64 + 1,
                kind,
                name,
            })
            .collect())
    }

    fn statfs(&self, _ino: u64) -> FsResult<StatFs> {
        let inodes = self.inodes();
        let used: u64 = inodes.nodes.values().map(|node| node.attr.blocks).sum();
        let files = inodes.nodes.len() as u64;
        let blocks = used.max(1 << 20);
        Ok(StatFs {
            blocks,
            bfree: blocks - used,
            bavail: blocks - used,
            files: files + (1 << 16),
            ffree: 1 << 16,
            bsize: BLOCK_SIZE as u32,
            namelen: NAME_MAX as u32,
            frsize: BLOCK_SIZE as u32,
        })
    }

    fn setxattr(&self, ino: u64, name: &OsStr, value: &[u8], flags: i32) -> FsResult<()> {
        if name.is_empty() {
            return Err(FsError::InvalidArgument);
        }
        let mut inodes = self.inodes_mut();
        let node = inodes.node_mut(ino)?;
        let exists = node.xattrs.contains_key(name);
        if flags & libc::XATTR_CREATE != 0 && exists {
            return Err(FsError::AlreadyExists);
        }
        if flags & libc::XATTR_REPLACE != 0 && !exists {
            return Err(FsError::NoAttribute);
        }
        node.xattrs.insert(name.to_os_string(), value.to_vec());
        node.attr.ctime = SystemTime::now();
        Ok(())
    }

    fn getxattr(&self, ino: u64, name: &OsStr) -> FsResult<Vec<u8>> {
        self.inodes()
            .node(ino)?
            .xattrs
            .get(name)
            .cloned()
            .ok_or(FsError::NoAttribute)
    }

    fn listxattr(&self, ino: u64) -> FsResult<Vec<OsString>> {
        Ok(self.inodes().node(ino)?.xattrs.keys().cloned().collect())
    }

    fn removexattr(&self, ino: u64, name: &OsStr) -> FsResult<()> {
        let mut inodes = self.inodes_mut();
        let node = inodes.node_mut(ino)?;
        node.xattrs.remove(name).ok_or(FsError::NoAttribute)?;
        node.attr.ctime = SystemTime::now();
        Ok(())
    }

    fn access(&self, ino: u64, _mask: i32) -> FsResult<()> {
        self.inodes().node(ino).map(|_| ())
    }

    fn create(&self, parent: u64, name: &OsStr, mode: u32, flags: i32) -> FsResult<(EntryParam, FileInfo)> {
        let mut inodes = self.inodes_mut();
        let attr = inodes.insert(
            parent,
            name,
            FileType::RegularFile,
            (mode & 0o7777) as u16,
            Content::File(Vec::new()),
        )?;
        let fh = inodes.handle();
        drop(inodes);
        Ok((self.entry(attr), FileInfo::with_handle(fh, flags)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    #[test]
    fn files_round_trip_through_write_and_read() {
        let fs = MemoryFs::new();
        let (entry, info) = fs.create(ROOT_INO, name("hello.txt"), 0o644, libc::O_RDWR).unwrap();
        assert_eq!(fs.write(entry.ino, info.fh, 0, b"hello world").unwrap(), 11);
        assert_eq!(fs.write(entry.ino, info.fh, 6, b"there").unwrap(), 5);
        assert_eq!(fs.read(entry.ino, info.fh, 0, 64).unwrap(), b"hello there");
        assert_eq!(fs.read(entry.ino, info.fh, 6, 2).unwrap(), b"th");
        assert!(fs.read(entry.ino, info.fh, 100, 4).unwrap().is_empty());

        let (attr, _) = fs.getattr(entry.ino).unwrap();
        assert_eq!(attr.size, 11);
        assert_eq!(attr.perm, 0o644);
    }

    #[test]
    fn directory_rules() {
        let fs = MemoryFs::new();
        let dir = fs.mkdir(ROOT_INO, name("d"), 0o755).unwrap();
        fs.create(dir.ino, name("f"), 0o600, 0).unwrap();

        assert!(matches!(fs.mkdir(ROOT_INO, name("d"), 0o755), Err(FsError::AlreadyExists)));
        assert!(matches!(fs.rmdir(ROOT_INO, name("d")), Err(FsError::NotEmpty)));
        assert!(matches!(fs.unlink(ROOT_INO, name("d")), Err(FsError::IsADirectory)));
        assert_eq!(fs.getattr(ROOT_INO).unwrap().0.nlink, 3);

        fs.unlink(dir.ino, name("f")).unwrap();
        fs.rmdir(ROOT_INO, name("d")).unwrap();
        assert!(matches!(fs.lookup(ROOT_INO, name("d")), Err(FsError::NotFound)));
        assert_eq!(fs.getattr(ROOT_INO).unwrap().0.nlink, 2);
        assert_eq!(fs.inode_count(), 1);
    }

    #[test]
    fn readdir_lists_dots_then_sorted_children() {
        let fs = MemoryFs::new();
        fs.create(ROOT_INO, name("b"), 0o644, 0).unwrap();
        fs.mkdir(ROOT_INO, name("a"), 0o755).unwrap();

        let names: Vec<_> = fs
            .readdir(ROOT_INO, 0, 0)
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.offset, e.kind))
            .collect();
        assert_eq!(
            names,
            vec![
                (OsString::from("."), 1, FileType::Directory),
                (OsString::from(".."), 2, FileType::Directory),
                (OsString::from("a"), 3, FileType::Directory),
                (OsString::from("b"), 4, FileType::RegularFile),
            ]
        );
        let rest = fs.readdir(ROOT_INO, 0, 3).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].name, "b");
    }

    #[test]
    fn symlinks_and_xattrs() {
        let fs = MemoryFs::new();
        let link = fs.symlink(ROOT_INO, name("l"), name("/target")).unwrap();
        assert_eq!(fs.readlink(link.ino).unwrap(), "/target");
        assert_eq!(link.attr.kind, FileType::Symlink);
        assert!(matches!(fs.readlink(ROOT_INO), Err(FsError::InvalidArgument)));

        fs.setxattr(link.ino, name("user.k"), b"v", 0).unwrap();
        assert_eq!(fs.getxattr(link.ino, name("user.k")).unwrap(), b"v");
        assert!(matches!(fs.getxattr(link.ino, name("user.x")), Err(FsError::NoAttribute)));
        assert_eq!(fs.listxattr(link.ino).unwrap(), vec![OsString::from("user.k")]);
    }

    #[test]
    fn names_are_validated() {
        let fs = MemoryFs::new();
        let long = "x".repeat(NAME_MAX + 1);
        assert!(matches!(fs.mkdir(ROOT_INO, name(&long), 0o755), Err(FsError::NameTooLong)));
        assert!(matches!(fs.create(ROOT_INO, name("a/b"), 0o644, 0), Err(FsError::InvalidArgument)));
        assert!(matches!(fs.lookup(42, name("x")), Err(FsError::NotFound)));
    }

    #[test]
    fn config_timeouts_reach_entries() {
        let config = BridgeConfig {
            attr_timeout_ms: 250,
            entry_timeout_ms: 500,
            ..Default::default()
        };
        let fs = MemoryFs::from_config(&config);
        let entry = fs.mkdir(ROOT_INO, name("d"), 0o700).unwrap();
        assert_eq!(entry.attr_timeout, Duration::from_millis(250));
        assert_eq!(entry.entry_timeout, Duration::from_millis(500));
        assert_eq!(fs.getattr(entry.ino).unwrap().1, Duration::from_millis(250));
    }

    #[test]
    fn writes_past_the_size_limit_are_refused() {
        let fs = MemoryFs::new();
        let (entry, info) = fs.create(ROOT_INO, name("big"), 0o644, libc::O_RDWR).unwrap();
        let err = fs.write(entry.ino, info.fh, 1 << 40, b"x").unwrap_err();
        assert!(matches!(err, FsError::FileTooLarge));
        assert_eq!(err.errno(), libc::EFBIG);
        assert_eq!(fs.getattr(entry.ino).unwrap().0.size, 0);

        let fs = MemoryFs::new().with_max_file_size(8);
        let (entry, info) = fs.create(ROOT_INO, name("small"), 0o644, libc::O_RDWR).unwrap();
        assert_eq!(fs.write(entry.ino, info.fh, 0, b"12345678").unwrap(), 8);
        assert!(matches!(fs.write(entry.ino, info.fh, 4, b"56789"), Err(FsError::FileTooLarge)));
        let grow = SetAttr {
            size: Some(9),
            ..Default::default()
        };
        assert!(matches!(fs.setattr(entry.ino, grow), Err(FsError::FileTooLarge)));
    }

    #[test]
    fn setattr_truncates_and_updates_metadata() {
        let fs = MemoryFs::new();
        let (entry, info) = fs.create(ROOT_INO, name("f"), 0o644, libc::O_RDWR).unwrap();
        fs.write(entry.ino, info.fh, 0, b"hello world").unwrap();

        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let changes = SetAttr {
            size: Some(5),
            mode: Some(libc::S_IFREG as u32 | 0o600),
            uid: Some(1000),
            mtime: Some(stamp),
            ..Default::default()
        };
        let (attr, _) = fs.setattr(entry.ino, changes).unwrap();
        assert_eq!(attr.size, 5);
        assert_eq!(attr.perm, 0o600);
        assert_eq!(attr.uid, 1000);
        assert_eq!(attr.mtime, stamp);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(fs.read(entry.ino, info.fh, 0, 64).unwrap(), b"hello");

        let extend = SetAttr {
            size: Some(8),
            ..Default::default()
        };
        fs.setattr(entry.ino, extend).unwrap();
        assert_eq!(fs.read(entry.ino, info.fh, 0, 64).unwrap(), b"hello\0\0\0");
        assert!(matches!(fs.setattr(ROOT_INO, extend), Err(FsError::IsADirectory)));
    }

    #[test]
    fn hard_links_share_an_inode() {
        let fs = MemoryFs::new();
        let (entry, info) = fs.create(ROOT_INO, name("a"), 0o644, libc::O_RDWR).unwrap();
        fs.write(entry.ino, info.fh, 0, b"shared").unwrap();

        let linked = fs.link(entry.ino, ROOT_INO, name("b")).unwrap();
        assert_eq!(linked.ino, entry.ino);
        assert_eq!(linked.attr.nlink, 2);
        assert!(matches!(fs.link(entry.ino, ROOT_INO, name("b")), Err(FsError::AlreadyExists)));
        let dir = fs.mkdir(ROOT_INO, name("d"), 0o755).unwrap();
        assert!(matches!(fs.link(dir.ino, ROOT_INO, name("d2")), Err(FsError::NotPermitted)));

        fs.unlink(ROOT_INO, name("a")).unwrap();
        let b = fs.lookup(ROOT_INO, name("b")).unwrap();
        assert_eq!(b.attr.nlink, 1);
        assert_eq!(fs.read(b.ino, 0, 0, 64).unwrap(), b"shared");
        fs.unlink(ROOT_INO, name("b")).unwrap();
        assert!(matches!(fs.getattr(entry.ino), Err(FsError::NotFound)));
    }

    #[test]
    fn rename_moves_and_replaces() {
        let fs = MemoryFs::new();
        let src = fs.mkdir(ROOT_INO, name("src"), 0o755).unwrap();
        let dst = fs.mkdir(ROOT_INO, name("dst"), 0o755).unwrap();
        let sub = fs.mkdir(src.ino, name("sub"), 0o755).unwrap();
        fs.create(src.ino, name("f"), 0o644, 0).unwrap();
        let old = fs.create(dst.ino, name("g"), 0o644, 0).unwrap().0;

        // a file replaces another file
        fs.rename(src.ino, name("f"), dst.ino, name("g")).unwrap();
        assert!(matches!(fs.lookup(src.ino, name("f")), Err(FsError::NotFound)));
        assert_ne!(fs.lookup(dst.ino, name("g")).unwrap().ino, old.ino);
        assert!(matches!(fs.getattr(old.ino), Err(FsError::NotFound)));

        // directories carry their parent link along
        fs.rename(src.ino, name("sub"), dst.ino, name("moved")).unwrap();
        assert_eq!(fs.lookup(sub.ino, name("..")).unwrap().ino, dst.ino);
        assert_eq!(fs.getattr(src.ino).unwrap().0.nlink, 2);
        assert_eq!(fs.getattr(dst.ino).unwrap().0.nlink, 3);

        assert!(matches!(
            fs.rename(ROOT_INO, name("dst"), sub.ino, name("loop")),
            Err(FsError::InvalidArgument)
        ));
        assert!(matches!(
            fs.rename(ROOT_INO, name("src"), dst.ino, name("g")),
            Err(FsError::NotADirectory)
        ));
        assert!(matches!(
            fs.rename(dst.ino, name("g"), ROOT_INO, name("src")),
            Err(FsError::IsADirectory)
        ));
        assert!(matches!(
            fs.rename(ROOT_INO, name("src"), ROOT_INO, name("dst")),
            Err(FsError::NotEmpty)
        ));
        fs.rename(dst.ino, name("g"), dst.ino, name("g")).unwrap();
    }

    #[test]
    fn special_files_and_xattr_flags() {
        let fs = MemoryFs::new();
        let fifo = fs.mknod(ROOT_INO, name("pipe"), libc::S_IFIFO as u32 | 0o600, 0).unwrap();
        assert_eq!(fifo.attr.kind, FileType::NamedPipe);
        let dev = fs.mknod(ROOT_INO, name("dev"), libc::S_IFCHR as u32 | 0o600, 0x0103).unwrap();
        assert_eq!(fs.getattr(dev.ino).unwrap().0.rdev, 0x0103);
        assert!(matches!(
            fs.mknod(ROOT_INO, name("dir"), libc::S_IFDIR as u32 | 0o755, 0),
            Err(FsError::InvalidArgument)
        ));

        let key = name("user.k");
        assert!(matches!(
            fs.setxattr(fifo.ino, key, b"v", libc::XATTR_REPLACE),
            Err(FsError::NoAttribute)
        ));
        fs.setxattr(fifo.ino, key, b"v", libc::XATTR_CREATE).unwrap();
        assert!(matches!(
            fs.setxattr(fifo.ino, key, b"w", libc::XATTR_CREATE),
            Err(FsError::AlreadyExists)
        ));
        fs.setxattr(fifo.ino, key, b"w", libc::XATTR_REPLACE).unwrap();
        assert_eq!(fs.getxattr(fifo.ino, key).unwrap(), b"w");
        fs.removexattr(fifo.ino, key).unwrap();
        assert!(matches!(fs.removexattr(fifo.ino, key), Err(FsError::NoAttribute)));
    }
}
