//! The filesystem abstraction the store is written against.
//!
//! Every store level owns a [`FileSystem`] scoped to its own directory (see
//! [`sub`]); paths are `/`-separated strings relative to that root. Two
//! optional capabilities matter to the engine:
//!
//! - **parent creation**: a filesystem that reports
//!   [`FileSystem::creates_parent_dirs`] makes intermediate directories
//!   implicitly on `create`; otherwise the engine calls `mkdir_all` itself.
//! - **fetching**: a file returned by [`FileSystem::open_fetcher`] may
//!   pre-stage a byte range before sequential reads ([`VfsFile::fetch`]),
//!   which turns offset-driven reads into single range requests on remote
//!   backends.

mod mem;
mod os;

pub use mem::MemFs;
pub use os::OsFs;

use std::io::{Read, Seek, Write};
use std::sync::Arc;

use crate::error::Result;

/// An open file handle. `fetch` is a pre-warming hint; the default is a
/// no-op and implementations must keep reads correct without it.
pub trait VfsFile: Read + Seek + Send {
    fn fetch(&mut self, _start: u64, _end: u64) -> Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn VfsFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VfsFile").finish_non_exhaustive()
    }
}

/// Metadata for a file or directory.
#[derive(Clone, Debug)]
pub struct FileMeta {
    /// Base name, without any directory components.
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

pub trait FileSystem: Send + Sync {
    fn open(&self, name: &str) -> Result<Box<dyn VfsFile>>;

    /// Opens a file for random access. Filesystems with a fetch capability
    /// return a handle whose `fetch` actually stages bytes; the default is
    /// a plain `open`.
    fn open_fetcher(&self, name: &str) -> Result<Box<dyn VfsFile>> {
        self.open(name)
    }

    fn create(&self, name: &str) -> Result<Box<dyn Write + Send>>;

    /// Lists the immediate children of a directory, sorted by name.
    fn read_dir(&self, dir: &str) -> Result<Vec<FileMeta>>;

    fn stat(&self, name: &str) -> Result<FileMeta>;

    fn mkdir_all(&self, dir: &str) -> Result<()>;

    /// Whether `create` makes intermediate directories implicitly.
    fn creates_parent_dirs(&self) -> bool {
        false
    }
}

/// Joins path segments, skipping empty and `.` components.
pub fn join(parts: &[&str]) -> String {
    let mut out = String::new();
    for part in parts {
        for seg in part.split('/') {
            if seg.is_empty() || seg == "." {
                continue;
            }
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(seg);
        }
    }
    out
}

/// Ensures `dir` exists, honoring the parent-creation capability.
pub fn ensure_dir(fs: &dyn FileSystem, dir: &str) -> Result<()> {
    if fs.creates_parent_dirs() {
        return Ok(());
    }
    fs.mkdir_all(dir)
}

/// A view of a subtree of another filesystem.
struct SubFs {
    inner: Arc<dyn FileSystem>,
    root: String,
}

impl SubFs {
    fn resolve(&self, name: &str) -> String {
        join(&[&self.root, name])
    }
}

impl FileSystem for SubFs {
    fn open(&self, name: &str) -> Result<Box<dyn VfsFile>> {
        self.inner.open(&self.resolve(name))
    }

    fn open_fetcher(&self, name: &str) -> Result<Box<dyn VfsFile>> {
        self.inner.open_fetcher(&self.resolve(name))
    }

    fn create(&self, name: &str) -> Result<Box<dyn Write + Send>> {
        self.inner.create(&self.resolve(name))
    }

    fn read_dir(&self, dir: &str) -> Result<Vec<FileMeta>> {
        self.inner.read_dir(&self.resolve(dir))
    }

    fn stat(&self, name: &str) -> Result<FileMeta> {
        self.inner.stat(&self.resolve(name))
    }

    fn mkdir_all(&self, dir: &str) -> Result<()> {
        self.inner.mkdir_all(&self.resolve(dir))
    }

    fn creates_parent_dirs(&self) -> bool {
        self.inner.creates_parent_dirs()
    }
}

/// Returns a filesystem rooted at `dir` within `fs`.
pub fn sub(fs: Arc<dyn FileSystem>, dir: &str) -> Arc<dyn FileSystem> {
    Arc::new(SubFs {
        inner: fs,
        root: join(&[dir]),
    })
}

/// Recursively lists all regular files under `dir`, as paths relative to the
/// filesystem root, sorted.
pub fn walk_files(fs: &dyn FileSystem, dir: &str) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let mut pending = vec![join(&[dir])];
    while let Some(d) = pending.pop() {
        for entry in fs.read_dir(&d)? {
            let path = join(&[&d, &entry.name]);
            if entry.is_dir {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Recursively lists all directories under `dir` (excluding `dir` itself),
/// sorted.
pub fn walk_dirs(fs: &dyn FileSystem, dir: &str) -> Result<Vec<String>> {
    let mut dirs = Vec::new();
    let mut pending = vec![join(&[dir])];
    while let Some(d) = pending.pop() {
        for entry in fs.read_dir(&d)? {
            if entry.is_dir {
                let path = join(&[&d, &entry.name]);
                dirs.push(path.clone());
                pending.push(path);
            }
        }
    }
    dirs.sort();
    Ok(dirs)
}
