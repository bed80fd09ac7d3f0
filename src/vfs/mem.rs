//! In-memory store filesystem, used by tests.
//!
//! Creates parent directories implicitly and hands out fetch-capable file
//! handles that record every `fetch` call, so tests can assert on the
//! random-access behavior of the read paths.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use super::{join, FileMeta, FileSystem, VfsFile};
use crate::error::{Error, Result};

#[derive(Default)]
struct MemState {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

impl MemState {
    fn add_parents(&mut self, path: &str) {
        let mut dir = String::new();
        for seg in path.split('/').collect::<Vec<_>>() {
            self.dirs.insert(dir.clone());
            if !dir.is_empty() {
                dir.push('/');
            }
            dir.push_str(seg);
        }
    }
}

/// A recorded `fetch(start, end)` call, with the path it was issued on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchCall {
    pub path: String,
    pub start: u64,
    pub end: u64,
}

#[derive(Clone, Default)]
pub struct MemFs {
    state: Arc<Mutex<MemState>>,
    fetches: Arc<Mutex<Vec<FetchCall>>>,
}

impl MemFs {
    pub fn new() -> Self {
        let fs = Self::default();
        fs.state.lock().unwrap().dirs.insert(String::new());
        fs
    }

    /// Drains the log of `fetch` calls made on files opened from this
    /// filesystem.
    pub fn take_fetches(&self) -> Vec<FetchCall> {
        std::mem::take(&mut *self.fetches.lock().unwrap())
    }
}

impl FileSystem for MemFs {
    fn open(&self, name: &str) -> Result<Box<dyn VfsFile>> {
        let name = join(&[name]);
        let state = self.state.lock().unwrap();
        let data = state
            .files
            .get(&name)
            .ok_or_else(|| Error::NotExist(format!("file {name}")))?;
        Ok(Box::new(MemFile {
            path: name,
            cursor: Cursor::new(data.clone()),
            fetches: Arc::clone(&self.fetches),
        }))
    }

    fn create(&self, name: &str) -> Result<Box<dyn Write + Send>> {
        Ok(Box::new(MemWriter {
            path: join(&[name]),
            buf: Vec::new(),
            state: Arc::clone(&self.state),
        }))
    }

    fn read_dir(&self, dir: &str) -> Result<Vec<FileMeta>> {
        let dir = join(&[dir]);
        let state = self.state.lock().unwrap();
        if !state.dirs.contains(&dir) {
            return Err(Error::NotExist(format!("directory {dir}")));
        }

        let child_of = |path: &str| -> Option<String> {
            let rest = if dir.is_empty() {
                path
            } else {
                path.strip_prefix(&dir)?.strip_prefix('/')?
            };
            if rest.is_empty() || rest.contains('/') {
                return None;
            }
            Some(rest.to_string())
        };

        let mut entries = Vec::new();
        for dir_path in &state.dirs {
            if let Some(name) = child_of(dir_path) {
                entries.push(FileMeta {
                    name,
                    size: 0,
                    is_dir: true,
                });
            }
        }
        for (file_path, data) in &state.files {
            if let Some(name) = child_of(file_path) {
                entries.push(FileMeta {
                    name,
                    size: data.len() as u64,
                    is_dir: false,
                });
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn stat(&self, name: &str) -> Result<FileMeta> {
        let name = join(&[name]);
        let state = self.state.lock().unwrap();
        let base = name.rsplit('/').next().unwrap_or("").to_string();
        if let Some(data) = state.files.get(&name) {
            return Ok(FileMeta {
                name: base,
                size: data.len() as u64,
                is_dir: false,
            });
        }
        if state.dirs.contains(&name) {
            return Ok(FileMeta {
                name: base,
                size: 0,
                is_dir: true,
            });
        }
        Err(Error::NotExist(format!("path {name}")))
    }

    fn mkdir_all(&self, dir: &str) -> Result<()> {
        let dir = join(&[dir]);
        let mut state = self.state.lock().unwrap();
        state.add_parents(&dir);
        state.dirs.insert(dir);
        Ok(())
    }

    fn creates_parent_dirs(&self) -> bool {
        true
    }
}

struct MemFile {
    path: String,
    cursor: Cursor<Vec<u8>>,
    fetches: Arc<Mutex<Vec<FetchCall>>>,
}

impl Read for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for MemFile {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl VfsFile for MemFile {
    fn fetch(&mut self, start: u64, end: u64) -> Result<()> {
        self.fetches.lock().unwrap().push(FetchCall {
            path: self.path.clone(),
            start,
            end,
        });
        Ok(())
    }
}

struct MemWriter {
    path: String,
    buf: Vec<u8>,
    state: Arc<Mutex<MemState>>,
}

impl MemWriter {
    fn commit(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.add_parents(&self.path);
        state.files.insert(self.path.clone(), self.buf.clone());
    }
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.commit();
        Ok(())
    }
}

impl Drop for MemWriter {
    fn drop(&mut self) {
        self.commit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_roundtrip() {
        let fs = MemFs::new();
        {
            let mut w = fs.create("a/b.dat").unwrap();
            w.write_all(b"data").unwrap();
        }
        let mut buf = Vec::new();
        fs.open("a/b.dat").unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"data");

        // Parent directories appear implicitly.
        let entries = fs.read_dir("").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a");
        assert!(entries[0].is_dir);
    }

    #[test]
    fn test_missing_paths() {
        let fs = MemFs::new();
        assert!(fs.open("nope").unwrap_err().is_not_exist());
        assert!(fs.read_dir("nope").unwrap_err().is_not_exist());
        assert!(fs.stat("nope").unwrap_err().is_not_exist());
        // The root exists from the start.
        assert!(fs.read_dir("").unwrap().is_empty());
    }

    #[test]
    fn test_fetch_recording() {
        let fs = MemFs::new();
        {
            let mut w = fs.create("f.dat").unwrap();
            w.write_all(&[0u8; 64]).unwrap();
        }
        let mut f = fs.open_fetcher("f.dat").unwrap();
        f.fetch(8, 24).unwrap();
        f.seek(SeekFrom::Start(8)).unwrap();

        let calls = fs.take_fetches();
        assert_eq!(
            calls,
            vec![FetchCall {
                path: "f.dat".to_string(),
                start: 8,
                end: 24
            }]
        );
        assert!(fs.take_fetches().is_empty());
    }
}
