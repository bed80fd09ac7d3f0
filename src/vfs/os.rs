//! Store filesystem backed by a directory on the local disk.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use super::{FileMeta, FileSystem, VfsFile};
use crate::error::Result;

impl VfsFile for File {}

/// A [`FileSystem`] rooted at a local directory. Does not create parent
/// directories implicitly; the engine calls `mkdir_all` where needed.
pub struct OsFs {
    root: PathBuf,
}

impl OsFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        let mut path = self.root.clone();
        for seg in name.split('/') {
            if seg.is_empty() || seg == "." {
                continue;
            }
            path.push(seg);
        }
        path
    }
}

impl FileSystem for OsFs {
    fn open(&self, name: &str) -> Result<Box<dyn VfsFile>> {
        Ok(Box::new(File::open(self.resolve(name))?))
    }

    fn create(&self, name: &str) -> Result<Box<dyn Write + Send>> {
        Ok(Box::new(File::create(self.resolve(name))?))
    }

    fn read_dir(&self, dir: &str) -> Result<Vec<FileMeta>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(self.resolve(dir))? {
            let entry = entry?;
            let meta = entry.metadata()?;
            entries.push(FileMeta {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
                is_dir: meta.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn stat(&self, name: &str) -> Result<FileMeta> {
        let path = self.resolve(name);
        let meta = std::fs::metadata(&path)?;
        let base = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(FileMeta {
            name: base,
            size: meta.len(),
            is_dir: meta.is_dir(),
        })
    }

    fn mkdir_all(&self, dir: &str) -> Result<()> {
        std::fs::create_dir_all(self.resolve(dir))?;
        Ok(())
    }
}
