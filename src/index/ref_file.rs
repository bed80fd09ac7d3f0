//! Refs-by-file index: each file mapped to the contiguous byte range its
//! refs occupy in `ref.dat`. Valid because refs are written sorted by
//! `(file, start, end)`, so one seek per file suffices.

use std::io::{Read, Write};

use super::{read_blob, write_blob, PersistedIndex, RefIndex};
use crate::error::Result;
use crate::filter::Filter;
use crate::offsets::{ByteRanges, FileByteRanges};

pub const REF_FILE_INDEX_FILE: &str = "ref-file.idx";

#[derive(Debug, Default)]
pub struct RefFileIndex {
    ranges: FileByteRanges,
    ready: bool,
}

impl RefFileIndex {
    /// Builds the index from the byte ranges recorded while writing
    /// `ref.dat`.
    pub fn build(&mut self, ranges: &FileByteRanges) {
        self.ranges = ranges.clone();
        self.ready = true;
    }
}

impl PersistedIndex for RefFileIndex {
    fn ready(&self) -> bool {
        self.ready
    }

    fn write(&self, w: &mut dyn Write) -> Result<()> {
        write_blob(w, &self.ranges)
    }

    fn read(&mut self, r: &mut dyn Read) -> Result<()> {
        self.ranges = read_blob(r)?;
        self.ready = true;
        Ok(())
    }
}

impl RefIndex for RefFileIndex {
    fn covers(&self, filters: &[Filter]) -> usize {
        filters
            .iter()
            .filter(|f| matches!(f, Filter::ByFiles(_)))
            .count()
    }

    fn ref_ranges(&self, filters: &[Filter]) -> Option<Vec<ByteRanges>> {
        if !self.ready {
            return None;
        }
        for f in filters {
            if let Filter::ByFiles(files) = f {
                // Files without refs simply contribute no range.
                return Some(
                    files
                        .iter()
                        .filter_map(|file| self.ranges.get(file).cloned())
                        .collect(),
                );
            }
        }
        None
    }
}
