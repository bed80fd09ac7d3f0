//! Secondary indices over the unit data files.
//!
//! An index consumes some of a query's filters and answers with byte
//! positions in `def.dat`/`ref.dat`; the planner in the indexed stores picks
//! the index with the highest coverage and falls back to a scan when none
//! covers anything or the chosen one cannot answer.
//!
//! ## Index file layout
//!
//! Every index persists as a single blob in its own `*.idx` file:
//!
//! ```text
//! +-----------+---------------+--------------+------------------+
//! | Magic (8) | Version (u32) | CRC-32 (u32) | bincode payload  |
//! +-----------+---------------+--------------+------------------+
//! ```

mod def_path;
mod def_query;
mod def_query_tree;
mod ref_file;

pub use def_path::{DefPathIndex, DEF_PATH_INDEX_FILE};
pub use def_query::{DefQueryIndex, DEF_QUERY_INDEX_FILE};
pub use def_query_tree::{
    DefQueryTreeIndex, UnitOffsets, MAX_TREE_UNITS, TREE_DEF_QUERY_INDEX_FILE,
};
pub use ref_file::{RefFileIndex, REF_FILE_INDEX_FILE};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{BufReader, Read, Write};

use crate::codec::CRC32;
use crate::error::Result;
use crate::filter::Filter;
use crate::offsets::{ByteOffsets, ByteRanges};
use crate::vfs::FileSystem;

const MAGIC: &[u8; 8] = b"SRCIDX\0\0";
const VERSION: u32 = 1;

/// An index that can be persisted next to the data files it accelerates.
pub trait PersistedIndex {
    /// Whether the index has been built or read and can answer queries.
    fn ready(&self) -> bool;

    /// Serializes the index as one blob.
    fn write(&self, w: &mut dyn Write) -> Result<()>;

    /// Replaces the index contents from a serialized blob.
    fn read(&mut self, r: &mut dyn Read) -> Result<()>;
}

/// An index over defs, answering with byte offsets into `def.dat`.
pub trait DefIndex: PersistedIndex {
    /// How many of the filters this index can consume.
    fn covers(&self, filters: &[Filter]) -> usize;

    /// Candidate offsets for the covered filters. `None` means the index
    /// cannot answer (not ready, or no covered filter present); an empty
    /// list is a definitive empty answer.
    fn def_offsets(&self, filters: &[Filter]) -> Option<ByteOffsets>;
}

/// An index over refs, answering with contiguous byte ranges in `ref.dat`.
pub trait RefIndex: PersistedIndex {
    fn covers(&self, filters: &[Filter]) -> usize;

    fn ref_ranges(&self, filters: &[Filter]) -> Option<Vec<ByteRanges>>;
}

pub(crate) fn write_blob<T: Serialize>(w: &mut dyn Write, value: &T) -> Result<()> {
    let payload = bincode::serialize(value)?;
    w.write_all(MAGIC)?;
    w.write_u32::<BigEndian>(VERSION)?;
    w.write_u32::<BigEndian>(CRC32.checksum(&payload))?;
    w.write_all(&payload)?;
    Ok(())
}

pub(crate) fn read_blob<T: DeserializeOwned>(r: &mut dyn Read) -> Result<T> {
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic)
        .map_err(|_| crate::corrupt!("index blob too short for magic"))?;
    if magic != *MAGIC {
        return Err(crate::corrupt!("bad index magic"));
    }
    let version = r
        .read_u32::<BigEndian>()
        .map_err(|_| crate::corrupt!("index blob too short for version"))?;
    if version != VERSION {
        return Err(crate::corrupt!("unsupported index version {version}"));
    }
    let checksum = r
        .read_u32::<BigEndian>()
        .map_err(|_| crate::corrupt!("index blob too short for checksum"))?;
    let mut payload = Vec::new();
    r.read_to_end(&mut payload)?;
    if CRC32.checksum(&payload) != checksum {
        return Err(crate::corrupt!("index checksum mismatch"));
    }
    Ok(bincode::deserialize(&payload)?)
}

/// Persists an index to its `*.idx` file.
pub(crate) fn write_index_file(
    fs: &dyn FileSystem,
    name: &str,
    index: &dyn PersistedIndex,
) -> Result<()> {
    let mut w = fs.create(name)?;
    index.write(&mut w)?;
    w.flush()?;
    Ok(())
}

/// Loads an index from its `*.idx` file. Returns false (leaving the index
/// untouched) when the file does not exist.
pub(crate) fn read_index_file(
    fs: &dyn FileSystem,
    name: &str,
    index: &mut dyn PersistedIndex,
) -> Result<bool> {
    let file = match fs.open(name) {
        Ok(file) => file,
        Err(e) if e.is_not_exist() => return Ok(false),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);
    index.read(&mut reader)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_blob_roundtrip() {
        let value: BTreeMap<String, i64> = [("a".to_string(), 1), ("b".to_string(), 2)]
            .into_iter()
            .collect();
        let mut buf = Vec::new();
        write_blob(&mut buf, &value).unwrap();
        let got: BTreeMap<String, i64> = read_blob(&mut buf.as_slice()).unwrap();
        assert_eq!(got, value);
    }

    #[test]
    fn test_blob_rejects_tampering() {
        let mut buf = Vec::new();
        write_blob(&mut buf, &vec![1i64, 2, 3]).unwrap();

        let mut bad_magic = buf.clone();
        bad_magic[0] = b'X';
        assert!(read_blob::<Vec<i64>>(&mut bad_magic.as_slice()).is_err());

        let mut bad_payload = buf.clone();
        let last = bad_payload.len() - 1;
        bad_payload[last] ^= 0xff;
        assert!(read_blob::<Vec<i64>>(&mut bad_payload.as_slice()).is_err());
    }
}
