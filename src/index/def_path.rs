//! Defs-by-path index: the unique `path` key of each def mapped to its byte
//! offset in `def.dat`.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use super::{read_blob, write_blob, DefIndex, PersistedIndex};
use crate::error::Result;
use crate::filter::Filter;
use crate::graph::Def;
use crate::offsets::ByteOffsets;

pub const DEF_PATH_INDEX_FILE: &str = "def-path.idx";

#[derive(Debug, Default)]
pub struct DefPathIndex {
    by_path: BTreeMap<String, i64>,
    ready: bool,
}

impl DefPathIndex {
    /// Builds the index from defs and their write offsets, in write order.
    pub fn build(&mut self, defs: &[Def], ofs: &ByteOffsets) {
        self.by_path = defs
            .iter()
            .zip(ofs)
            .map(|(def, &o)| (def.path.clone(), o))
            .collect();
        self.ready = true;
    }

    fn lookup(&self, path: &str) -> ByteOffsets {
        self.by_path.get(path).map(|&o| vec![o]).unwrap_or_default()
    }
}

impl PersistedIndex for DefPathIndex {
    fn ready(&self) -> bool {
        self.ready
    }

    fn write(&self, w: &mut dyn Write) -> Result<()> {
        write_blob(w, &self.by_path)
    }

    fn read(&mut self, r: &mut dyn Read) -> Result<()> {
        self.by_path = read_blob(r)?;
        self.ready = true;
        Ok(())
    }
}

impl DefIndex for DefPathIndex {
    fn covers(&self, filters: &[Filter]) -> usize {
        filters
            .iter()
            .filter(|f| matches!(f, Filter::ByDefPath(_) | Filter::ByDefKey(_)))
            .count()
    }

    fn def_offsets(&self, filters: &[Filter]) -> Option<ByteOffsets> {
        if !self.ready {
            return None;
        }
        for f in filters {
            match f {
                // A lookup miss is a definitive empty answer, not a
                // fallthrough: the path key is unique within the unit.
                Filter::ByDefPath(path) => return Some(self.lookup(path)),
                Filter::ByDefKey(key) => return Some(self.lookup(&key.path)),
                _ => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DefKey;

    fn build_index() -> DefPathIndex {
        let defs = vec![
            Def {
                path: "a".into(),
                ..Def::default()
            },
            Def {
                path: "b".into(),
                ..Def::default()
            },
        ];
        let mut index = DefPathIndex::default();
        index.build(&defs, &vec![0, 42]);
        index
    }

    #[test]
    fn test_covers_and_lookup() {
        let index = build_index();
        assert_eq!(index.covers(&[Filter::ByDefPath("a".into())]), 1);
        assert_eq!(index.covers(&[Filter::ByFiles(vec!["f".into()])]), 0);

        assert_eq!(
            index.def_offsets(&[Filter::ByDefPath("b".into())]),
            Some(vec![42])
        );
        assert_eq!(
            index.def_offsets(&[Filter::ByDefPath("missing".into())]),
            Some(vec![])
        );
        assert_eq!(index.def_offsets(&[Filter::ByDefQuery("a".into())]), None);

        let key = DefKey {
            path: "a".into(),
            ..DefKey::default()
        };
        assert_eq!(index.def_offsets(&[Filter::ByDefKey(key)]), Some(vec![0]));
    }

    #[test]
    fn test_persistence_roundtrip() {
        let index = build_index();
        let mut buf = Vec::new();
        index.write(&mut buf).unwrap();

        let mut restored = DefPathIndex::default();
        assert!(!restored.ready());
        assert_eq!(restored.def_offsets(&[Filter::ByDefPath("a".into())]), None);

        restored.read(&mut buf.as_slice()).unwrap();
        assert!(restored.ready());
        assert_eq!(
            restored.def_offsets(&[Filter::ByDefPath("a".into())]),
            Some(vec![0])
        );
    }
}
