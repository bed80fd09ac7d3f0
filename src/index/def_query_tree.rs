//! Tree-level def-query index: one automaton per commit aggregating every
//! unit's def-query terms, so a prefix query can locate matching defs across
//! the whole tree without opening each unit store.
//!
//! Units are numbered with a `u8` in `(name, unit_type)` order; a tree
//! supports at most 255 indexed units and the rest are skipped with a
//! warning. Each term's postings row holds `(unit number, delta-encoded
//! offsets in that unit's def.dat)`.

use fst::automaton::Str;
use fst::{Automaton, IntoStreamer, Map, MapBuilder, Streamer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use tracing::warn;

use super::{read_blob, write_blob, DefQueryIndex, PersistedIndex};
use crate::error::Result;
use crate::filter::Filter;
use crate::graph::UnitId;
use crate::offsets::{delta_decode, delta_encode, ByteOffsets};

pub const TREE_DEF_QUERY_INDEX_FILE: &str = "def-query.idx";

/// Maximum number of units a tree-level index can address.
pub const MAX_TREE_UNITS: usize = u8::MAX as usize;

/// One unit's postings for a term: the unit's number and the delta-encoded
/// offsets of the matching defs in that unit's `def.dat`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOffsets {
    pub unit: u8,
    pub offsets: Vec<i64>,
}

#[derive(Default)]
pub struct DefQueryTreeIndex {
    map: Option<Map<Vec<u8>>>,
    /// Indexed by the unit number assigned at build time.
    units: Vec<UnitId>,
    /// Postings rows aligned with the term ordinals.
    values: Vec<Vec<UnitOffsets>>,
    ready: bool,
}

#[derive(Serialize, Deserialize)]
struct TreeData {
    fst: Vec<u8>,
    units: Vec<UnitId>,
    values: Vec<Vec<UnitOffsets>>,
}

impl DefQueryTreeIndex {
    /// Builds the tree index from the per-unit def-query indices.
    pub fn build(&mut self, unit_indexes: &BTreeMap<UnitId, DefQueryIndex>) -> Result<()> {
        let mut units: Vec<UnitId> = unit_indexes.keys().cloned().collect();
        if units.len() > MAX_TREE_UNITS {
            warn!(
                total = units.len(),
                max = MAX_TREE_UNITS,
                "def-query tree index supports at most {MAX_TREE_UNITS} source units; \
                 units beyond the limit will not be indexed"
            );
            units.truncate(MAX_TREE_UNITS);
        }
        let unit_nums: BTreeMap<&UnitId, u8> = units
            .iter()
            .enumerate()
            .map(|(i, u)| (u, i as u8))
            .collect();

        let mut term_postings: BTreeMap<String, Vec<UnitOffsets>> = BTreeMap::new();
        for (unit, index) in unit_indexes {
            let Some(&num) = unit_nums.get(unit) else {
                continue; // beyond the unit limit
            };
            for (term, posting) in index.terms() {
                term_postings.entry(term).or_default().push(UnitOffsets {
                    unit: num,
                    offsets: delta_encode(&posting),
                });
            }
        }

        let mut builder = MapBuilder::memory();
        let mut values = Vec::with_capacity(term_postings.len());
        for (i, (term, postings)) in term_postings.into_iter().enumerate() {
            builder.insert(term.as_bytes(), i as u64)?;
            values.push(postings);
        }
        self.map = Some(Map::new(builder.into_inner()?)?);
        self.units = units;
        self.values = values;
        self.ready = true;
        Ok(())
    }

    /// Defs matching the lowercased query prefix, grouped by unit, as
    /// absolute offsets into each unit's `def.dat`.
    pub fn query(&self, query: &str) -> BTreeMap<UnitId, ByteOffsets> {
        let mut out: BTreeMap<UnitId, ByteOffsets> = BTreeMap::new();
        let Some(map) = &self.map else {
            return out;
        };
        let prefix = query.to_lowercase();
        let mut stream = map.search(Str::new(&prefix).starts_with()).into_stream();
        while let Some((_, ord)) = stream.next() {
            for posting in &self.values[ord as usize] {
                let unit = self.units[posting.unit as usize].clone();
                out.entry(unit)
                    .or_default()
                    .extend(delta_decode(&posting.offsets));
            }
        }
        for offsets in out.values_mut() {
            offsets.sort_unstable();
            offsets.dedup();
        }
        out
    }

    /// How many of the filters this index can consume.
    pub fn covers(&self, filters: &[Filter]) -> usize {
        filters
            .iter()
            .filter(|f| matches!(f, Filter::ByDefQuery(_)))
            .count()
    }

    /// Per-unit candidate offsets for a covered def-query filter, or `None`
    /// if the index cannot answer.
    pub fn def_offsets_by_unit(
        &self,
        filters: &[Filter],
    ) -> Option<BTreeMap<UnitId, ByteOffsets>> {
        if !self.ready {
            return None;
        }
        crate::filter::def_query(filters).map(|q| self.query(q))
    }
}

impl PersistedIndex for DefQueryTreeIndex {
    fn ready(&self) -> bool {
        self.ready
    }

    fn write(&self, w: &mut dyn Write) -> Result<()> {
        let Some(map) = &self.map else {
            return Err(crate::corrupt!("def-query tree index not built"));
        };
        let data = TreeData {
            fst: map.as_fst().as_bytes().to_vec(),
            units: self.units.clone(),
            values: self.values.clone(),
        };
        write_blob(w, &data)
    }

    fn read(&mut self, r: &mut dyn Read) -> Result<()> {
        let data: TreeData = read_blob(r)?;
        let map = Map::new(data.fst)?;
        if map.len() != data.values.len() {
            return Err(crate::corrupt!(
                "def-query tree index has {} terms but {} postings rows",
                map.len(),
                data.values.len()
            ));
        }
        for postings in &data.values {
            for p in postings {
                if p.unit as usize >= data.units.len() {
                    return Err(crate::corrupt!(
                        "def-query tree index posting names unit {} of {}",
                        p.unit,
                        data.units.len()
                    ));
                }
            }
        }
        self.map = Some(map);
        self.units = data.units;
        self.values = data.values;
        self.ready = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Def;

    fn unit_index(names: &[&str]) -> DefQueryIndex {
        let defs: Vec<Def> = names
            .iter()
            .enumerate()
            .map(|(i, name)| Def {
                path: format!("{}.{i}", name.to_lowercase()),
                name: name.to_string(),
                ..Def::default()
            })
            .collect();
        let ofs = (0..defs.len() as i64).map(|i| i * 50).collect();
        let mut index = DefQueryIndex::default();
        index.build(&defs, &ofs).unwrap();
        index
    }

    #[test]
    fn test_query_groups_by_unit() {
        let mut unit_indexes = BTreeMap::new();
        unit_indexes.insert(UnitId::new("t", "u1"), unit_index(&["Foo", "Bar"]));
        unit_indexes.insert(UnitId::new("t", "u2"), unit_index(&["FooBar"]));

        let mut tree = DefQueryTreeIndex::default();
        tree.build(&unit_indexes).unwrap();

        let got = tree.query("fo");
        assert_eq!(got.len(), 2);
        assert_eq!(got[&UnitId::new("t", "u1")], vec![0]);
        assert_eq!(got[&UnitId::new("t", "u2")], vec![0]);

        let got = tree.query("foob");
        assert_eq!(got.len(), 1);
        assert_eq!(got[&UnitId::new("t", "u2")], vec![0]);

        assert!(tree.query("zzz").is_empty());
    }

    #[test]
    fn test_unit_limit_keeps_lex_first_units() {
        let mut unit_indexes = BTreeMap::new();
        for i in 0..300 {
            unit_indexes.insert(UnitId::new("t", format!("u{i:03}")), unit_index(&["X"]));
        }
        let mut tree = DefQueryTreeIndex::default();
        tree.build(&unit_indexes).unwrap();

        let got = tree.query("x");
        assert_eq!(got.len(), MAX_TREE_UNITS);
        assert!(got.contains_key(&UnitId::new("t", "u000")));
        assert!(got.contains_key(&UnitId::new("t", "u254")));
        assert!(!got.contains_key(&UnitId::new("t", "u255")));
        assert!(!got.contains_key(&UnitId::new("t", "u299")));
    }

    #[test]
    fn test_persistence_roundtrip() {
        let mut unit_indexes = BTreeMap::new();
        unit_indexes.insert(UnitId::new("t", "u1"), unit_index(&["Foo", "Quux"]));
        let mut tree = DefQueryTreeIndex::default();
        tree.build(&unit_indexes).unwrap();

        let mut buf = Vec::new();
        tree.write(&mut buf).unwrap();

        let mut restored = DefQueryTreeIndex::default();
        restored.read(&mut buf.as_slice()).unwrap();
        assert!(restored.ready());
        assert_eq!(restored.query("qu"), tree.query("qu"));
    }

    #[test]
    fn test_covers_and_answering() {
        let mut unit_indexes = BTreeMap::new();
        unit_indexes.insert(UnitId::new("t", "u"), unit_index(&["Foo"]));
        let mut tree = DefQueryTreeIndex::default();

        assert_eq!(tree.covers(&[Filter::ByDefQuery("f".into())]), 1);
        // Not built yet: cannot answer.
        assert!(tree
            .def_offsets_by_unit(&[Filter::ByDefQuery("f".into())])
            .is_none());

        tree.build(&unit_indexes).unwrap();
        let got = tree
            .def_offsets_by_unit(&[Filter::ByDefQuery("f".into())])
            .unwrap();
        assert_eq!(got.len(), 1);
        assert!(tree
            .def_offsets_by_unit(&[Filter::ByDefPath("p".into())])
            .is_none());
    }
}
