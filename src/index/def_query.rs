//! Per-unit def-query index: a minimal acyclic finite-state automaton over
//! the lowercased names and paths of the unit's defs, with a postings row
//! per term holding the matching defs' offsets in `def.dat`.
//!
//! Terms are whole strings; identifiers are not split further. The
//! `ByDefQuery` predicate mirrors this exactly (case-insensitive prefix of
//! name or path), so index answers and scan answers always agree. The term
//! extraction is part of the on-disk format.

use fst::automaton::Str;
use fst::{Automaton, IntoStreamer, Map, MapBuilder, Streamer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};

use super::{read_blob, write_blob, DefIndex, PersistedIndex};
use crate::error::Result;
use crate::filter::Filter;
use crate::graph::Def;
use crate::offsets::{delta_decode, delta_encode, ByteOffsets};

pub const DEF_QUERY_INDEX_FILE: &str = "def-query.idx";

#[derive(Default)]
pub struct DefQueryIndex {
    /// Automaton mapping each term to its ordinal in the sorted term set.
    map: Option<Map<Vec<u8>>>,
    /// Postings aligned with the term ordinals; absolute offsets in memory.
    values: Vec<ByteOffsets>,
    ready: bool,
}

/// Serialized form; postings are delta-encoded on disk.
#[derive(Serialize, Deserialize)]
struct DefQueryData {
    fst: Vec<u8>,
    values: Vec<Vec<i64>>,
}

impl DefQueryIndex {
    /// Builds the index from defs and their write offsets, in write order.
    pub fn build(&mut self, defs: &[Def], ofs: &ByteOffsets) -> Result<()> {
        let mut terms: BTreeMap<String, ByteOffsets> = BTreeMap::new();
        for (def, &o) in defs.iter().zip(ofs) {
            for term in [def.name.to_lowercase(), def.path.to_lowercase()] {
                if term.is_empty() {
                    continue;
                }
                let posting = terms.entry(term).or_default();
                // Offsets arrive in increasing order; a def whose name and
                // path coincide must not double-post.
                if posting.last() != Some(&o) {
                    posting.push(o);
                }
            }
        }

        let mut builder = MapBuilder::memory();
        let mut values = Vec::with_capacity(terms.len());
        for (i, (term, posting)) in terms.into_iter().enumerate() {
            builder.insert(term.as_bytes(), i as u64)?;
            values.push(posting);
        }
        self.map = Some(Map::new(builder.into_inner()?)?);
        self.values = values;
        self.ready = true;
        Ok(())
    }

    /// All offsets whose term has the lowercased query as a prefix, sorted
    /// and deduplicated.
    pub fn query(&self, query: &str) -> ByteOffsets {
        let Some(map) = &self.map else {
            return Vec::new();
        };
        let prefix = query.to_lowercase();
        let mut out = Vec::new();
        let mut stream = map.search(Str::new(&prefix).starts_with()).into_stream();
        while let Some((_, ord)) = stream.next() {
            out.extend_from_slice(&self.values[ord as usize]);
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Terms in lexicographic order with their absolute postings. Used to
    /// aggregate per-unit indices into the tree-level index.
    pub fn terms(&self) -> Vec<(String, ByteOffsets)> {
        let Some(map) = &self.map else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(self.values.len());
        let mut stream = map.stream();
        while let Some((term, ord)) = stream.next() {
            out.push((
                String::from_utf8_lossy(term).into_owned(),
                self.values[ord as usize].clone(),
            ));
        }
        out
    }
}

impl PersistedIndex for DefQueryIndex {
    fn ready(&self) -> bool {
        self.ready
    }

    fn write(&self, w: &mut dyn Write) -> Result<()> {
        let Some(map) = &self.map else {
            return Err(crate::corrupt!("def-query index not built"));
        };
        let data = DefQueryData {
            fst: map.as_fst().as_bytes().to_vec(),
            values: self.values.iter().map(|v| delta_encode(v)).collect(),
        };
        write_blob(w, &data)
    }

    fn read(&mut self, r: &mut dyn Read) -> Result<()> {
        let data: DefQueryData = read_blob(r)?;
        let map = Map::new(data.fst)?;
        if map.len() != data.values.len() {
            return Err(crate::corrupt!(
                "def-query index has {} terms but {} postings rows",
                map.len(),
                data.values.len()
            ));
        }
        self.map = Some(map);
        self.values = data.values.iter().map(|v| delta_decode(v)).collect();
        self.ready = true;
        Ok(())
    }
}

impl DefIndex for DefQueryIndex {
    fn covers(&self, filters: &[Filter]) -> usize {
        filters
            .iter()
            .filter(|f| matches!(f, Filter::ByDefQuery(_)))
            .count()
    }

    fn def_offsets(&self, filters: &[Filter]) -> Option<ByteOffsets> {
        if !self.ready {
            return None;
        }
        crate::filter::def_query(filters).map(|q| self.query(q))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named_defs(names: &[&str]) -> (Vec<Def>, ByteOffsets) {
        let defs: Vec<Def> = names
            .iter()
            .enumerate()
            .map(|(i, name)| Def {
                path: format!("p{i}"),
                name: name.to_string(),
                ..Def::default()
            })
            .collect();
        let ofs = (0..defs.len() as i64).map(|i| i * 100).collect();
        (defs, ofs)
    }

    fn build_index(names: &[&str]) -> DefQueryIndex {
        let (defs, ofs) = named_defs(names);
        let mut index = DefQueryIndex::default();
        index.build(&defs, &ofs).unwrap();
        index
    }

    #[test]
    fn test_prefix_query() {
        let index = build_index(&["Foo", "FooBar", "Quux"]);
        assert_eq!(index.query("fo"), vec![0, 100]);
        assert_eq!(index.query("foob"), vec![100]);
        assert_eq!(index.query("Foo"), vec![0, 100]);
        assert_eq!(index.query("zzz"), Vec::<i64>::new());
        // Paths are terms too.
        assert_eq!(index.query("p2"), vec![200]);
    }

    #[test]
    fn test_query_monotonicity() {
        let index = build_index(&["Foo", "FooBar", "FooBaz", "Bar"]);
        let query = "foobar";
        for end in 1..=query.len() {
            let wide = index.query(&query[..end.saturating_sub(1)]);
            let narrow = index.query(&query[..end]);
            for o in &narrow {
                assert!(wide.contains(o), "prefix {} lost offset {o}", &query[..end]);
            }
        }
    }

    #[test]
    fn test_same_name_and_path_posts_once() {
        let defs = vec![Def {
            path: "same".into(),
            name: "Same".into(),
            ..Def::default()
        }];
        let mut index = DefQueryIndex::default();
        index.build(&defs, &vec![0]).unwrap();
        assert_eq!(index.query("sa"), vec![0]);
    }

    #[test]
    fn test_empty_index() {
        let mut index = DefQueryIndex::default();
        index.build(&[], &vec![]).unwrap();
        assert!(index.ready());
        assert_eq!(index.query("a"), Vec::<i64>::new());
        assert!(index.terms().is_empty());
    }

    #[test]
    fn test_persistence_roundtrip() {
        let index = build_index(&["Foo", "FooBar", "Quux"]);
        let mut buf = Vec::new();
        index.write(&mut buf).unwrap();

        let mut restored = DefQueryIndex::default();
        restored.read(&mut buf.as_slice()).unwrap();
        assert_eq!(restored.query("fo"), index.query("fo"));
        assert_eq!(restored.terms(), index.terms());
    }

    #[test]
    fn test_covers() {
        let index = build_index(&["Foo"]);
        assert_eq!(index.covers(&[Filter::ByDefQuery("f".into())]), 1);
        assert_eq!(index.covers(&[Filter::ByDefPath("p".into())]), 0);
        assert_eq!(
            index.def_offsets(&[Filter::ByDefQuery("f".into())]),
            Some(vec![0])
        );
        assert_eq!(index.def_offsets(&[Filter::ByDefPath("p0".into())]), None);
    }
}
