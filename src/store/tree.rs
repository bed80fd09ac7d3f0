//! Per-commit tree stores.
//!
//! A tree directory holds one `<unit-name>/<unit-type>.unit.json` manifest
//! and one `<unit-name>/<unit-type>/` data directory per source unit, plus a
//! tree-level `def-query.idx`. [`FsTreeStore`] dispatches queries to plain
//! scanning unit stores; [`IndexedTreeStore`] opens indexed unit stores and
//! short-circuits unit enumeration through the tree-level def-query index.

use std::collections::BTreeMap;
use std::io::{BufReader, Write};
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::guard_build;
use super::unit::FsUnitStore;
use super::IndexedUnitStore;
use super::{TreeImporter, TreeStore};
use crate::error::Result;
use crate::filter::{self, Filter};
use crate::graph::{clean_for_import, Def, GraphOutput, Ref, SourceUnit, UnitId};
use crate::index::{
    read_index_file, write_index_file, DefQueryIndex, DefQueryTreeIndex, PersistedIndex,
    DEF_QUERY_INDEX_FILE, TREE_DEF_QUERY_INDEX_FILE,
};
use crate::vfs::{self, FileSystem};

pub const UNIT_FILE_SUFFIX: &str = ".unit.json";

/// A tree store that scans its unit stores.
pub struct FsTreeStore {
    fs: Arc<dyn FileSystem>,
}

fn unit_filename(id: &UnitId) -> String {
    vfs::join(&[&id.name, &format!("{}{}", id.unit_type, UNIT_FILE_SUFFIX)])
}

fn unit_dir(id: &UnitId) -> String {
    vfs::join(&[&id.name, &id.unit_type])
}

fn unit_id_from_filename(path: &str) -> UnitId {
    let trimmed = path.strip_suffix(UNIT_FILE_SUFFIX).unwrap_or(path);
    match trimmed.rsplit_once('/') {
        Some((name, unit_type)) => UnitId::new(unit_type, name),
        None => UnitId::new(trimmed, ""),
    }
}

impl FsTreeStore {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    fn unit_filenames(&self) -> Result<Vec<String>> {
        Ok(vfs::walk_files(self.fs.as_ref(), ".")?
            .into_iter()
            .filter(|f| f.ends_with(UNIT_FILE_SUFFIX))
            .collect())
    }

    fn open_unit_file(&self, filename: &str) -> Result<SourceUnit> {
        let file = self.fs.open(filename)?;
        let unit = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| crate::corrupt!("unit manifest {filename}: {e}"))?;
        Ok(unit)
    }

    fn write_manifest(&self, unit: &SourceUnit) -> Result<()> {
        let filename = unit_filename(&unit.id());
        if let Some((dir, _)) = filename.rsplit_once('/') {
            vfs::ensure_dir(self.fs.as_ref(), dir)?;
        }
        let mut w = self.fs.create(&filename)?;
        serde_json::to_writer(&mut w, unit)?;
        w.flush()?;
        vfs::ensure_dir(self.fs.as_ref(), &unit_dir(&unit.id()))?;
        Ok(())
    }

    fn unit_store(&self, id: &UnitId) -> FsUnitStore {
        FsUnitStore::new(vfs::sub(Arc::clone(&self.fs), &unit_dir(id)), id.clone())
    }
}

impl TreeStore for FsTreeStore {
    fn unit(&self, id: &UnitId) -> Result<SourceUnit> {
        self.open_unit_file(&unit_filename(id))
    }

    fn units(&self, filters: &[Filter]) -> Result<Vec<SourceUnit>> {
        let mut units = Vec::new();
        for filename in self.unit_filenames()? {
            let unit = self.open_unit_file(&filename)?;
            if filter::select_unit(filters, &unit) {
                units.push(unit);
            }
        }
        Ok(units)
    }

    fn defs(&self, filters: &[Filter]) -> Result<Vec<Def>> {
        let mut defs = Vec::new();
        for unit in self.units(filters)? {
            defs.extend(self.unit_store(&unit.id()).defs(filters)?);
        }
        Ok(defs)
    }

    fn refs(&self, filters: &[Filter]) -> Result<Vec<Ref>> {
        let mut refs = Vec::new();
        for unit in self.units(filters)? {
            refs.extend(self.unit_store(&unit.id()).refs(filters)?);
        }
        Ok(refs)
    }
}

impl TreeImporter for FsTreeStore {
    fn import(&self, unit: Option<&SourceUnit>, mut data: GraphOutput) -> Result<()> {
        let Some(unit) = unit else {
            return self.fs.mkdir_all(".");
        };
        self.write_manifest(unit)?;
        clean_for_import(&mut data, "", &unit.unit_type, &unit.name);
        self.unit_store(&unit.id()).import(data)
    }

    fn build_indexes(&self) -> Result<()> {
        Ok(()) // scan-only store
    }
}

/// A tree store whose unit stores are indexed and which carries the
/// tree-level def-query index.
pub struct IndexedTreeStore {
    inner: FsTreeStore,
    fs: Arc<dyn FileSystem>,
    def_query: Mutex<DefQueryTreeIndex>,
}

impl IndexedTreeStore {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            inner: FsTreeStore::new(Arc::clone(&fs)),
            fs,
            def_query: Mutex::new(DefQueryTreeIndex::default()),
        }
    }

    fn unit_store(&self, id: &UnitId) -> IndexedUnitStore {
        IndexedUnitStore::new(vfs::sub(Arc::clone(&self.fs), &unit_dir(id)), id.clone())
    }

    /// Answers a def query from the tree index: a map of unit to candidate
    /// offsets, without enumerating unit manifests. `None` means the index
    /// cannot answer and the caller must dispatch per unit.
    fn tree_index_offsets(
        &self,
        filters: &[Filter],
    ) -> Result<Option<BTreeMap<UnitId, Vec<i64>>>> {
        let mut index = self.def_query.lock().unwrap();
        if index.covers(filters) == 0 {
            return Ok(None);
        }
        if !index.ready() {
            read_index_file(self.fs.as_ref(), TREE_DEF_QUERY_INDEX_FILE, &mut *index)?;
        }
        Ok(index.def_offsets_by_unit(filters))
    }
}

impl TreeStore for IndexedTreeStore {
    fn unit(&self, id: &UnitId) -> Result<SourceUnit> {
        self.inner.unit(id)
    }

    fn units(&self, filters: &[Filter]) -> Result<Vec<SourceUnit>> {
        self.inner.units(filters)
    }

    fn defs(&self, filters: &[Filter]) -> Result<Vec<Def>> {
        if let Some(by_unit) = self.tree_index_offsets(filters)? {
            debug!(units = by_unit.len(), "defs via tree def-query index");
            let scope = filter::unit_scope(filters);
            let mut defs = Vec::new();
            for (unit, ofs) in by_unit {
                if let Some(scope) = &scope {
                    if !scope.contains(&unit) {
                        continue;
                    }
                }
                defs.extend(self.unit_store(&unit).defs_at_offsets(&ofs, filters)?);
            }
            return Ok(defs);
        }

        let mut defs = Vec::new();
        for unit in self.inner.units(filters)? {
            defs.extend(self.unit_store(&unit.id()).defs(filters)?);
        }
        Ok(defs)
    }

    fn refs(&self, filters: &[Filter]) -> Result<Vec<Ref>> {
        let mut refs = Vec::new();
        for unit in self.inner.units(filters)? {
            refs.extend(self.unit_store(&unit.id()).refs(filters)?);
        }
        Ok(refs)
    }
}

impl TreeImporter for IndexedTreeStore {
    fn import(&self, unit: Option<&SourceUnit>, mut data: GraphOutput) -> Result<()> {
        let Some(unit) = unit else {
            return self.fs.mkdir_all(".");
        };
        self.inner.write_manifest(unit)?;
        clean_for_import(&mut data, "", &unit.unit_type, &unit.name);
        self.unit_store(&unit.id()).import(data)
    }

    /// Aggregates the per-unit def-query indices into the tree-level index.
    fn build_indexes(&self) -> Result<()> {
        let mut unit_indexes = BTreeMap::new();
        for filename in self.inner.unit_filenames()? {
            let id = unit_id_from_filename(&filename);
            let mut index = DefQueryIndex::default();
            let path = vfs::join(&[&unit_dir(&id), DEF_QUERY_INDEX_FILE]);
            if read_index_file(self.fs.as_ref(), &path, &mut index)? {
                unit_indexes.insert(id, index);
            }
        }

        let mut tree_index = DefQueryTreeIndex::default();
        guard_build("def-query tree", || tree_index.build(&unit_indexes))?;
        write_index_file(self.fs.as_ref(), TREE_DEF_QUERY_INDEX_FILE, &tree_index)?;
        debug!(units = unit_indexes.len(), "built tree def-query index");
        *self.def_query.lock().unwrap() = tree_index;
        Ok(())
    }
}
