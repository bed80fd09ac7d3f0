//! The indexed unit store: a [`FsUnitStore`] plus its persisted indices and
//! the planner that decides between them and a scan.
//!
//! For a query, each index reports how many filters it covers; the planner
//! consults the one with the highest coverage (ties broken by a fixed
//! priority: by-path before by-query) and reads only the records it names.
//! When no index covers anything, or the chosen index is missing or cannot
//! answer, the query falls through to a full scan. Covered filters are
//! re-applied to the decoded records, so an indexed answer can never differ
//! from a scan.
//!
//! Indices are built and persisted at import and loaded lazily on first use.

use std::sync::{Arc, Mutex};
use tracing::debug;

use super::guard_build;
use super::unit::FsUnitStore;
use crate::error::Result;
use crate::filter::Filter;
use crate::graph::{clean_for_import, Def, GraphOutput, Ref, UnitId};
use crate::index::{
    read_index_file, write_index_file, DefIndex, DefPathIndex, DefQueryIndex, PersistedIndex,
    RefFileIndex, RefIndex, DEF_PATH_INDEX_FILE, DEF_QUERY_INDEX_FILE, REF_FILE_INDEX_FILE,
};
use crate::offsets::ByteOffsets;
use crate::vfs::FileSystem;

pub struct IndexedUnitStore {
    fs: Arc<dyn FileSystem>,
    raw: FsUnitStore,
    def_path: Mutex<DefPathIndex>,
    def_query: Mutex<DefQueryIndex>,
    ref_file: Mutex<RefFileIndex>,
}

impl IndexedUnitStore {
    pub fn new(fs: Arc<dyn FileSystem>, unit: UnitId) -> Self {
        Self {
            raw: FsUnitStore::new(Arc::clone(&fs), unit),
            fs,
            def_path: Mutex::new(DefPathIndex::default()),
            def_query: Mutex::new(DefQueryIndex::default()),
            ref_file: Mutex::new(RefFileIndex::default()),
        }
    }

    pub fn unit_id(&self) -> &UnitId {
        self.raw.unit_id()
    }

    pub fn defs(&self, filters: &[Filter]) -> Result<Vec<Def>> {
        if let Some(ofs) = self.plan_def_offsets(filters)? {
            return self.raw.defs_at_offsets(&ofs, filters);
        }
        self.raw.defs(filters)
    }

    /// Offset-driven def reads, used by the tree-level index.
    pub fn defs_at_offsets(&self, ofs: &[i64], filters: &[Filter]) -> Result<Vec<Def>> {
        self.raw.defs_at_offsets(ofs, filters)
    }

    pub fn refs(&self, filters: &[Filter]) -> Result<Vec<Ref>> {
        {
            let mut index = self.ref_file.lock().unwrap();
            if index.covers(filters) > 0 {
                self.load(&mut *index, REF_FILE_INDEX_FILE)?;
                if let Some(ranges) = index.ref_ranges(filters) {
                    debug!(unit = %self.unit_id(), ranges = ranges.len(), "refs via ref-file index");
                    drop(index);
                    return self.raw.refs_at_byte_ranges(&ranges, filters);
                }
            }
        }
        self.raw.refs(filters)
    }

    /// Picks the def index with the highest coverage and asks it for
    /// candidate offsets. `None` means scan.
    fn plan_def_offsets(&self, filters: &[Filter]) -> Result<Option<ByteOffsets>> {
        let mut def_path = self.def_path.lock().unwrap();
        let mut def_query = self.def_query.lock().unwrap();
        let path_cov = def_path.covers(filters);
        let query_cov = def_query.covers(filters);
        if path_cov == 0 && query_cov == 0 {
            return Ok(None);
        }

        if path_cov >= query_cov {
            self.load(&mut *def_path, DEF_PATH_INDEX_FILE)?;
            let answer = def_path.def_offsets(filters);
            if answer.is_some() {
                debug!(unit = %self.unit_id(), covered = path_cov, "defs via def-path index");
            }
            Ok(answer)
        } else {
            self.load(&mut *def_query, DEF_QUERY_INDEX_FILE)?;
            let answer = def_query.def_offsets(filters);
            if answer.is_some() {
                debug!(unit = %self.unit_id(), covered = query_cov, "defs via def-query index");
            }
            Ok(answer)
        }
    }

    /// Reads an index file into the given index if it is not ready yet. A
    /// missing file leaves it unready, which the planner treats as
    /// unanswerable.
    fn load(&self, index: &mut dyn PersistedIndex, name: &str) -> Result<()> {
        if index.ready() {
            return Ok(());
        }
        read_index_file(self.fs.as_ref(), name, index)?;
        Ok(())
    }

    /// Cleans and writes one unit's graph data, then builds and persists
    /// all indices from the written layout.
    pub fn import(&self, mut data: GraphOutput) -> Result<()> {
        let unit = self.unit_id().clone();
        clean_for_import(&mut data, "", &unit.unit_type, &unit.name);

        let def_ofs = self.raw.write_defs(&data.defs)?;
        let (fbr, _ref_ofs) = self.raw.write_refs(&mut data.refs)?;

        let mut def_path = DefPathIndex::default();
        guard_build("def-path", || {
            def_path.build(&data.defs, &def_ofs);
            Ok(())
        })?;
        write_index_file(self.fs.as_ref(), DEF_PATH_INDEX_FILE, &def_path)?;
        *self.def_path.lock().unwrap() = def_path;

        let mut def_query = DefQueryIndex::default();
        guard_build("def-query", || def_query.build(&data.defs, &def_ofs))?;
        write_index_file(self.fs.as_ref(), DEF_QUERY_INDEX_FILE, &def_query)?;
        *self.def_query.lock().unwrap() = def_query;

        let mut ref_file = RefFileIndex::default();
        guard_build("ref-file", || {
            ref_file.build(&fbr);
            Ok(())
        })?;
        write_index_file(self.fs.as_ref(), REF_FILE_INDEX_FILE, &ref_file)?;
        *self.ref_file.lock().unwrap() = ref_file;

        debug!(unit = %self.unit_id(), defs = data.defs.len(), refs = data.refs.len(), "imported unit");
        Ok(())
    }
}
