//! Per-repository store: each child directory of the repo root is one
//! committed tree, named by its commit ID.

use std::sync::Arc;

use super::{FsTreeStore, IndexedTreeStore, RepoImporter, RepoStore, TreeStoreImporter};
use crate::config::StoreConfig;
use crate::error::Result;
use crate::filter::{self, Filter};
use crate::graph::{Def, GraphOutput, Ref, SourceUnit, Version};
use crate::vfs::{self, FileSystem};

pub struct FsRepoStore {
    fs: Arc<dyn FileSystem>,
    config: StoreConfig,
}

impl FsRepoStore {
    pub fn new(fs: Arc<dyn FileSystem>, config: StoreConfig) -> Self {
        Self { fs, config }
    }

    fn open_tree(&self, commit_id: &str) -> Box<dyn TreeStoreImporter> {
        let fs = vfs::sub(Arc::clone(&self.fs), commit_id);
        if self.config.use_indexed_store {
            Box::new(IndexedTreeStore::new(fs))
        } else {
            Box::new(FsTreeStore::new(fs))
        }
    }
}

impl RepoStore for FsRepoStore {
    fn versions(&self, filters: &[Filter]) -> Result<Vec<Version>> {
        let mut versions = Vec::new();
        for entry in self.fs.read_dir(".")? {
            if !entry.is_dir {
                continue;
            }
            let version = Version {
                commit_id: entry.name,
            };
            if filter::select_version(filters, &version) {
                versions.push(version);
            }
        }
        Ok(versions)
    }

    fn units(&self, filters: &[Filter]) -> Result<Vec<SourceUnit>> {
        let mut units = Vec::new();
        for version in self.versions(filters)? {
            units.extend(self.open_tree(&version.commit_id).units(filters)?);
        }
        Ok(units)
    }

    fn defs(&self, filters: &[Filter]) -> Result<Vec<Def>> {
        let mut defs = Vec::new();
        for version in self.versions(filters)? {
            let mut tree_defs = self.open_tree(&version.commit_id).defs(filters)?;
            for def in &mut tree_defs {
                def.commit_id = version.commit_id.clone();
            }
            defs.append(&mut tree_defs);
        }
        Ok(defs)
    }

    fn refs(&self, filters: &[Filter]) -> Result<Vec<Ref>> {
        let mut refs = Vec::new();
        for version in self.versions(filters)? {
            let mut tree_refs = self.open_tree(&version.commit_id).refs(filters)?;
            for r in &mut tree_refs {
                r.commit_id = version.commit_id.clone();
            }
            refs.append(&mut tree_refs);
        }
        Ok(refs)
    }
}

impl RepoImporter for FsRepoStore {
    fn import(
        &self,
        commit_id: &str,
        unit: Option<&SourceUnit>,
        data: GraphOutput,
    ) -> Result<()> {
        self.open_tree(commit_id).import(unit, data)
    }

    fn build_indexes(&self, commit_id: &str) -> Result<()> {
        self.open_tree(commit_id).build_indexes()
    }
}
