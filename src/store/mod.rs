//! The four store levels and their composition.
//!
//! Each level stores the level below it under a subdirectory keyed by its
//! coordinate and narrows filter evaluation as it delegates downward:
//!
//! ```text
//! multi-repo root/
//!   <repo path>/.srclib-store/          repo store
//!     <commit>/                         tree store
//!       <unit-name>/<unit-type>.unit.json
//!       <unit-name>/<unit-type>/        unit store
//!         def.dat  ref.dat  *.idx
//!       def-query.idx                   tree-level index
//! ```
//!
//! Stores are read-only after import; import is single-writer per unit.

mod indexed_unit;
mod multi;
mod repo;
mod tree;
mod unit;

pub use indexed_unit::IndexedUnitStore;
pub use multi::{
    DefaultRepoPaths, FsMultiRepoStore, MultiRepoConfig, RepoPaths, REPO_STORE_DIR,
};
pub use repo::FsRepoStore;
pub use tree::{FsTreeStore, IndexedTreeStore, UNIT_FILE_SUFFIX};
pub use unit::FsUnitStore;

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::graph::{Def, DefKey, GraphOutput, Ref, SourceUnit, UnitId, Version};

/// A per-commit store of source units and their graph data.
pub trait TreeStore: Send + Sync {
    /// Returns the manifest of one unit; `NotExist` when it was never
    /// imported.
    fn unit(&self, id: &UnitId) -> Result<SourceUnit>;

    /// Lists unit manifests matching the filters.
    fn units(&self, filters: &[Filter]) -> Result<Vec<SourceUnit>>;

    /// Looks up a single def by key. The key's unit fields select the unit
    /// store; a key that names no imported unit yields `NotExist`.
    fn def(&self, key: &DefKey) -> Result<Def> {
        let defs = self.defs(&[Filter::ByDefKey(key.clone())])?;
        defs.into_iter()
            .next()
            .ok_or_else(|| Error::NotExist(format!("def {key}")))
    }

    fn defs(&self, filters: &[Filter]) -> Result<Vec<Def>>;

    fn refs(&self, filters: &[Filter]) -> Result<Vec<Ref>>;
}

/// Import surface of a tree store.
pub trait TreeImporter {
    /// Imports one unit's manifest and graph data. `None` initializes an
    /// empty tree directory.
    fn import(&self, unit: Option<&SourceUnit>, data: GraphOutput) -> Result<()>;

    /// Builds the cross-unit indexes. Call once after every unit of the
    /// tree has been imported.
    fn build_indexes(&self) -> Result<()>;
}

pub trait TreeStoreImporter: TreeStore + TreeImporter {}
impl<T: TreeStore + TreeImporter> TreeStoreImporter for T {}

/// A per-repository store of committed trees.
pub trait RepoStore: Send + Sync {
    fn versions(&self, filters: &[Filter]) -> Result<Vec<Version>>;

    fn units(&self, filters: &[Filter]) -> Result<Vec<SourceUnit>>;

    fn defs(&self, filters: &[Filter]) -> Result<Vec<Def>>;

    fn refs(&self, filters: &[Filter]) -> Result<Vec<Ref>>;
}

/// Import surface of a repo store.
pub trait RepoImporter {
    fn import(
        &self,
        commit_id: &str,
        unit: Option<&SourceUnit>,
        data: GraphOutput,
    ) -> Result<()>;

    fn build_indexes(&self, commit_id: &str) -> Result<()>;
}

/// A store spanning multiple repositories.
pub trait MultiRepoStore: Send + Sync {
    /// Lists repository names matching the filters.
    fn repos(&self, filters: &[Filter]) -> Result<Vec<String>>;

    fn units(&self, filters: &[Filter]) -> Result<Vec<SourceUnit>>;

    fn defs(&self, filters: &[Filter]) -> Result<Vec<Def>>;

    fn refs(&self, filters: &[Filter]) -> Result<Vec<Ref>>;
}

/// Import surface of a multi-repo store.
pub trait MultiRepoImporter {
    fn import(
        &self,
        repo: &str,
        commit_id: &str,
        unit: Option<&SourceUnit>,
        data: GraphOutput,
    ) -> Result<()>;

    fn build_indexes(&self, repo: &str, commit_id: &str) -> Result<()>;
}

/// Runs an index build, converting a panic into a corrupt-data error so a
/// malformed input cannot take down the importer.
pub(crate) fn guard_build(name: &str, build: impl FnOnce() -> Result<()>) -> Result<()> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(build)) {
        Ok(result) => result,
        Err(_) => Err(crate::corrupt!("panic while building {name} index")),
    }
}
