//! Multi-repository store.
//!
//! Repository data lives under a per-repo subdirectory resolved by a
//! pluggable [`RepoPaths`] mapping; the default stores a repo named
//! `github.com/a/b` at `github.com/a/b/.srclib-store`. Listing repositories
//! walks the directory tree looking for store directories; when a query is
//! scoped to exactly one repo, the walk starts from a string that sorts
//! immediately before that repo's path, so it yields the scoped repo and
//! nothing else.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::{FsRepoStore, MultiRepoImporter, MultiRepoStore, RepoImporter, RepoStore};
use crate::config::StoreConfig;
use crate::error::Result;
use crate::filter::{self, Filter};
use crate::graph::{Def, GraphOutput, Ref, SourceUnit};
use crate::vfs::{self, FileSystem};

/// Directory name a repository's store lives under.
pub const REPO_STORE_DIR: &str = ".srclib-store";

/// Maps repository names to path components and back, and lists the stored
/// repositories on a filesystem.
pub trait RepoPaths: Send + Sync {
    fn repo_to_path(&self, repo: &str) -> Vec<String>;

    fn path_to_repo(&self, path: &[String]) -> String;

    /// Lists stored repo paths, sorted. Paths lexicographically at or before
    /// `after` are skipped; `max` of 0 means unlimited.
    fn list_repo_paths(
        &self,
        fs: &dyn FileSystem,
        after: &str,
        max: usize,
    ) -> Result<Vec<Vec<String>>>;
}

/// The default mapping: `<repo>/.srclib-store`.
pub struct DefaultRepoPaths;

impl RepoPaths for DefaultRepoPaths {
    fn repo_to_path(&self, repo: &str) -> Vec<String> {
        let mut comps: Vec<String> = repo
            .split('/')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        comps.push(REPO_STORE_DIR.to_string());
        comps
    }

    fn path_to_repo(&self, path: &[String]) -> String {
        let comps = match path.last() {
            Some(last) if last == REPO_STORE_DIR => &path[..path.len() - 1],
            _ => path,
        };
        comps.join("/")
    }

    fn list_repo_paths(
        &self,
        fs: &dyn FileSystem,
        after: &str,
        max: usize,
    ) -> Result<Vec<Vec<String>>> {
        let mut found = Vec::new();
        for dir in vfs::walk_dirs(fs, ".")? {
            if dir.rsplit('/').next() != Some(REPO_STORE_DIR) {
                continue;
            }
            if !after.is_empty() && dir.as_str() <= after {
                continue;
            }
            found.push(dir.split('/').map(String::from).collect());
            if max > 0 && found.len() >= max {
                break;
            }
        }
        Ok(found)
    }
}

pub struct MultiRepoConfig {
    pub store: StoreConfig,
    pub repo_paths: Arc<dyn RepoPaths>,
}

impl Default for MultiRepoConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            repo_paths: Arc::new(DefaultRepoPaths),
        }
    }
}

pub struct FsMultiRepoStore {
    fs: Arc<dyn FileSystem>,
    config: MultiRepoConfig,
}

impl FsMultiRepoStore {
    pub fn new(fs: Arc<dyn FileSystem>, config: MultiRepoConfig) -> Self {
        Self { fs, config }
    }

    fn repo_subpath(&self, repo: &str) -> String {
        let comps = self.config.repo_paths.repo_to_path(repo);
        let parts: Vec<&str> = comps.iter().map(String::as_str).collect();
        vfs::join(&parts)
    }

    fn open_repo(&self, repo: &str) -> FsRepoStore {
        FsRepoStore::new(
            vfs::sub(Arc::clone(&self.fs), &self.repo_subpath(repo)),
            self.config.store.clone(),
        )
    }

    /// A string that sorts immediately before the scoped repo's store path:
    /// the last component's final character is decremented and a maximal
    /// character appended, so a listing of paths greater than it starts at
    /// the scoped repo.
    fn scoped_after(&self, repo: &str) -> String {
        let mut comps = self.config.repo_paths.repo_to_path(repo);
        if let Some(last) = comps.last_mut() {
            if let Some(c) = last.pop() {
                let prev = char::from_u32(c as u32 - 1).unwrap_or(c);
                last.push(prev);
                last.push(char::MAX);
            }
        }
        comps.join("/")
    }
}

impl MultiRepoStore for FsMultiRepoStore {
    fn repos(&self, filters: &[Filter]) -> Result<Vec<String>> {
        let scope = filter::repo_scope(filters);
        let (after, max) = match &scope {
            Some(repos) => {
                let distinct: BTreeSet<&String> = repos.iter().collect();
                match distinct.len() {
                    0 => return Ok(Vec::new()),
                    1 => (self.scoped_after(repos[0].as_str()), 1),
                    // Multiple repo equalities are mutually exclusive.
                    _ => return Ok(Vec::new()),
                }
            }
            None => (String::new(), 0),
        };

        let paths = self
            .config
            .repo_paths
            .list_repo_paths(self.fs.as_ref(), &after, max)?;
        let mut repos = Vec::new();
        for path in paths {
            let repo = self.config.repo_paths.path_to_repo(&path);
            if filter::select_repo(filters, &repo) {
                repos.push(repo);
            }
        }
        Ok(repos)
    }

    fn units(&self, filters: &[Filter]) -> Result<Vec<SourceUnit>> {
        let mut units = Vec::new();
        for repo in self.repos(filters)? {
            units.extend(self.open_repo(&repo).units(filters)?);
        }
        Ok(units)
    }

    fn defs(&self, filters: &[Filter]) -> Result<Vec<Def>> {
        let mut defs = Vec::new();
        for repo in self.repos(filters)? {
            let mut repo_defs = self.open_repo(&repo).defs(filters)?;
            for def in &mut repo_defs {
                def.repo = repo.clone();
            }
            defs.append(&mut repo_defs);
        }
        Ok(defs)
    }

    fn refs(&self, filters: &[Filter]) -> Result<Vec<Ref>> {
        let mut refs = Vec::new();
        for repo in self.repos(filters)? {
            let mut repo_refs = self.open_repo(&repo).refs(filters)?;
            for r in &mut repo_refs {
                r.repo = repo.clone();
                if r.def_repo.is_empty() {
                    r.def_repo = repo.clone();
                }
            }
            refs.append(&mut repo_refs);
        }
        Ok(refs)
    }
}

impl MultiRepoImporter for FsMultiRepoStore {
    fn import(
        &self,
        repo: &str,
        commit_id: &str,
        unit: Option<&SourceUnit>,
        data: GraphOutput,
    ) -> Result<()> {
        self.fs.mkdir_all(&self.repo_subpath(repo))?;
        self.open_repo(repo).import(commit_id, unit, data)
    }

    fn build_indexes(&self, repo: &str, commit_id: &str) -> Result<()> {
        self.open_repo(repo).build_indexes(commit_id)
    }
}
