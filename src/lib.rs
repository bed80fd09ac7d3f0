pub mod codec;
pub mod config;
pub mod error;
pub mod filter;
pub mod graph;
pub mod index;
pub mod offsets;
pub mod store;
pub mod vfs;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use filter::Filter;
pub use graph::{Def, DefKey, GraphOutput, Ref, SourceUnit, UnitId, Version};
pub use store::{
    FsMultiRepoStore, FsRepoStore, FsTreeStore, IndexedTreeStore, MultiRepoConfig,
    MultiRepoImporter, MultiRepoStore, RepoImporter, RepoStore, TreeImporter, TreeStore,
};
