//! Record types produced by source analyzers and stored by the engine.
//!
//! A repository commit is analyzed as a set of *source units*; each unit
//! yields definitions (defs) and references (refs). On disk, contextual
//! fields (repo, commit, unit) are stripped so the bytes are deterministic
//! and free of redundancy; the store layers fill them back in on read.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Display;

/// A symbol definition within a source unit. `path` is the unique key of a
/// def within its unit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Def {
    pub repo: String,
    pub commit_id: String,
    pub unit_type: String,
    pub unit: String,
    pub path: String,
    pub name: String,
    pub kind: String,
    pub file: String,
    pub def_start: u32,
    pub def_end: u32,
    pub exported: bool,
    pub local: bool,
    /// Opaque analyzer payload (typically JSON), not interpreted here.
    pub data: Option<Vec<u8>>,
}

impl Def {
    pub fn key(&self) -> DefKey {
        DefKey {
            repo: self.repo.clone(),
            commit_id: self.commit_id.clone(),
            unit_type: self.unit_type.clone(),
            unit: self.unit.clone(),
            path: self.path.clone(),
        }
    }
}

/// The full key of a def. Empty fields mean "unconstrained" when the key is
/// used as a lookup and "same as enclosing context" on disk.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DefKey {
    pub repo: String,
    pub commit_id: String,
    pub unit_type: String,
    pub unit: String,
    pub path: String,
}

impl DefKey {
    pub fn unit_id(&self) -> UnitId {
        UnitId {
            unit_type: self.unit_type.clone(),
            name: self.unit.clone(),
        }
    }
}

impl Display for DefKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}@{}:{}/{}#{}",
            self.repo, self.commit_id, self.unit, self.unit_type, self.path
        )
    }
}

/// A use-site reference to a def. The target def may live in the same unit
/// (`def_unit_type`/`def_unit` empty on disk) or in a foreign unit.
/// `(file, start, end)` is the unique key of a ref within its unit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    pub def_repo: String,
    pub def_unit_type: String,
    pub def_unit: String,
    pub def_path: String,
    pub repo: String,
    pub commit_id: String,
    pub unit_type: String,
    pub unit: String,
    pub file: String,
    pub start: u32,
    pub end: u32,
    /// True for the defining occurrence itself.
    pub def: bool,
}

/// A source unit manifest. The engine only interprets `(unit_type, name)`;
/// everything else is carried for the analyzer's benefit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceUnit {
    pub unit_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dir: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<serde_json::Value>,
}

impl SourceUnit {
    pub fn id(&self) -> UnitId {
        UnitId {
            unit_type: self.unit_type.clone(),
            name: self.name.clone(),
        }
    }
}

/// Identifies a source unit within a tree.
///
/// Ordered by `(name, unit_type)`; the tree-level def-query index numbers
/// units in this order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitId {
    pub unit_type: String,
    pub name: String,
}

impl UnitId {
    pub fn new(unit_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            unit_type: unit_type.into(),
            name: name.into(),
        }
    }
}

impl Ord for UnitId {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.name, &self.unit_type).cmp(&(&other.name, &other.unit_type))
    }
}

impl PartialOrd for UnitId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}/{}", self.name, self.unit_type)
    }
}

/// A committed version of a repository.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub commit_id: String,
}

/// The output of analyzing one source unit: the import payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphOutput {
    pub defs: Vec<Def>,
    pub refs: Vec<Ref>,
}

/// Normalizes records before they are written so the on-disk bytes are
/// deterministic and carry no fields recoverable from path context.
///
/// Defs lose repo/commit/unit fields entirely. Refs lose repo/commit/unit
/// fields and, when the target equals the enclosing repo or unit, the
/// `def_repo`/`def_unit_type`/`def_unit` fields (relative encoding). Records
/// without their per-unit key (`Def.path`, `Ref.file`) are dropped.
///
/// Idempotent: cleaning cleaned data is a no-op.
pub fn clean_for_import(data: &mut GraphOutput, repo: &str, unit_type: &str, unit: &str) {
    data.defs.retain(|def| !def.path.is_empty());
    for def in &mut data.defs {
        def.repo.clear();
        def.commit_id.clear();
        def.unit_type.clear();
        def.unit.clear();
    }

    data.refs.retain(|r| !r.file.is_empty());
    for r in &mut data.refs {
        r.repo.clear();
        r.commit_id.clear();
        r.unit_type.clear();
        r.unit.clear();
        if !repo.is_empty() && r.def_repo == repo {
            r.def_repo.clear();
        }
        if !unit_type.is_empty() && r.def_unit_type == unit_type {
            r.def_unit_type.clear();
        }
        if !unit.is_empty() && r.def_unit == unit {
            r.def_unit.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_output() -> GraphOutput {
        GraphOutput {
            defs: vec![
                Def {
                    repo: "r".into(),
                    commit_id: "c".into(),
                    unit_type: "t".into(),
                    unit: "u".into(),
                    path: "p".into(),
                    name: "n".into(),
                    ..Def::default()
                },
                // No path: dropped by cleaning.
                Def {
                    name: "orphan".into(),
                    ..Def::default()
                },
            ],
            refs: vec![
                Ref {
                    def_repo: "r".into(),
                    def_unit_type: "t".into(),
                    def_unit: "u".into(),
                    def_path: "p".into(),
                    repo: "r".into(),
                    commit_id: "c".into(),
                    unit_type: "t".into(),
                    unit: "u".into(),
                    file: "f".into(),
                    start: 1,
                    end: 2,
                    ..Ref::default()
                },
                Ref {
                    def_repo: "other/repo".into(),
                    def_unit_type: "t2".into(),
                    def_unit: "u2".into(),
                    def_path: "q".into(),
                    file: "f".into(),
                    start: 3,
                    end: 4,
                    ..Ref::default()
                },
            ],
        }
    }

    #[test]
    fn test_clean_strips_context() {
        let mut data = sample_output();
        clean_for_import(&mut data, "r", "t", "u");

        assert_eq!(data.defs.len(), 1);
        let def = &data.defs[0];
        assert!(def.repo.is_empty());
        assert!(def.commit_id.is_empty());
        assert!(def.unit_type.is_empty());
        assert!(def.unit.is_empty());
        assert_eq!(def.path, "p");
        assert_eq!(def.name, "n");

        // Intra-unit target is relative-encoded; foreign target is kept.
        assert!(data.refs[0].def_repo.is_empty());
        assert!(data.refs[0].def_unit_type.is_empty());
        assert!(data.refs[0].def_unit.is_empty());
        assert_eq!(data.refs[1].def_repo, "other/repo");
        assert_eq!(data.refs[1].def_unit_type, "t2");
        assert_eq!(data.refs[1].def_unit, "u2");
    }

    #[test]
    fn test_clean_is_idempotent() {
        let mut once = sample_output();
        clean_for_import(&mut once, "r", "t", "u");
        let mut twice = once.clone();
        clean_for_import(&mut twice, "r", "t", "u");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unit_id_order_is_name_then_type() {
        let mut units = vec![
            UnitId::new("b", "z"),
            UnitId::new("a", "z"),
            UnitId::new("z", "a"),
        ];
        units.sort();
        assert_eq!(
            units,
            vec![
                UnitId::new("z", "a"),
                UnitId::new("a", "z"),
                UnitId::new("b", "z"),
            ]
        );
    }
}
