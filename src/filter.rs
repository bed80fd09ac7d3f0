//! Query filters.
//!
//! A query carries a list of filters that AND together. Each store level
//! narrows its iteration with the scope hints ([`repo_scope`],
//! [`version_scope`], [`unit_scope`]) and evaluates the predicates against
//! the records it produces; the indexed stores additionally hand the filter
//! list to their indices, which report how many filters they can consume.
//!
//! Predicates ignore filter variants that do not apply to the record kind at
//! hand, and skip context fields (repo, commit, unit) that the current level
//! has not populated yet — by the time records reach the caller, every
//! context field is filled and every filter has been applied at some level.

use crate::graph::{Def, DefKey, Ref, SourceUnit, UnitId, Version};

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// Repo equality; restricts the repo walk.
    ByRepos(Vec<String>),
    /// Commit equality; restricts the version walk.
    ByCommitIds(Vec<String>),
    /// Unit equality; restricts unit iteration.
    ByUnits(Vec<UnitId>),
    /// Def path equality within a unit.
    ByDefPath(String),
    /// Full def key equality. Empty repo/commit fields are unconstrained;
    /// the unit fields are matched exactly, so a key without a unit selects
    /// nothing.
    ByDefKey(DefKey),
    /// Def-name prefix, matched case-insensitively against a def's name and
    /// path.
    ByDefQuery(String),
    /// Ref file equality.
    ByFiles(Vec<String>),
    /// Ref target equality. Empty key fields are unconstrained.
    ByRefDef(DefKey),
}

/// Matches a filter field against a record field, where an empty filter
/// field means "unconstrained" and an empty record field means "not yet
/// filled in from context".
fn field_matches(want: &str, got: &str) -> bool {
    want.is_empty() || got.is_empty() || want == got
}

impl Filter {
    pub fn select_repo(&self, repo: &str) -> bool {
        match self {
            Filter::ByRepos(repos) => repos.iter().any(|r| r == repo),
            _ => true,
        }
    }

    pub fn select_version(&self, version: &Version) -> bool {
        match self {
            Filter::ByCommitIds(ids) => ids.iter().any(|c| *c == version.commit_id),
            _ => true,
        }
    }

    pub fn select_unit(&self, unit: &SourceUnit) -> bool {
        match self {
            Filter::ByUnits(units) => units
                .iter()
                .any(|u| u.unit_type == unit.unit_type && u.name == unit.name),
            Filter::ByDefKey(key) => key.unit_type == unit.unit_type && key.unit == unit.name,
            _ => true,
        }
    }

    pub fn select_def(&self, def: &Def) -> bool {
        match self {
            Filter::ByRepos(repos) => {
                def.repo.is_empty() || repos.iter().any(|r| *r == def.repo)
            }
            Filter::ByCommitIds(ids) => {
                def.commit_id.is_empty() || ids.iter().any(|c| *c == def.commit_id)
            }
            Filter::ByUnits(units) => {
                (def.unit.is_empty() && def.unit_type.is_empty())
                    || units
                        .iter()
                        .any(|u| u.unit_type == def.unit_type && u.name == def.unit)
            }
            Filter::ByDefPath(path) => def.path == *path,
            Filter::ByDefKey(key) => {
                def.path == key.path
                    && field_matches(&key.unit_type, &def.unit_type)
                    && field_matches(&key.unit, &def.unit)
                    && field_matches(&key.repo, &def.repo)
                    && field_matches(&key.commit_id, &def.commit_id)
            }
            Filter::ByDefQuery(query) => {
                let q = query.to_lowercase();
                def.name.to_lowercase().starts_with(&q)
                    || def.path.to_lowercase().starts_with(&q)
            }
            Filter::ByFiles(_) | Filter::ByRefDef(_) => true,
        }
    }

    pub fn select_ref(&self, r: &Ref) -> bool {
        match self {
            Filter::ByRepos(repos) => r.repo.is_empty() || repos.iter().any(|s| *s == r.repo),
            Filter::ByCommitIds(ids) => {
                r.commit_id.is_empty() || ids.iter().any(|c| *c == r.commit_id)
            }
            Filter::ByUnits(units) => {
                (r.unit.is_empty() && r.unit_type.is_empty())
                    || units
                        .iter()
                        .any(|u| u.unit_type == r.unit_type && u.name == r.unit)
            }
            Filter::ByFiles(files) => files.iter().any(|f| *f == r.file),
            Filter::ByRefDef(key) => {
                r.def_path == key.path
                    && field_matches(&key.repo, &r.def_repo)
                    && field_matches(&key.unit_type, &r.def_unit_type)
                    && field_matches(&key.unit, &r.def_unit)
            }
            Filter::ByDefPath(_) | Filter::ByDefKey(_) | Filter::ByDefQuery(_) => true,
        }
    }
}

pub fn select_repo(filters: &[Filter], repo: &str) -> bool {
    filters.iter().all(|f| f.select_repo(repo))
}

pub fn select_version(filters: &[Filter], version: &Version) -> bool {
    filters.iter().all(|f| f.select_version(version))
}

pub fn select_unit(filters: &[Filter], unit: &SourceUnit) -> bool {
    filters.iter().all(|f| f.select_unit(unit))
}

pub fn select_def(filters: &[Filter], def: &Def) -> bool {
    filters.iter().all(|f| f.select_def(def))
}

pub fn select_ref(filters: &[Filter], r: &Ref) -> bool {
    filters.iter().all(|f| f.select_ref(r))
}

/// The first def-query in the filter list, if any.
pub fn def_query(filters: &[Filter]) -> Option<&str> {
    filters.iter().find_map(|f| match f {
        Filter::ByDefQuery(q) => Some(q.as_str()),
        _ => None,
    })
}

fn intersect<T: PartialEq>(scope: Option<Vec<T>>, with: Vec<T>) -> Option<Vec<T>> {
    match scope {
        None => Some(with),
        Some(prev) => Some(prev.into_iter().filter(|v| with.contains(v)).collect()),
    }
}

/// Repos the filters restrict iteration to. `None` means unrestricted;
/// `Some(empty)` means the filters are unsatisfiable at this level.
pub fn repo_scope(filters: &[Filter]) -> Option<Vec<String>> {
    let mut scope = None;
    for f in filters {
        match f {
            Filter::ByRepos(repos) => scope = intersect(scope, repos.clone()),
            Filter::ByDefKey(key) if !key.repo.is_empty() => {
                scope = intersect(scope, vec![key.repo.clone()]);
            }
            _ => {}
        }
    }
    scope
}

/// Commit IDs the filters restrict iteration to.
pub fn version_scope(filters: &[Filter]) -> Option<Vec<String>> {
    let mut scope = None;
    for f in filters {
        match f {
            Filter::ByCommitIds(ids) => scope = intersect(scope, ids.clone()),
            Filter::ByDefKey(key) if !key.commit_id.is_empty() => {
                scope = intersect(scope, vec![key.commit_id.clone()]);
            }
            _ => {}
        }
    }
    scope
}

/// Units the filters restrict iteration to.
pub fn unit_scope(filters: &[Filter]) -> Option<Vec<UnitId>> {
    let mut scope = None;
    for f in filters {
        match f {
            Filter::ByUnits(units) => scope = intersect(scope, units.clone()),
            Filter::ByDefKey(key) => scope = intersect(scope, vec![key.unit_id()]),
            _ => {}
        }
    }
    scope
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(unit_type: &str, unit: &str, path: &str, name: &str) -> Def {
        Def {
            unit_type: unit_type.into(),
            unit: unit.into(),
            path: path.into(),
            name: name.into(),
            ..Def::default()
        }
    }

    #[test]
    fn test_def_query_matches_name_and_path_prefixes() {
        let f = Filter::ByDefQuery("fo".into());
        assert!(f.select_def(&def("t", "u", "p", "Foo")));
        assert!(f.select_def(&def("t", "u", "p", "FooBar")));
        assert!(!f.select_def(&def("t", "u", "p", "Quux")));
        // Path prefixes match too.
        assert!(f.select_def(&def("t", "u", "foo/bar", "Quux")));
    }

    #[test]
    fn test_def_key_requires_exact_unit() {
        let key = DefKey {
            unit_type: "t".into(),
            unit: "u".into(),
            path: "p".into(),
            ..DefKey::default()
        };
        let f = Filter::ByDefKey(key);
        assert!(f.select_def(&def("t", "u", "p", "n")));
        assert!(!f.select_def(&def("t2", "u2", "p", "n")));
        // Unfilled context passes; the unit scope already narrowed it.
        assert!(f.select_def(&def("", "", "p", "n")));
        assert!(!f.select_def(&def("", "", "other", "n")));
    }

    #[test]
    fn test_filters_and_together() {
        let filters = vec![
            Filter::ByDefQuery("f".into()),
            Filter::ByDefPath("p2".into()),
        ];
        assert!(!select_def(&filters, &def("t", "u", "p1", "Foo")));
        assert!(select_def(&filters, &def("t", "u", "p2", "Foo")));
        assert!(!select_def(&filters, &def("t", "u", "p2", "Quux")));
    }

    #[test]
    fn test_scope_intersection() {
        let filters = vec![
            Filter::ByUnits(vec![UnitId::new("t", "u1"), UnitId::new("t", "u2")]),
            Filter::ByUnits(vec![UnitId::new("t", "u2"), UnitId::new("t", "u3")]),
        ];
        assert_eq!(unit_scope(&filters), Some(vec![UnitId::new("t", "u2")]));
        assert_eq!(unit_scope(&[]), None);

        let filters = vec![Filter::ByRepos(vec!["a".into()])];
        assert_eq!(repo_scope(&filters), Some(vec!["a".to_string()]));
        assert_eq!(version_scope(&filters), None);
    }

    #[test]
    fn test_ref_selectors() {
        let r = Ref {
            def_path: "p".into(),
            def_unit: "u".into(),
            def_unit_type: "t".into(),
            file: "f1".into(),
            start: 1,
            end: 2,
            ..Ref::default()
        };
        assert!(Filter::ByFiles(vec!["f1".into()]).select_ref(&r));
        assert!(!Filter::ByFiles(vec!["f2".into()]).select_ref(&r));

        let target = DefKey {
            unit_type: "t".into(),
            unit: "u".into(),
            path: "p".into(),
            ..DefKey::default()
        };
        assert!(Filter::ByRefDef(target.clone()).select_ref(&r));
        let other = DefKey {
            path: "q".into(),
            ..target
        };
        assert!(!Filter::ByRefDef(other).select_ref(&r));
    }
}
