use std::collections::BTreeSet;

use crate::errors::LoaderError;
use crate::record::ModuleRecord;

/// Compute a deterministic load order for the discovered records.
///
/// Iterative layered topological sort: each round places every record
/// whose hard and soft dependencies are all already placed. Within a
/// round, non-mandatory records sort before mandatory ones, then
/// lexicographically by id, which makes the output (and the generated
/// configuration layout) reproducible. A round that places nothing while
/// records remain means a cycle.
///
/// Dangling dependency references fail up front; they must never be
/// silently dropped.
pub(crate) fn resolve_order(records: Vec<ModuleRecord>) -> Result<Vec<ModuleRecord>, LoaderError> {
    let known: BTreeSet<String> = records.iter().map(|r| r.id().to_string()).collect();
    for rec in &records {
        for dep in rec.hard_deps().iter().chain(rec.soft_deps()) {
            if !known.contains(dep) {
                return Err(LoaderError::UnknownDependency {
                    module: rec.id().to_string(),
                    depends_on: dep.clone(),
                });
            }
        }
    }

    let mut placed: Vec<ModuleRecord> = Vec::with_capacity(records.len());
    let mut placed_ids: BTreeSet<String> = BTreeSet::new();
    let mut remaining = records;

    while !remaining.is_empty() {
        let (mut eligible, rest): (Vec<ModuleRecord>, Vec<ModuleRecord>) =
            remaining.into_iter().partition(|r| {
                r.hard_deps()
                    .iter()
                    .chain(r.soft_deps())
                    .all(|d| placed_ids.contains(d))
            });

        if eligible.is_empty() {
            // Self-references land here too: a record depending on itself
            // can never become eligible.
            let ids: Vec<String> = rest.iter().map(|r| r.id().to_string()).collect();
            return Err(LoaderError::DependencyCycle { ids });
        }

        eligible.sort_by(|a, b| {
            a.mandatory()
                .cmp(&b.mandatory())
                .then_with(|| a.id().cmp(b.id()))
        });

        for rec in eligible {
            placed_ids.insert(rec.id().to_string());
            placed.push(rec);
        }
        remaining = rest;
    }

    tracing::info!(
        modules = ?placed.iter().map(|r| r.id()).collect::<Vec<_>>(),
        "module dependency order resolved"
    );

    Ok(placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DesiredStatus, ModuleMetadata, ModuleRecord};

    fn rec(id: &str, hard: &[&str], soft: &[&str]) -> ModuleRecord {
        ModuleRecord::from_metadata(
            ModuleMetadata::new(id, id)
                .with_hard_deps(hard.iter().copied())
                .with_soft_deps(soft.iter().copied()),
        )
    }

    fn rec_mandatory(id: &str, hard: &[&str]) -> ModuleRecord {
        ModuleRecord::from_metadata(
            ModuleMetadata::new(id, id)
                .with_hard_deps(hard.iter().copied())
                .mandatory(),
        )
    }

    fn order_of(records: Vec<ModuleRecord>) -> Vec<String> {
        resolve_order(records)
            .unwrap()
            .iter()
            .map(|r| r.id().to_string())
            .collect()
    }

    #[test]
    fn chain_resolves_in_dependency_order() {
        let order = order_of(vec![
            rec("three", &["two"], &[]),
            rec("one", &[], &[]),
            rec("two", &["one"], &[]),
        ]);
        assert_eq!(order, vec!["one", "two", "three"]);
    }

    #[test]
    fn soft_deps_constrain_ordering() {
        let order = order_of(vec![
            rec("viewer", &[], &["storage"]),
            rec("storage", &[], &[]),
        ]);
        assert_eq!(order, vec!["storage", "viewer"]);
    }

    #[test]
    fn independent_modules_sort_lexicographically() {
        let order = order_of(vec![
            rec("zeta", &[], &[]),
            rec("alpha", &[], &[]),
            rec("mid", &[], &[]),
        ]);
        assert_eq!(order, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn non_mandatory_sort_before_mandatory_within_a_layer() {
        let order = order_of(vec![
            rec_mandatory("aaa", &[]),
            rec("zzz", &[], &[]),
            rec_mandatory("bbb", &[]),
            rec("yyy", &[], &[]),
        ]);
        assert_eq!(order, vec!["yyy", "zzz", "aaa", "bbb"]);
    }

    #[test]
    fn layering_beats_tie_break() {
        // "apple" depends on mandatory "zoo", so "zoo" still places first.
        let order = order_of(vec![rec("apple", &["zoo"], &[]), rec_mandatory("zoo", &[])]);
        assert_eq!(order, vec!["zoo", "apple"]);
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let err = resolve_order(vec![rec("selfish", &["selfish"], &[])]).unwrap_err();
        match err {
            LoaderError::DependencyCycle { ids } => assert_eq!(ids, vec!["selfish"]),
            other => panic!("expected DependencyCycle, got {other:?}"),
        }
    }

    #[test]
    fn two_cycle_detected() {
        let err = resolve_order(vec![rec("a", &["b"], &[]), rec("b", &["a"], &[])]).unwrap_err();
        match err {
            LoaderError::DependencyCycle { ids } => {
                assert!(ids.contains(&"a".to_string()));
                assert!(ids.contains(&"b".to_string()));
            }
            other => panic!("expected DependencyCycle, got {other:?}"),
        }
    }

    #[test]
    fn long_cycle_names_only_its_members() {
        let err = resolve_order(vec![
            rec("a", &["c"], &[]),
            rec("b", &["a"], &[]),
            rec("c", &["b"], &[]),
            rec("free", &[], &[]),
        ])
        .unwrap_err();
        match err {
            LoaderError::DependencyCycle { ids } => {
                assert_eq!(ids.len(), 3);
                assert!(!ids.contains(&"free".to_string()));
            }
            other => panic!("expected DependencyCycle, got {other:?}"),
        }
    }

    #[test]
    fn soft_cycle_is_still_a_cycle() {
        let err = resolve_order(vec![rec("a", &[], &["b"]), rec("b", &[], &["a"])]).unwrap_err();
        assert!(matches!(err, LoaderError::DependencyCycle { .. }));
    }

    #[test]
    fn dangling_reference_fails() {
        let err = resolve_order(vec![rec("a", &["ghost"], &[])]).unwrap_err();
        match err {
            LoaderError::UnknownDependency { module, depends_on } => {
                assert_eq!(module, "a");
                assert_eq!(depends_on, "ghost");
            }
            other => panic!("expected UnknownDependency, got {other:?}"),
        }
    }

    #[test]
    fn dangling_soft_reference_fails_too() {
        let err = resolve_order(vec![rec("a", &[], &["ghost"])]).unwrap_err();
        assert!(matches!(err, LoaderError::UnknownDependency { .. }));
    }

    #[test]
    fn dependency_ids_are_case_insensitive() {
        let order = order_of(vec![rec("Child", &["PARENT"], &[]), rec("Parent", &[], &[])]);
        assert_eq!(order, vec!["parent", "child"]);
    }

    #[test]
    fn mandatory_declared_disabled_is_forced_to_forceload() {
        let r = ModuleRecord::from_metadata(
            ModuleMetadata::new("core", "core")
                .with_default_status(DesiredStatus::Disabled)
                .mandatory(),
        );
        assert_eq!(r.desired_status(), DesiredStatus::ForceLoad);
    }
}
