//! Ordering of class infos: subtypes first, then explicit before/after hints.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use hashbrown::{HashMap, HashSet};

use crate::class_info::ClassInfo;
use crate::error::{RegistrationError, RegistrationResult};
use crate::runtime::TypeHierarchy;

/// Sort `infos` (in registration order) so that every type comes after the
/// types it must wait for. Among ready types the earliest registered wins.
pub(crate) fn sort_class_infos(infos: Vec<ClassInfo>, hierarchy: &TypeHierarchy) -> RegistrationResult<Vec<ClassInfo>> {
    // waits_for[i]: indices that must be ordered before i.
    let waits_for = wait_lists(&infos, hierarchy);

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); infos.len()];
    let mut remaining: Vec<usize> = waits_for.iter().map(HashSet::len).collect();
    for (i, deps) in waits_for.iter().enumerate() {
        for &j in deps {
            dependents[j].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..infos.len())
        .filter(|&i| remaining[i] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(infos.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &dependent in &dependents[i] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() < infos.len() {
        let placed: HashSet<usize> = order.iter().copied().collect();
        let stuck = (0..infos.len())
            .filter(|i| !placed.contains(i))
            .map(|i| {
                let mut after: Vec<&str> = waits_for[i]
                    .iter()
                    .filter(|j| !placed.contains(*j))
                    .map(|&j| infos[j].code_name())
                    .collect();
                after.sort_unstable();
                format!("{} (after: {})", infos[i].code_name(), after.join(", "))
            })
            .collect::<Vec<_>>()
            .join(", ");
        return Err(RegistrationError::CircularDependency(stuck));
    }

    let mut slots: Vec<Option<ClassInfo>> = infos.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

/// For every info, the indices of the infos it must come after.
fn wait_lists(infos: &[ClassInfo], hierarchy: &TypeHierarchy) -> Vec<HashSet<usize>> {
    let index: HashMap<&str, usize> = infos
        .iter()
        .enumerate()
        .map(|(i, info)| (info.code_name(), i))
        .collect();

    let mut waits_for: Vec<HashSet<usize>> = vec![HashSet::new(); infos.len()];
    let mut unresolved = 0;
    for (i, info) in infos.iter().enumerate() {
        for name in info.after() {
            match index.get(name.as_str()) {
                Some(&j) if j != i => {
                    waits_for[i].insert(j);
                }
                Some(_) => {}
                None => unresolved += 1,
            }
        }
        for name in info.before() {
            match index.get(name.as_str()) {
                Some(&j) if j != i => {
                    waits_for[j].insert(i);
                }
                Some(_) => {}
                None => unresolved += 1,
            }
        }
        for (j, other) in infos.iter().enumerate() {
            if i != j && hierarchy.is_assignable_from(info.runtime_type(), other.runtime_type()) {
                waits_for[i].insert(j);
            }
        }
    }
    if unresolved > 0 {
        tracing::debug!(unresolved, "ignoring before/after hints naming unknown class infos");
    }
    waits_for
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeType;

    enum Number {}

    fn codes(infos: &[ClassInfo]) -> Vec<&str> {
        infos.iter().map(ClassInfo::code_name).collect()
    }

    #[test]
    fn test_subtypes_first() {
        let mut hierarchy = TypeHierarchy::new();
        hierarchy.declare(RuntimeType::of::<i64>(), RuntimeType::of::<Number>()).unwrap();
        let infos = vec![
            ClassInfo::builder::<Number>("number").build().unwrap(),
            ClassInfo::builder::<bool>("boolean").build().unwrap(),
            ClassInfo::builder::<i64>("integer").build().unwrap(),
        ];
        let sorted = sort_class_infos(infos, &hierarchy).unwrap();
        assert_eq!(codes(&sorted), ["boolean", "integer", "number"]);
    }

    #[test]
    fn test_before_is_reverse_after() {
        let infos = vec![
            ClassInfo::builder::<i64>("integer").build().unwrap(),
            ClassInfo::builder::<String>("string").before(&["integer"]).build().unwrap(),
            ClassInfo::builder::<bool>("boolean").after(&["missing", "string"]).build().unwrap(),
        ];
        let sorted = sort_class_infos(infos, &TypeHierarchy::new()).unwrap();
        assert_eq!(codes(&sorted), ["string", "integer", "boolean"]);
    }

    #[test]
    fn test_cycle_names_participants() {
        let infos = vec![
            ClassInfo::builder::<u8>("x").after(&["y"]).build().unwrap(),
            ClassInfo::builder::<u16>("y").after(&["z"]).build().unwrap(),
            ClassInfo::builder::<u32>("z").after(&["x"]).build().unwrap(),
        ];
        let Err(RegistrationError::CircularDependency(message)) = sort_class_infos(infos, &TypeHierarchy::new()) else {
            panic!("expected a cycle");
        };
        assert_eq!(message, "x (after: y), y (after: z), z (after: x)");
    }
}
