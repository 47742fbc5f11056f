use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
};

use crate::{
    change::ChangeUnit,
    errors::{ConfigurationError, MigrationResult},
    types::ChangeUnitKey,
};

/// Orders units so every dependency comes first.
///
/// Among units whose dependencies are satisfied, the lowest `order` runs
/// first, then the earliest catalog position. Dependencies outside `units`
/// are ignored here; the executor checks them against stored entries.
pub(crate) fn execution_order<'a>(units: &[&'a ChangeUnit]) -> MigrationResult<Vec<&'a ChangeUnit>> {
    let position: HashMap<ChangeUnitKey, usize> =
        units.iter().enumerate().map(|(idx, unit)| (unit.key(), idx)).collect();

    let mut pending_dependencies = vec![0_usize; units.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); units.len()];
    for (idx, unit) in units.iter().enumerate() {
        for dependency in &unit.descriptor.depends_on {
            if let Some(&dep_idx) = position.get(dependency) {
                pending_dependencies[idx] += 1;
                dependents[dep_idx].push(idx);
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<(i64, usize)>> = units
        .iter()
        .enumerate()
        .filter(|(idx, _)| pending_dependencies[*idx] == 0)
        .map(|(idx, unit)| Reverse((unit.descriptor.order, idx)))
        .collect();

    let mut ordered = Vec::with_capacity(units.len());
    while let Some(Reverse((_, idx))) = ready.pop() {
        ordered.push(units[idx]);
        for &dependent in &dependents[idx] {
            pending_dependencies[dependent] -= 1;
            if pending_dependencies[dependent] == 0 {
                ready.push(Reverse((units[dependent].descriptor.order, dependent)));
            }
        }
    }

    if ordered.len() != units.len() {
        let stuck: Vec<String> = units
            .iter()
            .enumerate()
            .filter(|(idx, _)| pending_dependencies[*idx] > 0)
            .map(|(_, unit)| unit.key().to_string())
            .collect();
        return Err(ConfigurationError::single(
            "catalog",
            "dependency_cycle",
            format!("change units cannot be ordered: {}", stuck.join(", ")),
        )
        .into());
    }
    Ok(ordered)
}
