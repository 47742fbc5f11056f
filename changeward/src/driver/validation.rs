use std::collections::{BTreeSet, HashMap, HashSet};

use super::ForbiddenParametersMap;
use crate::{
    change::ChangeCatalog,
    config::{LockSettings, MigrationConfig},
    errors::{ConfigurationError, ConfigurationIssue},
    registry::Dependencies,
    types::ChangeUnitKey,
};

/// Runs every static check and reports all issues at once.
pub fn validate(
    config: &MigrationConfig,
    settings: &LockSettings,
    catalog: &ChangeCatalog,
    available: &Dependencies,
    forbidden: &ForbiddenParametersMap,
) -> Result<(), ConfigurationError> {
    let mut issues = config.issues();
    issues.extend(settings.issues());
    issues.extend(check_forbidden_parameters(config, catalog, forbidden));
    issues.extend(check_parameters_are_wired(catalog, available, forbidden));
    issues.extend(check_dependency_graph(catalog));

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ConfigurationError::new(issues))
    }
}

fn check_forbidden_parameters(
    config: &MigrationConfig,
    catalog: &ChangeCatalog,
    forbidden: &ForbiddenParametersMap,
) -> Vec<ConfigurationIssue> {
    let mut issues = Vec::new();
    let mut used: BTreeSet<&str> = config.set_options().into_iter().collect();

    for name in &used {
        if let Some(hint) = forbidden.hint(name) {
            issues.push(ConfigurationIssue::new(
                *name,
                "forbidden_parameter",
                format!("option '{name}' is not allowed by this driver: {hint}"),
            ));
        }
    }

    for descriptor in catalog.descriptors() {
        for parameter in &descriptor.parameters {
            if let Some(hint) = forbidden.hint(parameter) {
                issues.push(ConfigurationIssue::new(
                    descriptor.key().to_string(),
                    "forbidden_parameter",
                    format!("parameter '{parameter}' is not allowed by this driver: {hint}"),
                ));
            }
            used.insert(parameter);
        }
    }

    for (left, right) in forbidden.exclusive_pairs() {
        if used.contains(left) && used.contains(right) {
            issues.push(ConfigurationIssue::new(
                left,
                "mutually_exclusive",
                format!("'{left}' and '{right}' cannot be used together with this driver"),
            ));
        }
    }
    issues
}

fn check_parameters_are_wired(
    catalog: &ChangeCatalog,
    available: &Dependencies,
    forbidden: &ForbiddenParametersMap,
) -> Vec<ConfigurationIssue> {
    let mut issues = Vec::new();
    for descriptor in catalog.descriptors() {
        for parameter in &descriptor.parameters {
            if forbidden.is_forbidden(parameter) || available.contains(parameter) {
                continue;
            }
            issues.push(ConfigurationIssue::new(
                descriptor.key().to_string(),
                "missing_dependency",
                format!("parameter '{parameter}' is not provided by the driver or the caller"),
            ));
        }
    }
    issues
}

fn check_dependency_graph(catalog: &ChangeCatalog) -> Vec<ConfigurationIssue> {
    let mut issues = Vec::new();
    let mut seen = HashSet::new();
    for descriptor in catalog.descriptors() {
        let key = descriptor.key();
        if !seen.insert(key.clone()) {
            issues.push(ConfigurationIssue::new(
                key.to_string(),
                "duplicate_change_unit",
                format!("change unit {key} is declared more than once"),
            ));
        }
    }

    let edges: HashMap<ChangeUnitKey, &[ChangeUnitKey]> = catalog
        .descriptors()
        .map(|descriptor| (descriptor.key(), descriptor.depends_on.as_slice()))
        .collect();

    for descriptor in catalog.descriptors() {
        for dependency in &descriptor.depends_on {
            if !edges.contains_key(dependency) {
                issues.push(ConfigurationIssue::new(
                    descriptor.key().to_string(),
                    "unknown_dependency",
                    format!("{} depends on {dependency}, which is not in the catalog", descriptor.key()),
                ));
            }
        }
    }

    if let Some(cycle) = find_cycle(&edges) {
        let path = cycle.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> ");
        issues.push(ConfigurationIssue::new(
            cycle[0].to_string(),
            "dependency_cycle",
            format!("change units form a dependency cycle: {path}"),
        ));
    }
    issues
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search returning the first cycle found, closed on its first node.
fn find_cycle(edges: &HashMap<ChangeUnitKey, &[ChangeUnitKey]>) -> Option<Vec<ChangeUnitKey>> {
    let mut marks: HashMap<&ChangeUnitKey, Mark> = HashMap::new();
    let mut roots: Vec<&ChangeUnitKey> = edges.keys().collect();
    roots.sort();

    for root in roots {
        if marks.contains_key(root) {
            continue;
        }
        let mut path: Vec<&ChangeUnitKey> = Vec::new();
        let mut stack: Vec<(&ChangeUnitKey, usize)> = vec![(root, 0)];
        marks.insert(root, Mark::Visiting);
        path.push(root);

        while let Some((node, next)) = stack.last_mut() {
            let children = edges.get(*node).copied().unwrap_or_default();
            let Some(child) = children.get(*next) else {
                marks.insert(*node, Mark::Done);
                stack.pop();
                path.pop();
                continue;
            };
            *next += 1;
            if !edges.contains_key(child) {
                continue;
            }
            match marks.get(child) {
                Some(Mark::Visiting) => {
                    let start = path.iter().position(|key| *key == child).unwrap_or(0);
                    let mut cycle: Vec<ChangeUnitKey> = path[start..].iter().map(|key| (*key).clone()).collect();
                    cycle.push(child.clone());
                    return Some(cycle);
                }
                Some(Mark::Done) => {}
                None => {
                    marks.insert(child, Mark::Visiting);
                    path.push(child);
                    stack.push((child, 0));
                }
            }
        }
    }
    None
}
