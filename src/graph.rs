//! Dependency ordering shared by services and pipeline stages.

use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("`{node}` depends on unknown `{dependency}`")]
    UnknownDependency { node: String, dependency: String },
    #[error("circular dependency: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },
}

/// Order `nodes` (given in registration order, each with its dependencies)
/// so every node comes after its dependencies. Kahn's algorithm; among
/// nodes that are ready at the same time, the earlier registration wins.
pub fn topological_order(nodes: &[(String, Vec<String>)]) -> Result<Vec<String>, GraphError> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, (name, _))| (name.as_str(), i))
        .collect();

    // deps[i]: indices node i waits for
    let mut deps: Vec<BTreeSet<usize>> = Vec::with_capacity(nodes.len());
    for (name, dependencies) in nodes {
        let mut set = BTreeSet::new();
        for dependency in dependencies {
            let &d = index.get(dependency.as_str()).ok_or_else(|| GraphError::UnknownDependency {
                node: name.clone(),
                dependency: dependency.clone(),
            })?;
            set.insert(d);
        }
        deps.push(set);
    }

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, set) in deps.iter().enumerate() {
        for &d in set {
            dependents[d].push(i);
        }
    }

    let mut indegree: Vec<usize> = deps.iter().map(|s| s.len()).collect();
    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in &dependents[next] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < nodes.len() {
        let done: BTreeSet<usize> = order.iter().copied().collect();
        return Err(GraphError::Cycle {
            path: find_cycle(nodes, &deps, &done),
        });
    }

    Ok(order.into_iter().map(|i| nodes[i].0.clone()).collect())
}

/// Follow unresolved dependencies from the first stuck node until one repeats.
fn find_cycle(
    nodes: &[(String, Vec<String>)],
    deps: &[BTreeSet<usize>],
    done: &BTreeSet<usize>,
) -> Vec<String> {
    let Some(mut current) = (0..nodes.len()).find(|i| !done.contains(i)) else {
        return Vec::new();
    };
    let mut path: Vec<usize> = Vec::new();

    loop {
        if let Some(pos) = path.iter().position(|&p| p == current) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|&i| nodes[i].0.clone()).collect();
            cycle.push(nodes[current].0.clone());
            return cycle;
        }
        path.push(current);
        // Every stuck node waits on at least one other stuck node
        match deps[current].iter().find(|&&d| !done.contains(&d)) {
            Some(&next) => current = next,
            None => return path.iter().map(|&i| nodes[i].0.clone()).collect(),
        }
    }
}
