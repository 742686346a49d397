//! Component D — Traversal Engine.
//!
//! Forward/reverse-dep computation, transitive closure, and path-style
//! node enumeration on the filtered graph (§4.D).

use std::collections::{HashMap, HashSet};

use crate::edges::allowed_labels;
use crate::events::{Event, EventHandler};
use crate::graph::GraphAdapter;
use crate::materialize::materialize;
use crate::model::{DependencyFilter, GraphKey, Label, Target};

/// `getFwdDeps(targets)`.
pub async fn fwd_deps(
    graph: &GraphAdapter,
    events: &dyn EventHandler,
    targets: &[Target],
    filter: DependencyFilter,
) -> Vec<Target> {
    let labels: Vec<Label> = targets.iter().map(|t| t.label().clone()).collect();
    let raw = graph.direct_deps_of_labels(&labels).await;

    for label in &labels {
        if !raw.contains_key(label) {
            events.handle(Event::Warning(format!(
                "target `{label}` has no entry in the raw-deps batch (cycle or out-of-universe)"
            )));
        }
    }

    let all_dep_keys: Vec<GraphKey> = raw.values().flat_map(|deps| deps.iter().cloned()).collect();
    let materialized = materialize(graph, all_dep_keys).await;

    let mut seen: HashSet<Label> = HashSet::new();
    let mut result = Vec::new();
    for target in targets {
        let Some(raw_deps) = raw.get(target.label()) else {
            continue;
        };
        let allowed: Option<HashSet<Label>> = target.as_rule().map(|r| allowed_labels(r, filter));
        for dep_key in raw_deps {
            let Some(dep_label) = dep_key.as_transitive_traversal() else {
                continue;
            };
            if let Some(allowed) = &allowed {
                if !allowed.contains(dep_label) {
                    continue;
                }
            }
            if let Some(dep_target) = materialized.get(dep_label) {
                if seen.insert(dep_label.clone()) {
                    result.push(dep_target.clone());
                }
            }
        }
    }
    result
}

/// `getReverseDeps(targets)`. Filters false positives arising because the
/// raw reverse edges are unfiltered (§4.D).
pub async fn reverse_deps(
    graph: &GraphAdapter,
    targets: &[Target],
    filter: DependencyFilter,
) -> Vec<Target> {
    let labels: Vec<Label> = targets.iter().map(|t| t.label().clone()).collect();
    let original_labels: HashSet<Label> = labels.iter().cloned().collect();
    let raw = graph.reverse_deps_of_labels(&labels).await;

    let all_parent_keys: Vec<GraphKey> =
        raw.values().flat_map(|parents| parents.iter().cloned()).collect();
    let materialized = materialize(graph, all_parent_keys).await;

    let mut visited: HashSet<Label> = HashSet::new();
    let mut result = Vec::new();
    for parents in raw.values() {
        for parent_key in parents {
            let Some(parent_label) = parent_key.as_transitive_traversal() else {
                continue;
            };
            if !visited.insert(parent_label.clone()) {
                continue;
            }
            let Some(parent_target) = materialized.get(parent_label) else {
                continue;
            };
            let include = match parent_target.as_rule() {
                Some(rule) if filter != DependencyFilter::AllDeps => {
                    let allowed = allowed_labels(rule, filter);
                    allowed.intersection(&original_labels).next().is_some()
                }
                _ => true,
            };
            if include {
                result.push(parent_target.clone());
            }
        }
    }
    result
}

/// `getTransitiveClosure(set)`. Layered BFS to a fixed point (or to
/// `max_depth` layers, when `deps(expr, depth)` bounds it); ordering among
/// siblings is unspecified.
pub async fn transitive_closure(
    graph: &GraphAdapter,
    events: &dyn EventHandler,
    seeds: Vec<Target>,
    filter: DependencyFilter,
    max_depth: Option<u32>,
) -> Vec<Target> {
    let mut visited: HashSet<Label> = HashSet::new();
    let mut visited_targets: HashMap<Label, Target> = HashMap::new();
    let mut frontier = seeds;
    let mut layer = 0u32;

    loop {
        let pruned: Vec<Target> = frontier
            .into_iter()
            .filter(|t| !visited.contains(t.label()))
            .collect();
        if pruned.is_empty() {
            break;
        }
        for t in &pruned {
            visited.insert(t.label().clone());
            visited_targets.insert(t.label().clone(), t.clone());
        }
        if let Some(max) = max_depth {
            if layer >= max {
                break;
            }
        }
        frontier = fwd_deps(graph, events, &pruned, filter).await;
        layer += 1;
    }

    visited_targets.into_values().collect()
}

/// The reverse-direction counterpart used by `rdeps`/`allrdeps`: layered
/// reverse BFS from `seeds`, optionally bounded to `max_depth` layers and
/// optionally restricted to stay within `universe` (rdeps' bounding
/// argument — `allrdeps` passes `None` and walks the whole loaded graph).
pub async fn reverse_closure(
    graph: &GraphAdapter,
    seeds: Vec<Target>,
    filter: DependencyFilter,
    max_depth: Option<u32>,
    universe: Option<&HashSet<Label>>,
) -> Vec<Target> {
    let mut visited: HashSet<Label> = HashSet::new();
    let mut visited_targets: HashMap<Label, Target> = HashMap::new();
    let mut frontier = seeds;
    let mut layer = 0u32;

    loop {
        let pruned: Vec<Target> = frontier
            .into_iter()
            .filter(|t| !visited.contains(t.label()))
            .collect();
        if pruned.is_empty() {
            break;
        }
        for t in &pruned {
            visited.insert(t.label().clone());
            visited_targets.insert(t.label().clone(), t.clone());
        }
        if let Some(max) = max_depth {
            if layer >= max {
                break;
            }
        }
        let next = reverse_deps(graph, &pruned, filter).await;
        frontier = match universe {
            Some(members) => next.into_iter().filter(|t| members.contains(t.label())).collect(),
            None => next,
        };
        layer += 1;
    }

    visited_targets.into_values().collect()
}

/// `getNodesOnPath(from, to)`.
///
/// Predecessor-map search over forward-filtered edges using a LIFO stack
/// (DFS-ish, recording parents greedily on first discovery). Reconstructs
/// the ancestor chain `to -> ... -> from` on success. `from == to` yields
/// `{from}`.
///
/// Open question resolved (see DESIGN.md): unlike spec's source comment
/// calling the not-found case "not clear", this implementation returns
/// `None` when `to` is unreachable from `from`, rather than an empty set —
/// an empty set is ambiguous with "no path exists starting at `from`
/// itself", whereas `None` unambiguously means "no path".
pub async fn nodes_on_path(
    graph: &GraphAdapter,
    events: &dyn EventHandler,
    from: Target,
    to: Target,
    filter: DependencyFilter,
) -> Option<Vec<Target>> {
    if from.label() == to.label() {
        return Some(vec![from]);
    }

    let to_label = to.label().clone();
    let mut predecessor: HashMap<Label, Label> = HashMap::new();
    let mut discovered: HashMap<Label, Target> = HashMap::new();
    discovered.insert(from.label().clone(), from.clone());
    let mut stack: Vec<Target> = vec![from];

    while let Some(current) = stack.pop() {
        let deps = fwd_deps(graph, events, std::slice::from_ref(&current), filter).await;
        for dep in deps {
            let dep_label = dep.label().clone();
            if discovered.contains_key(&dep_label) {
                continue;
            }
            predecessor.insert(dep_label.clone(), current.label().clone());
            discovered.insert(dep_label.clone(), dep.clone());

            if dep_label == to_label {
                let mut chain = vec![dep_label.clone()];
                let mut cur = dep_label;
                while let Some(p) = predecessor.get(&cur) {
                    chain.push(p.clone());
                    cur = p.clone();
                }
                return Some(
                    chain
                        .into_iter()
                        .map(|l| discovered.get(&l).unwrap().clone())
                        .collect(),
                );
            }
            stack.push(dep);
        }
    }
    None
}

fn graph_key_label(key: &GraphKey) -> String {
    key.as_transitive_traversal()
        .map(|l| l.to_string())
        .unwrap_or_else(|| "<non-target key>".to_owned())
}

/// `buildTransitiveClosure(caller, set, maxDepth)` — an error probe only;
/// the graph is already fully loaded. Scans graph values of the targets'
/// traversal keys and reports recovered/unrecovered loading errors and
/// missing-from-graph targets onto the event sink (§4.D, §7).
pub async fn build_transitive_closure(
    graph: &GraphAdapter,
    events: &dyn EventHandler,
    targets: &[Target],
) {
    let keys: Vec<GraphKey> = targets
        .iter()
        .map(|t| GraphKey::TransitiveTraversal(t.label().clone()))
        .collect();

    let successful = graph.successful_values(&keys).await;
    let mut missing_keys = Vec::new();
    for key in &keys {
        match successful.get(key) {
            Some(value) => {
                if let Some(ttv) = value.as_transitive_traversal() {
                    if let Some(msg) = &ttv.first_error_message {
                        events.handle(Event::Error(format!(
                            "{}: {msg}",
                            graph_key_label(key)
                        )));
                    }
                }
            }
            None => missing_keys.push(key.clone()),
        }
    }

    if missing_keys.is_empty() {
        return;
    }
    let exceptions = graph.missing_and_exceptions(&missing_keys).await;
    for key in &missing_keys {
        match exceptions.get(key) {
            Some(Some(msg)) => {
                events.handle(Event::Error(format!("{}: {msg}", graph_key_label(key))));
            }
            _ => {
                events.handle(Event::Warning(format!(
                    "{} does not exist in graph",
                    graph_key_label(key)
                )));
            }
        }
    }
}
