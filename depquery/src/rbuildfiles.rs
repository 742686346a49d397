//! Component F — rbuildfiles Engine.
//!
//! Answers: which packages' build files transitively depend on this set of
//! file paths? The build graph is not a tree of edges between packages
//! and files — files influence packages through `PackageLookup`
//! intermediaries, and the external package is depended on by every
//! package. An unfiltered reverse-BFS would either over-collect
//! (subpackage edges) or stall at the external-package hub; the
//! tag-aware filter below encodes the right domain semantics (§4.F).

use std::collections::{HashMap, HashSet};

use crate::callback::Sink;
use crate::events::{Event, EventHandler};
use crate::graph::GraphAdapter;
use crate::model::{GraphKey, GraphKeyTag, GraphValue, PackageId, RootedPath, Target};

fn candidate_lookup_keys(original: &str, current: &str) -> Vec<PackageId> {
    if original == "WORKSPACE" && current == "WORKSPACE" {
        return vec![PackageId::external(), PackageId::main_repo_root()];
    }
    match crate::model::graph_key::parent_of(current) {
        Some(parent) => vec![PackageId::new("", parent)],
        None => vec![],
    }
}

/// Step 1: walk ancestor directories of each input path until one is a
/// package root, producing the corresponding `File` graph keys.
async fn find_file_value_keys(graph: &GraphAdapter, inputs: &[String]) -> Vec<GraphKey> {
    let mut current_to_original: HashMap<String, HashSet<String>> = HashMap::new();
    for input in inputs {
        current_to_original
            .entry(input.clone())
            .or_default()
            .insert(input.clone());
    }

    let mut result = Vec::new();

    while !current_to_original.is_empty() {
        let mut lookup_to_pairs: HashMap<PackageId, Vec<(String, String)>> = HashMap::new();
        for (current, originals) in &current_to_original {
            for original in originals {
                for pkg_id in candidate_lookup_keys(original, current) {
                    lookup_to_pairs
                        .entry(pkg_id)
                        .or_default()
                        .push((current.clone(), original.clone()));
                }
            }
        }

        let lookup_keys: Vec<GraphKey> = lookup_to_pairs
            .keys()
            .cloned()
            .map(GraphKey::PackageLookup)
            .collect();
        let fetched = graph.successful_values(&lookup_keys).await;

        let mut resolved_currents: HashSet<String> = HashSet::new();
        for (pkg_id, pairs) in &lookup_to_pairs {
            let key = GraphKey::PackageLookup(pkg_id.clone());
            let Some(GraphValue::PackageLookup(lookup)) = fetched.get(&key) else {
                continue;
            };
            if !lookup.package_exists {
                continue;
            }
            let root = lookup.root.clone().unwrap_or_default();
            for (current, original) in pairs {
                result.push(GraphKey::File(RootedPath {
                    root: root.clone(),
                    path: original.clone(),
                }));
                resolved_currents.insert(current.clone());
            }
        }

        let mut next: HashMap<String, HashSet<String>> = HashMap::new();
        for (current, originals) in &current_to_original {
            if resolved_currents.contains(current) {
                continue;
            }
            if let Some(parent) = crate::model::graph_key::parent_of(current) {
                next.entry(parent).or_default().extend(originals.iter().cloned());
            }
        }
        current_to_original = next;
    }

    result
}

async fn flush(
    graph: &GraphAdapter,
    events: &dyn EventHandler,
    pending: &mut Vec<PackageId>,
    callback: &dyn Sink,
) -> anyhow::Result<()> {
    if pending.is_empty() {
        return Ok(());
    }
    let ids = std::mem::take(pending);
    let packages = graph.packages(&ids).await;
    let mut targets = Vec::new();
    for id in &ids {
        match packages.get(id) {
            Some(pkg) if !pkg.contains_errors => {
                targets.push(Target::SourceFile(pkg.build_file_target.clone()));
            }
            Some(_) => {
                events.handle(Event::Warning(format!(
                    "package `{id}` contains errors; omitted from rbuildfiles result"
                )));
            }
            None => {
                events.handle(Event::Warning(format!(
                    "package `{id}` missing from graph during rbuildfiles flush"
                )));
            }
        }
    }
    callback.process(targets)
}

/// `getRBuildFiles(paths)`: packages-as-build-file-targets, streamed to
/// `callback` in fixed-size batches. Never emits a target whose package
/// `containsErrors` (spec invariant 4).
pub async fn get_rbuildfiles(
    graph: &GraphAdapter,
    events: &dyn EventHandler,
    paths: &[String],
    callback: &dyn Sink,
    batch_size: usize,
) -> anyhow::Result<()> {
    let file_keys = find_file_value_keys(graph, paths).await;

    let present_values = graph.successful_values(&file_keys).await;
    let mut frontier: Vec<GraphKey> = file_keys
        .into_iter()
        .filter(|k| present_values.contains_key(k))
        .collect();

    let mut result_packages: HashSet<PackageId> = HashSet::new();
    let mut pending_flush: Vec<PackageId> = Vec::new();

    while !frontier.is_empty() {
        let reverse = graph.reverse_deps(&frontier).await;
        let mut next_frontier = Vec::new();
        let mut seen_next: HashSet<GraphKey> = HashSet::new();

        for parents in reverse.values() {
            for parent in parents {
                match parent.tag() {
                    GraphKeyTag::Package => {
                        let id = parent.as_package().expect("tag matched Package");
                        if result_packages.insert(id.clone()) {
                            pending_flush.push(id.clone());
                            if pending_flush.len() >= batch_size {
                                flush(graph, events, &mut pending_flush, callback).await?;
                            }
                        }
                        // Every package depends on the external package,
                        // so it's the one Package node whose reverse-dep
                        // frontier must keep expanding (§4.F rationale).
                        if id.is_external() && seen_next.insert(parent.clone()) {
                            next_frontier.push(parent.clone());
                        }
                    }
                    GraphKeyTag::PackageLookup => {
                        // Subpackage-existence edges are irrelevant here.
                    }
                    _ => {
                        if seen_next.insert(parent.clone()) {
                            next_frontier.push(parent.clone());
                        }
                    }
                }
            }
        }

        frontier = next_frontier;
    }

    flush(graph, events, &mut pending_flush, callback).await
}
