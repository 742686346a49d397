//! Component B — Target Materializer.
//!
//! Given a batch of traversal keys, groups by package, fetches package
//! values in one graph call, and extracts targets — tolerant of missing
//! targets, since absence is a normal outcome (cycle, universe filter),
//! not an error (§4.B).

use std::collections::HashMap;

use crate::graph::GraphAdapter;
use crate::model::{GraphKey, Label, PackageId, Target};

/// `materialize(keys) -> map<Label, Target>`. Non-`TransitiveTraversal`
/// keys are skipped; they contribute no target.
pub async fn materialize(
    graph: &GraphAdapter,
    keys: impl IntoIterator<Item = GraphKey>,
) -> HashMap<Label, Target> {
    let labels: Vec<Label> = keys
        .into_iter()
        .filter_map(|k| k.as_transitive_traversal().cloned())
        .collect();
    materialize_labels(graph, &labels).await
}

/// Same algorithm, starting directly from labels rather than traversal
/// keys (used by callers that already extracted the labels, e.g. the
/// reverse-deps path).
pub async fn materialize_labels(graph: &GraphAdapter, labels: &[Label]) -> HashMap<Label, Target> {
    let package_ids: Vec<PackageId> = {
        let mut ids: Vec<PackageId> = labels.iter().map(Label::package_id).collect();
        ids.sort();
        ids.dedup();
        ids
    };

    let packages = graph.packages(&package_ids).await;

    let mut result = HashMap::with_capacity(labels.len());
    for label in labels {
        let Some(package) = packages.get(&label.package_id()) else {
            // Package itself failed to load or is out of universe: no
            // targets from it are materializable.
            continue;
        };
        if let Some(target) = package.get(&label.target_name) {
            result.insert(label.clone(), target.clone());
        }
        // A label absent from its (successfully loaded) package is a
        // dropped `NoSuchTargetException`-equivalent: silently skipped.
    }
    result
}
