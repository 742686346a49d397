//! Component A — Graph Adapter.
//!
//! Translates between domain objects (`Target`, `Label`) and opaque graph
//! keys, and owns all batch lookups against the walkable graph. The
//! walkable graph itself (its construction, persistence, invalidation) is
//! an external collaborator pinned down only by the `WalkableGraph` trait
//! below (spec §1's "explicitly out of scope").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dupe::Dupe;

use crate::model::{GraphKey, GraphValue, Label, Package, PackageId};

/// Everything the core engine needs from the underlying graph. A single
/// call carries many keys and returns partial results: the adapter never
/// caches, and callers accept that values may be absent (not-in-universe,
/// failed, or cycle-broken) — see spec §4.A.
#[async_trait]
pub trait WalkableGraph: Send + Sync {
    async fn direct_deps(&self, keys: &[GraphKey]) -> HashMap<GraphKey, Vec<GraphKey>>;
    async fn reverse_deps(&self, keys: &[GraphKey]) -> HashMap<GraphKey, Vec<GraphKey>>;
    async fn successful_values(&self, keys: &[GraphKey]) -> HashMap<GraphKey, GraphValue>;
    /// Keys that are absent from the graph map to `None`; keys that failed
    /// with a recorded error map to `Some(message)`.
    async fn missing_and_exceptions(&self, keys: &[GraphKey]) -> HashMap<GraphKey, Option<String>>;
    async fn value(&self, key: &GraphKey) -> Option<GraphValue>;
    async fn exists(&self, key: &GraphKey) -> bool;
}

/// Thin typed wrapper over `WalkableGraph` used by every other component.
/// Fronts `successful_values`/`value` with a `DashMap`-backed node cache
/// scoped to this adapter's lifetime, the way `buck2_query_impls`'s
/// `dice::aquery::NodeCache` avoids re-resolving a value already fetched
/// earlier in the same evaluation (§13).
#[derive(Clone)]
pub struct GraphAdapter {
    graph: Arc<dyn WalkableGraph>,
    node_cache: Arc<DashMap<GraphKey, GraphValue>>,
}

impl GraphAdapter {
    pub fn new(graph: Arc<dyn WalkableGraph>) -> Self {
        Self {
            graph,
            node_cache: Arc::new(DashMap::new()),
        }
    }

    pub async fn direct_deps(&self, keys: &[GraphKey]) -> HashMap<GraphKey, Vec<GraphKey>> {
        self.graph.direct_deps(keys).await
    }

    pub async fn reverse_deps(&self, keys: &[GraphKey]) -> HashMap<GraphKey, Vec<GraphKey>> {
        self.graph.reverse_deps(keys).await
    }

    /// Splits `keys` into what's already cached and what needs a graph
    /// round-trip, merging both into the returned map. Values the
    /// underlying graph reports are cached for the life of this adapter;
    /// misses are never cached, since a later batch may observe the key
    /// after it loads.
    pub async fn successful_values(&self, keys: &[GraphKey]) -> HashMap<GraphKey, GraphValue> {
        let mut result = HashMap::with_capacity(keys.len());
        let mut uncached = Vec::new();
        for key in keys {
            match self.node_cache.get(key) {
                Some(value) => {
                    result.insert(key.dupe(), value.clone());
                }
                None => uncached.push(key.dupe()),
            }
        }
        if !uncached.is_empty() {
            let fetched = self.graph.successful_values(&uncached).await;
            for (key, value) in fetched {
                self.node_cache.insert(key.dupe(), value.clone());
                result.insert(key, value);
            }
        }
        result
    }

    pub async fn missing_and_exceptions(
        &self,
        keys: &[GraphKey],
    ) -> HashMap<GraphKey, Option<String>> {
        self.graph.missing_and_exceptions(keys).await
    }

    pub async fn exists(&self, key: &GraphKey) -> bool {
        self.graph.exists(key).await
    }

    pub async fn value(&self, key: &GraphKey) -> Option<GraphValue> {
        if let Some(value) = self.node_cache.get(key) {
            return Some(value.clone());
        }
        let value = self.graph.value(key).await?;
        self.node_cache.insert(key.dupe(), value.clone());
        Some(value)
    }

    /// Single-key convenience built on the batch `missing_and_exceptions`
    /// call (§4.A lists both shapes; there's no separate graph-side
    /// single-key path).
    pub async fn exception(&self, key: &GraphKey) -> Option<String> {
        self.missing_and_exceptions(std::slice::from_ref(key))
            .await
            .remove(key)
            .flatten()
    }

    /// Fetches `Package` values for a batch of package ids in one call.
    pub async fn packages(&self, ids: &[PackageId]) -> HashMap<PackageId, Package> {
        let keys: Vec<GraphKey> = ids.iter().cloned().map(GraphKey::Package).collect();
        self.successful_values(&keys)
            .await
            .into_iter()
            .filter_map(|(k, v)| match (k, v) {
                (GraphKey::Package(id), GraphValue::Package(pkg)) => Some((id, pkg)),
                _ => None,
            })
            .collect()
    }

    /// Forward deps of a batch of `TransitiveTraversal` keys, keyed back by
    /// the originating `Label`.
    pub async fn direct_deps_of_labels(
        &self,
        labels: &[Label],
    ) -> HashMap<Label, Vec<GraphKey>> {
        let keys: Vec<GraphKey> = labels
            .iter()
            .cloned()
            .map(GraphKey::TransitiveTraversal)
            .collect();
        self.direct_deps(&keys)
            .await
            .into_iter()
            .filter_map(|(k, v)| k.as_transitive_traversal().cloned().map(|l| (l, v)))
            .collect()
    }

    /// Reverse deps ("parents") of a batch of `TransitiveTraversal` keys.
    pub async fn reverse_deps_of_labels(
        &self,
        labels: &[Label],
    ) -> HashMap<Label, Vec<GraphKey>> {
        let keys: Vec<GraphKey> = labels
            .iter()
            .cloned()
            .map(GraphKey::TransitiveTraversal)
            .collect();
        self.reverse_deps(&keys)
            .await
            .into_iter()
            .filter_map(|(k, v)| k.as_transitive_traversal().cloned().map(|l| (l, v)))
            .collect()
    }
}
