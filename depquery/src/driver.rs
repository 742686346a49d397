//! Component G — Query Driver.
//!
//! `SkyQueryEnvironment`: the one-shot query lifecycle. Owns the
//! collaborators (universe factory, pattern resolver, event sink),
//! optimizes the expression, evaluates it, and streams uniquified results
//! through a **Batch Streaming Callback** to the caller's sink (§4.G).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::callback::{BatchStreamingCallback, Sink};
use crate::config::QueryEngineConfig;
use crate::error::{translate_cancellation, QueryError};
use crate::events::{Event, EventHandler};
use crate::expr::{self, QueryExpr};
use crate::graph::{GraphAdapter, WalkableGraph};
use crate::materialize::materialize_labels;
use crate::model::{DependencyFilter, GraphKey, Label, Target};
use crate::pattern::{PatternResolverBridge, TargetPatternEvaluator};
use crate::rbuildfiles;
use crate::traversal;

/// Outcome of universe initialization (§4.G step 2, §7 kinds 2-3): exactly
/// one successful root value, a cycle (an acceptable outcome), or an
/// anomaly — more than one root value, or a non-cycle failure, which is a
/// programming invariant violation the driver refuses to evaluate past.
pub enum UniverseOutcome {
    Success,
    Cycle,
    Anomaly(usize),
}

/// External collaborator that materializes the universe and hands back a
/// `WalkableGraph` scoped to it (§6). Constructing the graph itself —
/// loading packages, running the build-file parser — is out of scope for
/// this crate.
#[async_trait]
pub trait WalkableGraphFactory: Send + Sync {
    async fn prepare_and_get(
        &self,
        universe_scope: &[String],
        parser_prefix: &str,
        loading_phase_threads: usize,
        events: Arc<dyn EventHandler>,
    ) -> anyhow::Result<(Arc<dyn WalkableGraph>, UniverseOutcome)>;

    fn universe_key(&self, universe_scope: &[String], parser_prefix: &str) -> GraphKey;
}

/// `evaluate`'s return value (§4.G step 9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryEvalResult {
    pub success: bool,
    pub empty: bool,
}

type TargetSet = HashMap<Label, Target>;

fn accumulating_sink(acc: Arc<Mutex<TargetSet>>) -> Arc<dyn Sink> {
    Arc::new(move |targets: Vec<Target>| {
        let mut set = acc.lock();
        for t in targets {
            set.insert(t.label().clone(), t);
        }
        Ok(())
    })
}

/// The query environment a caller constructs once per engine instance and
/// reuses for one `evaluate` call at a time (§5 "single top-level
/// evaluation"; re-entrant calls are rejected, §7 kind "already
/// evaluating").
pub struct SkyQueryEnvironment {
    config: QueryEngineConfig,
    factory: Arc<dyn WalkableGraphFactory>,
    resolver: Arc<dyn TargetPatternEvaluator>,
    events: Arc<dyn EventHandler>,
    evaluating: AtomicBool,
}

impl SkyQueryEnvironment {
    pub fn new(
        config: QueryEngineConfig,
        factory: Arc<dyn WalkableGraphFactory>,
        resolver: Arc<dyn TargetPatternEvaluator>,
        events: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            config,
            factory,
            resolver,
            events,
            evaluating: AtomicBool::new(false),
        }
    }

    /// `getFunctions()` (§6): the base set plus any `extraFunctions`.
    pub fn functions(&self) -> Vec<&str> {
        self.config.function_names()
    }

    /// `evaluate(expr, sink) -> QueryEvalResult` (§4.G).
    pub async fn evaluate(
        &self,
        expr: QueryExpr,
        sink: Arc<dyn Sink>,
    ) -> anyhow::Result<QueryEvalResult> {
        if self.evaluating.swap(true, Ordering::SeqCst) {
            return Err(QueryError::AlreadyEvaluating.into());
        }
        let result = self.evaluate_inner(expr, sink).await;
        self.evaluating.store(false, Ordering::SeqCst);
        result
    }

    async fn evaluate_inner(
        &self,
        expr: QueryExpr,
        sink: Arc<dyn Sink>,
    ) -> anyhow::Result<QueryEvalResult> {
        self.events.reset_errors();

        let universe_span = tracing::info_span!("initialize_universe", scope = ?self.config.universe_scope);
        let (walkable, outcome) = {
            let _enter = universe_span.enter();
            self.factory
                .prepare_and_get(
                    &self.config.universe_scope,
                    &self.config.parser_prefix,
                    self.config.loading_phase_threads,
                    self.events.clone(),
                )
                .await
                .map_err(translate_cancellation)?
        };
        match outcome {
            UniverseOutcome::Success => {}
            UniverseOutcome::Cycle => {
                tracing::warn!("cycle detected while initializing universe");
                self.events
                    .handle(Event::Warning("cycle detected while initializing universe".to_owned()));
            }
            UniverseOutcome::Anomaly(root_count) => {
                return Err(QueryError::UniverseAnomaly(root_count).into());
            }
        }

        let graph = GraphAdapter::new(walkable);
        let bridge = PatternResolverBridge::new(
            graph.clone(),
            self.resolver.clone(),
            self.config.parser_prefix.clone(),
            self.events.clone(),
            self.config.loading_phase_threads,
        );

        let optimized = expr::optimize(expr, &self.config.universe_scope, &self.config.parser_prefix);
        let callback = BatchStreamingCallback::new(sink, 10_000);

        // All dependency edges traversed on behalf of the top-level
        // expression honor the same filter; narrowing it further per
        // `settings` is left to a caller-supplied `extra_functions` hook
        // (§6 `settings` is reserved, not yet load-bearing — see
        // DESIGN.md).
        let filter = DependencyFilter::AllDeps;

        let eval_span = tracing::info_span!("evaluate_expression");
        let result_set = {
            let _enter = eval_span.enter();
            self.eval_expr(&graph, &bridge, filter, &optimized).await?
        };
        tracing::debug!(targets = result_set.len(), "expression evaluated");
        callback.process(result_set.into_values())?;
        callback.flush()?;

        let has_errors = self.events.has_errors();
        if has_errors {
            if !self.config.keep_going {
                return Err(QueryError::EvaluationFailed {
                    expr: format!("{optimized:?}"),
                }
                .into());
            }
            self.events.handle(Event::Warning(
                "results may be inaccurate: errors were recorded during evaluation".to_owned(),
            ));
        }

        Ok(QueryEvalResult {
            success: !has_errors,
            empty: callback.emitted_count() == 0,
        })
    }

    /// `getTarget(label)` (§6): fetches a single `Target`, distinguishing
    /// not-found from package-contains-errors (§7 kinds 4-5).
    pub async fn get_target(&self, graph: &GraphAdapter, label: &Label) -> Result<Target, QueryError> {
        let packages = graph.packages(std::slice::from_ref(&label.package_id())).await;
        let Some(package) = packages.get(&label.package_id()) else {
            return Err(QueryError::TargetNotFound(label.to_string()));
        };
        if package.contains_errors {
            return Err(QueryError::PackageContainsErrors(label.to_string()));
        }
        package
            .get(&label.target_name)
            .cloned()
            .ok_or_else(|| QueryError::TargetNotFound(label.to_string()))
    }

    /// `getBuildFiles(caller, nodes, ...)` (§6): the BUILD file and loaded
    /// extension-file targets of every package the given nodes live in,
    /// deduped by Label. Extension files surface as `FakeSubinclude`
    /// targets so they flow through the same `Target` callback interface
    /// as everything else (§9 polymorphism note).
    pub async fn get_build_files(&self, graph: &GraphAdapter, nodes: &[Target]) -> Vec<Target> {
        let mut package_ids: Vec<_> = nodes.iter().map(|t| t.label().package_id()).collect();
        package_ids.sort();
        package_ids.dedup();

        let packages = graph.packages(&package_ids).await;
        let mut seen: HashSet<Label> = HashSet::new();
        let mut result = Vec::new();
        for id in &package_ids {
            let Some(package) = packages.get(id) else {
                continue;
            };
            if seen.insert(package.build_file_target.clone()) {
                result.push(Target::SourceFile(package.build_file_target.clone()));
            }
            for ext in &package.extension_labels {
                if seen.insert(ext.clone()) {
                    result.push(Target::FakeSubinclude(crate::model::FakeSubincludeTarget {
                        label: ext.clone(),
                    }));
                }
            }
        }
        result
    }

    /// `buildTransitiveClosure(caller, set, maxDepth)` (§6): an error
    /// probe over an already-loaded set, not a traversal. `maxDepth` is
    /// accepted for interface parity with the spec's signature but
    /// unused — the probe inspects exactly the given `targets`, it
    /// doesn't walk further itself.
    pub async fn build_transitive_closure(
        &self,
        graph: &GraphAdapter,
        targets: &[Target],
        _max_depth: Option<u32>,
    ) {
        traversal::build_transitive_closure(graph, self.events.as_ref(), targets).await
    }

    /// `getNodesOnPath(from, to)` (§6, §4.D): the labels along one
    /// forward-filtered path from `from` to `to`, or `None` if `to` is
    /// unreachable.
    pub async fn get_nodes_on_path(
        &self,
        graph: &GraphAdapter,
        from: Target,
        to: Target,
        filter: DependencyFilter,
    ) -> Option<Vec<Target>> {
        traversal::nodes_on_path(graph, self.events.as_ref(), from, to, filter).await
    }

    async fn eval_expr(
        &self,
        graph: &GraphAdapter,
        bridge: &PatternResolverBridge,
        filter: DependencyFilter,
        expr: &QueryExpr,
    ) -> anyhow::Result<TargetSet> {
        match expr {
            QueryExpr::Pattern(pattern) => self.eval_patterns(bridge, std::slice::from_ref(pattern)).await,
            QueryExpr::Set(labels) => Ok(resolve_explicit_labels(graph, labels).await),
            QueryExpr::Union(l, r) => {
                let mut left = Box::pin(self.eval_expr(graph, bridge, filter, l.as_ref())).await?;
                let right = Box::pin(self.eval_expr(graph, bridge, filter, r.as_ref())).await?;
                left.extend(right);
                Ok(left)
            }
            QueryExpr::Intersect(l, r) => {
                let left = Box::pin(self.eval_expr(graph, bridge, filter, l.as_ref())).await?;
                let right = Box::pin(self.eval_expr(graph, bridge, filter, r.as_ref())).await?;
                Ok(left.into_iter().filter(|(k, _)| right.contains_key(k)).collect())
            }
            QueryExpr::Except(l, r) => {
                let left = Box::pin(self.eval_expr(graph, bridge, filter, l.as_ref())).await?;
                let right = Box::pin(self.eval_expr(graph, bridge, filter, r.as_ref())).await?;
                Ok(left.into_iter().filter(|(k, _)| !right.contains_key(k)).collect())
            }
            QueryExpr::Deps { expr, depth } => {
                let seeds = Box::pin(self.eval_expr(graph, bridge, filter, expr.as_ref())).await?;
                let closure = traversal::transitive_closure(
                    graph,
                    self.events.as_ref(),
                    seeds.into_values().collect(),
                    filter,
                    *depth,
                )
                .await;
                Ok(closure.into_iter().map(|t| (t.label().clone(), t)).collect())
            }
            QueryExpr::AllRdeps { expr, depth } => {
                let seeds = Box::pin(self.eval_expr(graph, bridge, filter, expr.as_ref())).await?;
                let closure = traversal::reverse_closure(
                    graph,
                    seeds.into_values().collect(),
                    filter,
                    *depth,
                    None,
                )
                .await;
                Ok(closure.into_iter().map(|t| (t.label().clone(), t)).collect())
            }
            QueryExpr::Rdeps { universe, expr, depth } => {
                let universe_seed =
                    Box::pin(self.eval_expr(graph, bridge, filter, universe.as_ref())).await?;
                let universe_closure = traversal::transitive_closure(
                    graph,
                    self.events.as_ref(),
                    universe_seed.into_values().collect(),
                    filter,
                    None,
                )
                .await;
                let universe_members: HashSet<Label> =
                    universe_closure.iter().map(|t| t.label().clone()).collect();

                let seeds = Box::pin(self.eval_expr(graph, bridge, filter, expr.as_ref())).await?;
                let seeds: Vec<Target> = seeds
                    .into_values()
                    .filter(|t| universe_members.contains(t.label()))
                    .collect();
                let closure =
                    traversal::reverse_closure(graph, seeds, filter, *depth, Some(&universe_members))
                        .await;
                Ok(closure.into_iter().map(|t| (t.label().clone(), t)).collect())
            }
            QueryExpr::RBuildFiles(paths) => {
                let acc: Arc<Mutex<TargetSet>> = Arc::new(Mutex::new(HashMap::new()));
                let sink = accumulating_sink(acc.clone());
                rbuildfiles::get_rbuildfiles(graph, self.events.as_ref(), paths, sink.as_ref(), 10_000)
                    .await
                    .map_err(translate_cancellation)?;
                let set = Arc::try_unwrap(acc).unwrap_or_else(|a| Mutex::new(a.lock().clone())).into_inner();
                Ok(set)
            }
        }
    }

    async fn eval_patterns(
        &self,
        bridge: &PatternResolverBridge,
        patterns: &[String],
    ) -> anyhow::Result<TargetSet> {
        let acc: Arc<Mutex<TargetSet>> = Arc::new(Mutex::new(HashMap::new()));
        let sink = accumulating_sink(acc.clone());
        bridge
            .targets_matching_patterns(patterns, sink)
            .await
            .map_err(translate_cancellation)?;
        let set = Arc::try_unwrap(acc).unwrap_or_else(|a| Mutex::new(a.lock().clone())).into_inner();
        Ok(set)
    }
}

/// Labels explicitly named by a `set(...)` node are resolved directly
/// against the graph rather than through the pattern resolver, mirroring
/// `getTarget`'s single-label path but tolerant of misses (§4.B-style
/// silence rather than a hard not-found error, since `set()` is allowed to
/// name targets that don't currently exist in the universe).
async fn resolve_explicit_labels(graph: &GraphAdapter, labels: &[Label]) -> TargetSet {
    materialize_labels(graph, labels).await
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as Map;

    use async_trait::async_trait;

    use super::*;
    use crate::events::RecordingEventHandler;
    use crate::model::{GraphValue, Package, PackageId, TransitiveTraversalValue};

    struct FakeGraph {
        values: Map<GraphKey, GraphValue>,
    }

    #[async_trait]
    impl WalkableGraph for FakeGraph {
        async fn direct_deps(&self, _keys: &[GraphKey]) -> Map<GraphKey, Vec<GraphKey>> {
            Map::new()
        }
        async fn reverse_deps(&self, _keys: &[GraphKey]) -> Map<GraphKey, Vec<GraphKey>> {
            Map::new()
        }
        async fn successful_values(&self, keys: &[GraphKey]) -> Map<GraphKey, GraphValue> {
            keys.iter()
                .filter_map(|k| self.values.get(k).map(|v| (k.clone(), v.clone())))
                .collect()
        }
        async fn missing_and_exceptions(&self, keys: &[GraphKey]) -> Map<GraphKey, Option<String>> {
            keys.iter()
                .map(|k| {
                    let msg = match k {
                        GraphKey::TransitiveTraversal(l) if l.target_name == "broken" => {
                            Some("explicit failure".to_owned())
                        }
                        _ => None,
                    };
                    (k.clone(), msg)
                })
                .collect()
        }
        async fn value(&self, key: &GraphKey) -> Option<GraphValue> {
            self.values.get(key).cloned()
        }
        async fn exists(&self, key: &GraphKey) -> bool {
            self.values.contains_key(key)
        }
    }

    fn label(pkg: &str, name: &str) -> Label {
        Label::new("", pkg, name)
    }

    fn rule_target(l: Label) -> Target {
        Target::Rule(crate::model::RuleTarget {
            label: l,
            rule_kind: "some_rule".to_owned(),
            attrs: Default::default(),
            visibility: Default::default(),
            aspect_edges: Default::default(),
        })
    }

    fn graph_with_package(pkg: &str, contains_errors: bool, names: &[&str]) -> GraphAdapter {
        let id = PackageId::new("", pkg);
        let targets = names
            .iter()
            .map(|n| (n.to_string(), rule_target(label(pkg, n))))
            .collect();
        let package = Package {
            id: id.clone(),
            build_file_target: label(pkg, "BUILD"),
            extension_labels: vec![label(pkg, "ext.bzl")],
            contains_errors,
            targets,
        };
        let mut values = Map::new();
        values.insert(GraphKey::Package(id), GraphValue::Package(package));
        GraphAdapter::new(Arc::new(FakeGraph { values }))
    }

    fn env() -> SkyQueryEnvironment {
        SkyQueryEnvironment::new(
            QueryEngineConfig::new(vec!["//...".to_owned()], vec![]).unwrap(),
            Arc::new(NeverCalledFactory),
            Arc::new(NeverCalledResolver),
            Arc::new(RecordingEventHandler::new()),
        )
    }

    struct NeverCalledFactory;
    #[async_trait]
    impl WalkableGraphFactory for NeverCalledFactory {
        async fn prepare_and_get(
            &self,
            _universe_scope: &[String],
            _parser_prefix: &str,
            _loading_phase_threads: usize,
            _events: Arc<dyn EventHandler>,
        ) -> anyhow::Result<(Arc<dyn WalkableGraph>, UniverseOutcome)> {
            unreachable!("not exercised by these unit tests")
        }
        fn universe_key(&self, _universe_scope: &[String], _parser_prefix: &str) -> GraphKey {
            unreachable!("not exercised by these unit tests")
        }
    }

    struct NeverCalledResolver;
    #[async_trait]
    impl TargetPatternEvaluator for NeverCalledResolver {
        fn parse(
            &self,
            _pattern: &str,
            _parser_prefix: &str,
        ) -> anyhow::Result<crate::pattern::TargetPatternKey> {
            unreachable!("not exercised by these unit tests")
        }
        async fn eval(
            &self,
            _key: &crate::pattern::TargetPatternKey,
            _excludes: &[String],
            _callback: &dyn Sink,
        ) -> anyhow::Result<()> {
            unreachable!("not exercised by these unit tests")
        }
    }

    #[tokio::test]
    async fn get_target_not_found_when_package_is_absent() {
        let graph = graph_with_package("a", false, &["x"]);
        let env = env();
        let err = env
            .get_target(&graph, &label("missing", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::TargetNotFound(_)));
    }

    #[tokio::test]
    async fn get_target_not_found_when_target_name_is_absent_from_its_package() {
        let graph = graph_with_package("a", false, &["x"]);
        let env = env();
        let err = env.get_target(&graph, &label("a", "y")).await.unwrap_err();
        assert!(matches!(err, QueryError::TargetNotFound(_)));
    }

    #[tokio::test]
    async fn get_target_reports_package_contains_errors_before_target_name() {
        let graph = graph_with_package("a", true, &["x"]);
        let env = env();
        let err = env.get_target(&graph, &label("a", "x")).await.unwrap_err();
        assert!(matches!(err, QueryError::PackageContainsErrors(_)));
    }

    #[tokio::test]
    async fn get_target_succeeds_for_a_known_target() {
        let graph = graph_with_package("a", false, &["x"]);
        let env = env();
        let target = env.get_target(&graph, &label("a", "x")).await.unwrap();
        assert_eq!(target.label(), &label("a", "x"));
    }

    #[tokio::test]
    async fn get_build_files_dedups_build_file_across_shared_package_nodes() {
        let graph = graph_with_package("a", false, &["x", "y"]);
        let env = env();
        let nodes = vec![rule_target(label("a", "x")), rule_target(label("a", "y"))];
        let files = env.get_build_files(&graph, &nodes).await;

        let build_files: Vec<_> = files
            .iter()
            .filter(|t| matches!(t, Target::SourceFile(l) if l.target_name == "BUILD"))
            .collect();
        assert_eq!(build_files.len(), 1);
    }

    #[tokio::test]
    async fn get_build_files_emits_extension_labels_as_fake_subincludes() {
        let graph = graph_with_package("a", false, &["x"]);
        let env = env();
        let nodes = vec![rule_target(label("a", "x"))];
        let files = env.get_build_files(&graph, &nodes).await;

        let ext = files
            .iter()
            .find(|t| matches!(t, Target::FakeSubinclude(_)))
            .expect("extension label emitted as FakeSubinclude");
        assert_eq!(ext.label().target_name, "ext.bzl");
    }

    #[tokio::test]
    async fn build_transitive_closure_reports_recovered_error_as_event() {
        let id = PackageId::new("", "a");
        let mut values = Map::new();
        values.insert(
            GraphKey::TransitiveTraversal(label("a", "x")),
            GraphValue::TransitiveTraversal(TransitiveTraversalValue {
                first_error_message: Some("recovered failure".to_owned()),
            }),
        );
        let _ = id;
        let graph = GraphAdapter::new(Arc::new(FakeGraph { values }));
        let events = RecordingEventHandler::new();

        let target = rule_target(label("a", "x"));
        traversal::build_transitive_closure(&graph, &events, std::slice::from_ref(&target)).await;

        assert!(events.events().iter().any(|e| matches!(e, Event::Error(msg) if msg.contains("recovered failure"))));
    }

    #[tokio::test]
    async fn build_transitive_closure_warns_when_target_is_missing_from_graph() {
        let graph = GraphAdapter::new(Arc::new(FakeGraph { values: Map::new() }));
        let events = RecordingEventHandler::new();

        let target = rule_target(label("a", "gone"));
        traversal::build_transitive_closure(&graph, &events, std::slice::from_ref(&target)).await;

        assert!(events
            .events()
            .iter()
            .any(|e| matches!(e, Event::Warning(msg) if msg.contains("does not exist in graph"))));
    }

    #[tokio::test]
    async fn build_transitive_closure_reports_an_exception_for_a_missing_key_with_a_recorded_error() {
        let graph = GraphAdapter::new(Arc::new(FakeGraph { values: Map::new() }));
        let events = RecordingEventHandler::new();

        let target = rule_target(label("a", "broken"));
        traversal::build_transitive_closure(&graph, &events, std::slice::from_ref(&target)).await;

        assert!(events
            .events()
            .iter()
            .any(|e| matches!(e, Event::Error(msg) if msg.contains("explicit failure"))));
    }
}
