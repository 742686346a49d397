//! Component E — Pattern Resolver Bridge.
//!
//! Resolves target-pattern strings into target streams against the
//! universe, honoring a blacklist of excluded package prefixes (§4.E).
//! Target-pattern *parsing* (`//foo/...`, `//foo:bar`) is an external
//! collaborator's job (spec §1's explicit Non-goal); this component only
//! bridges that collaborator into the engine's batching/filtering world.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{OnceCell, Semaphore};

use crate::callback::Sink;
use crate::error::QueryError;
use crate::events::{Event, EventHandler};
use crate::graph::GraphAdapter;
use crate::model::GraphKey;

/// An already-parsed target pattern, with the excludes the pattern syntax
/// itself carried (e.g. `//foo/...` minus `//foo/bar/...`).
#[derive(Debug, Clone)]
pub struct TargetPatternKey {
    pub pattern: String,
    pub own_excludes: Vec<String>,
}

/// External collaborator (§6): parses pattern strings and streams
/// matching targets. Parsing and package enumeration themselves are out
/// of scope for this crate.
#[async_trait]
pub trait TargetPatternEvaluator: Send + Sync {
    fn parse(&self, pattern: &str, parser_prefix: &str) -> anyhow::Result<TargetPatternKey>;

    /// Emits matching targets directly to `callback` without
    /// intermediate accumulation.
    async fn eval(
        &self,
        key: &TargetPatternKey,
        excludes: &[String],
        callback: &dyn Sink,
    ) -> anyhow::Result<()>;
}

/// Memoized blacklist supplier (§9): the first read pulls the universe's
/// blacklisted package-path prefixes from the graph; later reads return
/// the cached, immutable set. `OnceCell` gives thread-safe
/// once-and-only-once publication without a mutex on the hot path.
#[derive(Clone)]
pub struct BlacklistSupplier {
    graph: GraphAdapter,
    cache: Arc<OnceCell<Vec<String>>>,
}

impl BlacklistSupplier {
    pub fn new(graph: GraphAdapter) -> Self {
        Self {
            graph,
            cache: Arc::new(OnceCell::new()),
        }
    }

    pub async fn get(&self) -> Vec<String> {
        self.cache
            .get_or_init(|| async {
                match self.graph.value(&GraphKey::BlacklistPrefixes).await {
                    Some(value) => value
                        .as_blacklist_prefixes()
                        .map(|b| b.prefixes.clone())
                        .unwrap_or_default(),
                    None => Vec::new(),
                }
            })
            .await
            .clone()
    }
}

/// Bounds the number of target patterns resolved concurrently to the
/// host's parallelism (or a caller-supplied thread count). Long-lived
/// across patterns within one engine instance (§5).
#[derive(Clone)]
struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    fn new(threads: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(threads.max(1))),
        }
    }
}

#[derive(Clone)]
pub struct PatternResolverBridge {
    resolver: Arc<dyn TargetPatternEvaluator>,
    parser_prefix: String,
    blacklist: BlacklistSupplier,
    events: Arc<dyn EventHandler>,
    pool: WorkerPool,
}

impl PatternResolverBridge {
    pub fn new(
        graph: GraphAdapter,
        resolver: Arc<dyn TargetPatternEvaluator>,
        parser_prefix: String,
        events: Arc<dyn EventHandler>,
        loading_phase_threads: usize,
    ) -> Self {
        Self {
            resolver,
            parser_prefix,
            blacklist: BlacklistSupplier::new(graph),
            events,
            pool: WorkerPool::new(loading_phase_threads),
        }
    }

    /// `targetsMatchingPattern(pattern, callback)` (§4.E).
    pub async fn targets_matching_pattern(
        &self,
        pattern: &str,
        callback: &dyn Sink,
    ) -> anyhow::Result<()> {
        let key = match self.resolver.parse(pattern, &self.parser_prefix) {
            Ok(key) => key,
            Err(e) => {
                // Parsing errors are routed to the event sink and do not
                // abort the overall evaluation (§4.E step 4, §7 kind 6).
                self.events.handle(Event::Error(
                    QueryError::PatternParse {
                        pattern: pattern.to_owned(),
                        message: format!("{e:#}"),
                    }
                    .to_string(),
                ));
                return Ok(());
            }
        };

        let universe_blacklist = self.blacklist.get().await;
        let mut excludes = key.own_excludes.clone();
        excludes.extend(universe_blacklist);
        excludes.sort();
        excludes.dedup();

        self.resolver.eval(&key, &excludes, callback).await
    }

    /// Resolves many patterns, offloading the parallel package
    /// enumeration to the worker pool (§5). A single pattern's parse
    /// error is reported and skipped; it does not fail the batch, but a
    /// resolver-level error (including cancellation) does.
    pub async fn targets_matching_patterns(
        &self,
        patterns: &[String],
        callback: Arc<dyn Sink>,
    ) -> anyhow::Result<()> {
        let mut set = tokio::task::JoinSet::new();
        for pattern in patterns {
            let bridge = self.clone();
            let pattern = pattern.clone();
            let callback = callback.clone();
            let semaphore = self.pool.semaphore.clone();
            set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("worker pool semaphore is never closed");
                bridge.targets_matching_pattern(&pattern, callback.as_ref()).await
            });
        }
        while let Some(joined) = set.join_next().await {
            joined.map_err(|e| anyhow::anyhow!("pattern resolution task panicked: {e}"))??;
        }
        Ok(())
    }
}
