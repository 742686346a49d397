//! Core query engine for a pre-computed, lazily-materialized build-graph:
//! translates `deps`/`rdeps`/`allrdeps`/`rbuildfiles` query expressions
//! into batched, deduplicated, streaming graph traversals.
//!
//! Parsing query strings and target patterns, constructing the walkable
//! graph itself, and the outer command/RPC surface are all external
//! collaborators' concerns; this crate only hosts the evaluation core
//! (components A-H).

pub mod callback;
pub mod config;
pub mod driver;
pub mod edges;
pub mod error;
pub mod events;
pub mod expr;
pub mod graph;
pub mod materialize;
pub mod model;
pub mod pattern;
pub mod rbuildfiles;
pub mod traversal;

pub use callback::{BatchStreamingCallback, Sink};
pub use config::{QueryEngineConfig, QueryFunction, Setting};
pub use driver::{QueryEvalResult, SkyQueryEnvironment, UniverseOutcome, WalkableGraphFactory};
pub use error::QueryError;
pub use events::{Event, EventHandler, RecordingEventHandler};
pub use expr::QueryExpr;
pub use graph::{GraphAdapter, WalkableGraph};
pub use model::{
    AttrDep, BlacklistPrefixesValue, DependencyFilter, FakeSubincludeTarget, FileValue, GraphKey,
    GraphKeyTag, GraphValue, Label, Package, PackageId, PackageLookupValue, RootedPath, RuleTarget,
    Target, TransitiveTraversalValue, Visibility,
};
pub use pattern::{PatternResolverBridge, TargetPatternEvaluator, TargetPatternKey};
