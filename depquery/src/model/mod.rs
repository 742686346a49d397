//! Core data model (§3): the domain objects the engine reasons about, and
//! the opaque graph keys/values it translates them to and from.

pub mod graph_key;
pub mod label;
pub mod package;
pub mod rule;
pub mod target;
pub mod values;

pub use graph_key::{GraphKey, GraphKeyTag, RootedPath};
pub use label::{Label, PackageId};
pub use package::Package;
pub use rule::{AttrDep, DependencyFilter, RuleTarget, Visibility};
pub use target::{FakeSubincludeTarget, Target};
pub use values::{BlacklistPrefixesValue, FileValue, GraphValue, PackageLookupValue, TransitiveTraversalValue};
