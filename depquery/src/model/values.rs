use crate::model::package::Package;

/// The graph's per-target payload (§3): records a target's loading outcome
/// and any recovered error, without itself being a hard failure.
#[derive(Debug, Clone, Default)]
pub struct TransitiveTraversalValue {
    pub first_error_message: Option<String>,
}

/// Whether a directory contains a package and, if so, under which
/// filesystem root it lives (§3).
#[derive(Debug, Clone)]
pub struct PackageLookupValue {
    pub package_exists: bool,
    pub root: Option<String>,
}

/// Marker value for a `File` graph key: its mere presence in the graph is
/// what `rbuildfiles` step 2 keys off of.
#[derive(Debug, Clone)]
pub struct FileValue;

/// The set of blacklisted package-path prefixes, read once per universe
/// and memoized (§4.E, §9).
#[derive(Debug, Clone, Default)]
pub struct BlacklistPrefixesValue {
    pub prefixes: Vec<String>,
}

/// Everything a `GraphKey` can resolve to.
#[derive(Debug, Clone)]
pub enum GraphValue {
    TransitiveTraversal(TransitiveTraversalValue),
    Package(Package),
    PackageLookup(PackageLookupValue),
    File(FileValue),
    BlacklistPrefixes(BlacklistPrefixesValue),
}

impl GraphValue {
    pub fn as_package(&self) -> Option<&Package> {
        match self {
            GraphValue::Package(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_transitive_traversal(&self) -> Option<&TransitiveTraversalValue> {
        match self {
            GraphValue::TransitiveTraversal(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_package_lookup(&self) -> Option<&PackageLookupValue> {
        match self {
            GraphValue::PackageLookup(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_blacklist_prefixes(&self) -> Option<&BlacklistPrefixesValue> {
        match self {
            GraphValue::BlacklistPrefixes(v) => Some(v),
            _ => None,
        }
    }
}
