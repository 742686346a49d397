use dupe::Dupe;

use crate::model::label::{Label, PackageId};

/// A path relative to some filesystem root, once that root has been
/// resolved by a package lookup. Before resolution, paths are plain
/// `/`-separated strings (see `rbuildfiles::candidate_lookup_keys`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootedPath {
    pub root: String,
    pub path: String,
}

/// Cheap-to-inspect tag identifying a `GraphKey`'s variant, independent of
/// its payload. `rbuildfiles`'s reverse walk (§4.F) only ever needs to
/// branch on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphKeyTag {
    TransitiveTraversal,
    Package,
    PackageLookup,
    File,
    BlacklistPrefixes,
}

/// Tagged identifier into the walkable graph (§3). Opaque to the core
/// except for its tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GraphKey {
    TransitiveTraversal(Label),
    Package(PackageId),
    PackageLookup(PackageId),
    File(RootedPath),
    BlacklistPrefixes,
}

// `GraphKey` wraps only `Label`/`PackageId`/two small `String` fields, no
// interior graph traversal, and gets passed by value across every batch
// boundary the way `Label` does, so it carries the same `Dupe` marker.
impl Dupe for GraphKey {}

impl GraphKey {
    pub fn tag(&self) -> GraphKeyTag {
        match self {
            GraphKey::TransitiveTraversal(_) => GraphKeyTag::TransitiveTraversal,
            GraphKey::Package(_) => GraphKeyTag::Package,
            GraphKey::PackageLookup(_) => GraphKeyTag::PackageLookup,
            GraphKey::File(_) => GraphKeyTag::File,
            GraphKey::BlacklistPrefixes => GraphKeyTag::BlacklistPrefixes,
        }
    }

    pub fn as_transitive_traversal(&self) -> Option<&Label> {
        match self {
            GraphKey::TransitiveTraversal(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_package(&self) -> Option<&PackageId> {
        match self {
            GraphKey::Package(p) => Some(p),
            _ => None,
        }
    }
}

/// Ancestor-directory walk helper shared by `PackageLookup` key
/// construction: splits off the final `/`-separated component.
pub fn parent_of(path: &str) -> Option<String> {
    match path.rsplit_once('/') {
        Some((parent, _)) => Some(parent.to_owned()),
        None if path.is_empty() => None,
        None => Some(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_of_strips_last_component() {
        assert_eq!(parent_of("a/b/c"), Some("a/b".to_owned()));
        assert_eq!(parent_of("a"), Some(String::new()));
        assert_eq!(parent_of(""), None);
    }
}
