use std::fmt;

use dupe::Dupe;

/// `(repository, package-path, target-name)`, totally ordered by lexical
/// comparison of the three components in turn. The uniqueness key for
/// result deduplication within one query (spec invariant 1).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label {
    /// Empty string for the main repository.
    pub repository: String,
    /// Slash-separated package path, empty string for the repo root package.
    pub package_path: String,
    pub target_name: String,
}

// `Label` is cheap to clone (three small owned strings, no interior graph
// traversal) and gets passed by value across every batch boundary, so it
// carries the `Dupe` marker the way buck2 marks its own identifiers.
impl Dupe for Label {}

impl Label {
    pub fn new(
        repository: impl Into<String>,
        package_path: impl Into<String>,
        target_name: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            package_path: package_path.into(),
            target_name: target_name.into(),
        }
    }

    /// The label of the package this target is declared in: same repo and
    /// package path, no target name.
    pub fn package_id(&self) -> PackageId {
        PackageId {
            repository: self.repository.clone(),
            package_path: self.package_path.clone(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.repository.is_empty() {
            write!(f, "@{}", self.repository)?;
        }
        write!(f, "//{}:{}", self.package_path, self.target_name)
    }
}

/// Identifies a `Package` (a BUILD file's worth of targets), independent of
/// any one target name within it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageId {
    pub repository: String,
    pub package_path: String,
}

impl Dupe for PackageId {}

impl PackageId {
    pub fn new(repository: impl Into<String>, package_path: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            package_path: package_path.into(),
        }
    }

    pub fn main_repo_root() -> Self {
        Self::new("", "")
    }

    /// The synthetic "external package" sentinel: every package implicitly
    /// depends on it (it roots `WORKSPACE`-derived values), so reverse
    /// walks treat it specially rather than stalling at the hub (§4.F).
    pub fn external() -> Self {
        Self::new("__external__", "")
    }

    pub fn is_external(&self) -> bool {
        self.repository == "__external__"
    }

    pub fn label(&self, target_name: impl Into<String>) -> Label {
        Label::new(self.repository.clone(), self.package_path.clone(), target_name)
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.repository.is_empty() {
            write!(f, "@{}", self.repository)?;
        }
        write!(f, "//{}", self.package_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_order_lexically() {
        let a = Label::new("", "a", "x");
        let b = Label::new("", "a", "y");
        let c = Label::new("", "b", "a");
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn package_id_roundtrips_through_label() {
        let pkg = PackageId::new("", "foo/bar");
        let label = pkg.label("baz");
        assert_eq!(label.package_id(), pkg);
    }
}
