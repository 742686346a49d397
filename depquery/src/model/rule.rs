use smallvec::SmallVec;

use crate::model::label::Label;

/// Closed enum of attribute-edge filtering policies a caller may request.
/// The engine is opaque to *why* a filter excludes an edge; it only ever
/// asks a `RuleTarget` to apply one (§4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyFilter {
    AllDeps,
    NoHostDeps,
    NoImplicitDeps,
}

/// One attribute-declared forward edge out of a rule, with enough metadata
/// for a `DependencyFilter` to decide whether it survives.
#[derive(Debug, Clone)]
pub struct AttrDep {
    pub label: Label,
    pub is_host: bool,
    pub is_implicit: bool,
}

impl AttrDep {
    fn survives(&self, filter: DependencyFilter) -> bool {
        match filter {
            DependencyFilter::AllDeps => true,
            DependencyFilter::NoHostDeps => !self.is_host,
            DependencyFilter::NoImplicitDeps => !self.is_implicit,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Visibility {
    /// Labels (typically `package_group`s) this rule's visibility
    /// declaration names as allowed dependents/dependencies. A handful of
    /// entries at most in practice, so inlined rather than heap-allocated
    /// the way buck2's own small attribute collections are.
    pub dependency_labels: SmallVec<[Label; 4]>,
}

/// The only `Target` variant that carries allowed-dependency policy
/// (spec invariant: "Only Rules carry allowed-dependency policy").
#[derive(Debug, Clone)]
pub struct RuleTarget {
    pub label: Label,
    pub rule_kind: String,
    pub attrs: SmallVec<[AttrDep; 8]>,
    pub visibility: Visibility,
    pub aspect_edges: SmallVec<[AttrDep; 8]>,
}

impl RuleTarget {
    /// `rule.transitions(dependencyFilter)`: the attribute edges that
    /// survive the given filter.
    pub fn transitions(&self, filter: DependencyFilter) -> impl Iterator<Item = &Label> {
        self.attrs
            .iter()
            .filter(move |d| d.survives(filter))
            .map(|d| &d.label)
    }

    /// `rule.aspectLabelsSuperset(dependencyFilter)`.
    pub fn aspect_labels_superset(&self, filter: DependencyFilter) -> impl Iterator<Item = &Label> {
        self.aspect_edges
            .iter()
            .filter(move |d| d.survives(filter))
            .map(|d| &d.label)
    }
}
