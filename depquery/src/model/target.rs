use crate::model::label::Label;
use crate::model::rule::RuleTarget;

/// A synthetic `Target` representing an extension file (subinclude/load) as
/// if it were a target, so it can flow through the same `Callback<Target>`
/// interface the rest of the engine emits results through (§3).
#[derive(Debug, Clone)]
pub struct FakeSubincludeTarget {
    pub label: Label,
}

/// An addressable build node (§3). Only `Rule` carries allowed-dependency
/// policy; every other variant passes its raw forward/reverse edges through
/// unfiltered.
#[derive(Debug, Clone)]
pub enum Target {
    Rule(RuleTarget),
    SourceFile(Label),
    GeneratedFile(Label),
    PackageGroup(Label),
    EnvironmentGroup(Label),
    FakeSubinclude(FakeSubincludeTarget),
}

impl Target {
    pub fn label(&self) -> &Label {
        match self {
            Target::Rule(r) => &r.label,
            Target::SourceFile(l) => l,
            Target::GeneratedFile(l) => l,
            Target::PackageGroup(l) => l,
            Target::EnvironmentGroup(l) => l,
            Target::FakeSubinclude(f) => &f.label,
        }
    }

    pub fn as_rule(&self) -> Option<&RuleTarget> {
        match self {
            Target::Rule(r) => Some(r),
            _ => None,
        }
    }
}
