use std::collections::HashMap;

use crate::model::label::{Label, PackageId};
use crate::model::target::Target;

/// A collection of `Target`s declared in one BUILD file (§3).
#[derive(Debug, Clone)]
pub struct Package {
    pub id: PackageId,
    /// The BUILD file's own pseudo-target, surfaced by `rbuildfiles` and
    /// `getBuildFiles`.
    pub build_file_target: Label,
    /// Subincludes / loaded extension files that influence this package.
    pub extension_labels: Vec<Label>,
    pub contains_errors: bool,
    pub targets: HashMap<String, Target>,
}

impl Package {
    pub fn get(&self, target_name: &str) -> Option<&Target> {
        self.targets.get(target_name)
    }
}
