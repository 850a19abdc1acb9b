// src/dag/graph.rs

use std::collections::{BTreeMap, HashSet};

use crate::types::ModuleName;

/// Module-level dependency map: `module -> [modules it waits for]`.
pub type DependencyMap = BTreeMap<ModuleName, Vec<ModuleName>>;

/// Static module catalogue plus its dependency map.
///
/// The catalogue is deduplicated on construction (first occurrence wins).
/// The dependency map may mention modules that are not in the catalogue;
/// those references are kept here but ignored by every `active_*` helper and
/// by the compiler.
#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    catalogue: Vec<ModuleName>,
    dependencies: DependencyMap,
}

impl ModuleGraph {
    pub fn new<I, S>(catalogue: I, dependencies: DependencyMap) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ModuleName>,
    {
        Self {
            catalogue: dedup_preserving_order(catalogue.into_iter().map(Into::into)),
            dependencies,
        }
    }

    /// Modules of the active catalogue, in catalogue order.
    pub fn catalogue(&self) -> &[ModuleName] {
        &self.catalogue
    }

    pub fn dependency_map(&self) -> &DependencyMap {
        &self.dependencies
    }

    pub fn contains(&self, module: &str) -> bool {
        self.catalogue.iter().any(|m| m == module)
    }

    pub fn len(&self) -> usize {
        self.catalogue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalogue.is_empty()
    }

    /// Declared dependencies of a module, including ones outside the catalogue.
    pub fn dependencies_of(&self, module: &str) -> &[ModuleName] {
        self.dependencies
            .get(module)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    /// Dependencies of `module` that are part of the active catalogue.
    pub fn active_dependencies_of(&self, module: &str) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.dependencies_of(module)
            .iter()
            .map(|d| d.as_str())
            .filter(|d| self.contains(d) && seen.insert(*d))
            .collect()
    }

    /// Catalogue modules that list `module` as an active dependency.
    pub fn dependents_of(&self, module: &str) -> Vec<&str> {
        self.catalogue
            .iter()
            .filter(|m| self.active_dependencies_of(m).contains(&module))
            .map(|m| m.as_str())
            .collect()
    }

    /// `(module, dependency)` pairs whose dependency is outside the catalogue.
    ///
    /// These are dropped silently by the compiler; callers may log them.
    pub fn dangling_dependencies(&self) -> Vec<(&str, &str)> {
        self.catalogue
            .iter()
            .flat_map(|m| {
                self.dependencies_of(m)
                    .iter()
                    .filter(|d| !self.contains(d))
                    .map(move |d| (m.as_str(), d.as_str()))
            })
            .collect()
    }
}

pub(crate) fn dedup_preserving_order<I>(items: I) -> Vec<ModuleName>
where
    I: IntoIterator<Item = ModuleName>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|m| seen.insert(m.clone()))
        .collect()
}
