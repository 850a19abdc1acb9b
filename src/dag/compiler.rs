// src/dag/compiler.rs

//! Compile a module catalogue into a linear execution order.
//!
//! The order is produced level by level (Kahn): every module whose
//! in-catalogue dependencies have all been emitted forms the next level.
//! With `shuffle = true` the order *inside* each level is randomised so that
//! accounts do not all walk the catalogue in the same sequence; levels are
//! always emitted in dependency order.
//!
//! The resulting order is only a hint for operators and for `order_num`.
//! Run-time gating uses the materialised dependency edges in the store.

use std::collections::{HashMap, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, error};

use crate::dag::graph::{dedup_preserving_order, DependencyMap};
use crate::errors::EngineError;
use crate::types::ModuleName;

/// The catalogue contains a dependency cycle; no order was produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cycle between modules [{}]", .modules.join(", "))]
pub struct CyclicDependencyError {
    /// Modules that participate in a cycle (sorted).
    pub modules: Vec<ModuleName>,
}

impl From<CyclicDependencyError> for EngineError {
    fn from(err: CyclicDependencyError) -> Self {
        EngineError::CyclicDependency(err.to_string())
    }
}

/// Compile `catalogue` into levels of mutually independent modules.
///
/// Dependencies naming modules outside the catalogue are ignored.
pub fn compile_levels(
    catalogue: &[ModuleName],
    dependencies: &DependencyMap,
) -> Result<Vec<Vec<ModuleName>>, CyclicDependencyError> {
    let modules = dedup_preserving_order(catalogue.iter().cloned());

    let mut dependents: HashMap<&str, Vec<&str>> =
        modules.iter().map(|m| (m.as_str(), Vec::new())).collect();
    let mut in_degree: HashMap<&str, usize> = modules.iter().map(|m| (m.as_str(), 0)).collect();

    for module in &modules {
        let deps = dependencies.get(module).map(|d| d.as_slice()).unwrap_or(&[]);
        let deps = dedup_preserving_order(deps.iter().cloned());
        for dep in &deps {
            let Some(dep) = modules.iter().find(|m| *m == dep) else {
                continue;
            };
            if let Some(list) = dependents.get_mut(dep.as_str()) {
                list.push(module.as_str());
            }
            if let Some(degree) = in_degree.get_mut(module.as_str()) {
                *degree += 1;
            }
        }
    }

    let mut queue: VecDeque<&str> = modules
        .iter()
        .map(|m| m.as_str())
        .filter(|m| in_degree.get(m).copied() == Some(0))
        .collect();

    let mut levels: Vec<Vec<ModuleName>> = Vec::new();
    let mut emitted = 0usize;

    while !queue.is_empty() {
        let level_size = queue.len();
        let mut level = Vec::with_capacity(level_size);

        for _ in 0..level_size {
            let Some(node) = queue.pop_front() else { break };
            level.push(node.to_string());
            emitted += 1;

            for next in dependents.get(node).map(|d| d.as_slice()).unwrap_or(&[]) {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*next);
                    }
                }
            }
        }

        levels.push(level);
    }

    if emitted != modules.len() {
        let remaining: Vec<&str> = modules
            .iter()
            .map(|m| m.as_str())
            .filter(|m| in_degree.get(m).copied().unwrap_or(0) > 0)
            .collect();
        let err = CyclicDependencyError {
            modules: cycle_members(&remaining, dependencies),
        };
        error!(modules = ?err.modules, "cyclic dependency detected");
        return Err(err);
    }

    debug!(levels = levels.len(), modules = emitted, "compiled module levels");
    Ok(levels)
}

/// Compile `catalogue` into a linear order, shuffling within levels when
/// `shuffle` is true.
pub fn compile(
    catalogue: &[ModuleName],
    dependencies: &DependencyMap,
    shuffle: bool,
) -> Result<Vec<ModuleName>, CyclicDependencyError> {
    compile_with_rng(catalogue, dependencies, shuffle, &mut rand::thread_rng())
}

/// Same as [`compile`] with an explicit random source.
pub fn compile_with_rng<R: Rng + ?Sized>(
    catalogue: &[ModuleName],
    dependencies: &DependencyMap,
    shuffle: bool,
    rng: &mut R,
) -> Result<Vec<ModuleName>, CyclicDependencyError> {
    let mut levels = compile_levels(catalogue, dependencies)?;

    if shuffle {
        for level in levels.iter_mut() {
            level.shuffle(rng);
        }
    }

    Ok(levels.into_iter().flatten().collect())
}

/// Narrow the modules left over by Kahn down to the ones actually on a cycle.
///
/// Modules that merely depend on a cycle are also left over; strongly
/// connected components separate the two.
fn cycle_members(remaining: &[&str], dependencies: &DependencyMap) -> Vec<ModuleName> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for module in remaining {
        graph.add_node(*module);
    }
    for module in remaining {
        for dep in dependencies.get(*module).map(|d| d.as_slice()).unwrap_or(&[]) {
            if let Some(dep) = remaining.iter().find(|r| **r == dep.as_str()) {
                graph.add_edge(*dep, *module, ());
            }
        }
    }

    let mut members: Vec<ModuleName> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || scc.iter().any(|n| graph.contains_edge(*n, *n)))
        .flatten()
        .map(|n| n.to_string())
        .collect();

    if members.is_empty() {
        members = remaining.iter().map(|m| m.to_string()).collect();
    }
    members.sort();
    members
}
