// src/dag/mod.rs

//! Static module graph and its compilation into a route order.
//!
//! - [`graph`] holds the module catalogue plus the module-level dependency
//!   map, with helpers that only consider in-catalogue dependencies.
//! - [`compiler`] turns a catalogue into a linear, dependency-respecting
//!   module order (Kahn levels, optionally shuffled within a level) or
//!   rejects cyclic input.

pub mod compiler;
pub mod graph;

pub use compiler::{compile, compile_levels, compile_with_rng, CyclicDependencyError};
pub use graph::{DependencyMap, ModuleGraph};
pub(crate) use graph::dedup_preserving_order;
