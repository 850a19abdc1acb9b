// tests/dag_compiler.rs

mod common;
use crate::common::builders::CatalogueBuilder;
use crate::common::init_tracing;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::error::Error;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use routeweave::dag::{compile, compile_levels, compile_with_rng, DependencyMap, ModuleGraph};
use routeweave::errors::EngineError;

type TestResult = Result<(), Box<dyn Error>>;

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn position(order: &[String], module: &str) -> usize {
    order
        .iter()
        .position(|m| m == module)
        .unwrap_or_else(|| panic!("{module} missing from {order:?}"))
}

#[test]
fn chain_compiles_in_dependency_order() -> TestResult {
    init_tracing();
    let graph = CatalogueBuilder::new()
        .module_after("transfer", &["faucet"])
        .module_after("faucet", &["profile"])
        .module("profile")
        .build();

    let order = compile(graph.catalogue(), graph.dependency_map(), true)?;
    assert_eq!(order, names(&["profile", "faucet", "transfer"]));
    Ok(())
}

#[test]
fn levels_group_independent_modules() -> TestResult {
    let graph = CatalogueBuilder::new()
        .module("a")
        .module("b")
        .module_after("c", &["a", "b"])
        .module_after("d", &["a"])
        .build();

    let levels = compile_levels(graph.catalogue(), graph.dependency_map())?;
    assert_eq!(levels, vec![names(&["a", "b"]), names(&["c", "d"])]);
    Ok(())
}

#[test]
fn without_shuffle_levels_keep_catalogue_order() -> TestResult {
    let graph = CatalogueBuilder::new()
        .module("zeta")
        .module("alpha")
        .module("mid")
        .build();

    let order = compile(graph.catalogue(), graph.dependency_map(), false)?;
    assert_eq!(order, names(&["zeta", "alpha", "mid"]));
    Ok(())
}

#[test]
fn shuffle_is_reproducible_with_a_seeded_rng() -> TestResult {
    let graph = CatalogueBuilder::new()
        .module("a")
        .module("b")
        .module("c")
        .module("d")
        .module_after("e", &["a", "b", "c", "d"])
        .build();

    let first = compile_with_rng(
        graph.catalogue(),
        graph.dependency_map(),
        true,
        &mut StdRng::seed_from_u64(7),
    )?;
    let second = compile_with_rng(
        graph.catalogue(),
        graph.dependency_map(),
        true,
        &mut StdRng::seed_from_u64(7),
    )?;
    assert_eq!(first, second);
    assert_eq!(first.last().map(String::as_str), Some("e"));
    Ok(())
}

#[test]
fn dependencies_outside_catalogue_are_ignored() -> TestResult {
    let graph = CatalogueBuilder::new()
        .module_after("bridge", &["retired_module"])
        .module("profile")
        .build();

    let order = compile(graph.catalogue(), graph.dependency_map(), false)?;
    assert_eq!(order, names(&["bridge", "profile"]));
    assert_eq!(
        graph.dangling_dependencies(),
        vec![("bridge", "retired_module")]
    );
    assert!(graph.active_dependencies_of("bridge").is_empty());
    Ok(())
}

#[test]
fn empty_catalogue_compiles_to_empty_order() -> TestResult {
    let order = compile(&[], &DependencyMap::new(), true)?;
    assert!(order.is_empty());
    Ok(())
}

#[test]
fn duplicate_catalogue_entries_are_emitted_once() -> TestResult {
    let catalogue = names(&["a", "b", "a"]);
    let order = compile(&catalogue, &DependencyMap::new(), false)?;
    assert_eq!(order, names(&["a", "b"]));
    Ok(())
}

#[test]
fn cycle_is_rejected_and_names_its_members() {
    let graph = CatalogueBuilder::new()
        .module_after("a", &["c"])
        .module_after("b", &["a"])
        .module_after("c", &["b"])
        .module_after("downstream", &["c"])
        .module("free")
        .build();

    let err = compile(graph.catalogue(), graph.dependency_map(), true).unwrap_err();
    assert_eq!(err.modules, names(&["a", "b", "c"]));

    let engine_err: EngineError = err.into();
    assert!(matches!(engine_err, EngineError::CyclicDependency(msg) if msg.contains("a, b, c")));
}

#[test]
fn self_dependency_is_a_cycle() {
    let graph = CatalogueBuilder::new().module_after("loop", &["loop"]).build();
    let err = compile_levels(graph.catalogue(), graph.dependency_map()).unwrap_err();
    assert_eq!(err.modules, names(&["loop"]));
}

#[test]
fn dependents_are_derived_from_the_dependency_map() {
    let graph = CatalogueBuilder::new()
        .module("profile")
        .module_after("faucet", &["profile"])
        .module_after("swap", &["profile"])
        .build();

    assert_eq!(graph.dependents_of("profile"), vec!["faucet", "swap"]);
    assert!(graph.dependents_of("swap").is_empty());
}

// Module i may only depend on modules 0..i, which keeps the graph acyclic.
fn acyclic_graph(max: usize) -> impl Strategy<Value = ModuleGraph> {
    (1..=max).prop_flat_map(|count| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), count)
            .prop_map(move |raw| {
                let catalogue: Vec<String> = (0..count).map(|i| format!("m{i}")).collect();
                let mut deps: DependencyMap = BTreeMap::new();
                for (i, picks) in raw.into_iter().enumerate() {
                    if i == 0 {
                        continue;
                    }
                    let list: Vec<String> = picks.iter().map(|p| format!("m{}", p % i)).collect();
                    deps.insert(format!("m{i}"), list);
                }
                // Reverse so the catalogue order is not already sorted.
                let reversed: Vec<String> = catalogue.into_iter().rev().collect();
                ModuleGraph::new(reversed, deps)
            })
    })
}

proptest! {
    #[test]
    fn compiled_order_is_a_dependency_respecting_permutation(
        graph in acyclic_graph(12),
        seed in any::<u64>(),
        shuffle in any::<bool>(),
    ) {
        let order = compile_with_rng(
            graph.catalogue(),
            graph.dependency_map(),
            shuffle,
            &mut StdRng::seed_from_u64(seed),
        ).unwrap();

        let mut sorted_order = order.clone();
        sorted_order.sort();
        let mut sorted_catalogue = graph.catalogue().to_vec();
        sorted_catalogue.sort();
        prop_assert_eq!(sorted_order, sorted_catalogue);

        let index: HashMap<&str, usize> =
            order.iter().enumerate().map(|(i, m)| (m.as_str(), i)).collect();
        for module in graph.catalogue() {
            for dep in graph.active_dependencies_of(module) {
                prop_assert!(index[dep] < index[module.as_str()]);
            }
        }
    }

    #[test]
    fn back_edge_always_makes_compilation_fail(
        graph in acyclic_graph(8),
        pick in any::<usize>(),
        seed in any::<u64>(),
    ) {
        let catalogue = graph.catalogue().to_vec();
        let mut deps = graph.dependency_map().clone();

        // Modules that transitively depend on m0, m0 included.
        let reaches_m0 = |module: &str| {
            let mut stack = vec![module.to_string()];
            let mut seen = HashSet::new();
            while let Some(m) = stack.pop() {
                if m == "m0" {
                    return true;
                }
                if seen.insert(m.clone()) {
                    stack.extend(deps.get(&m).cloned().unwrap_or_default());
                }
            }
            false
        };
        let candidates: Vec<String> =
            catalogue.iter().filter(|m| reaches_m0(m)).cloned().collect();
        let target = candidates[pick % candidates.len()].clone();

        let order = compile(&catalogue, &deps, false).unwrap();
        prop_assert!(position(&order, "m0") <= position(&order, &target));

        // m0 -> target closes a cycle through m0.
        deps.entry("m0".to_string()).or_default().push(target);
        let result = compile_with_rng(&catalogue, &deps, true, &mut StdRng::seed_from_u64(seed));
        prop_assert!(result.is_err());
        let again = compile_levels(&catalogue, &deps);
        prop_assert_eq!(result.unwrap_err(), again.unwrap_err());
    }
}
