//! The component dependency graph builder.
//!
//! The target configuration declares directed edges between components:
//! input-expression references to another component's outputs, and explicit
//! `depends_on` ordering hints. Both kinds produce the same pair of
//! entries, inserted symmetrically so that membership in one component's
//! dependency set always implies membership in the other's dependent set.

use std::collections::{BTreeMap, BTreeSet};

use terrace_types::{ComponentAddr, Diagnostic, Diagnostics};

use crate::config::StackConfig;

/// A component's resolved dependency and dependent sets.
///
/// Both sets are always materialized, possibly empty; downstream consumers
/// never need a null check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentDeps {
    pub dependencies: BTreeSet<ComponentAddr>,
    pub dependents: BTreeSet<ComponentAddr>,
}

/// Build the full symmetric dependency graph for a configuration.
///
/// A reference to a component absent from the configuration is a fatal
/// configuration error, reported once per offending edge; the caller must
/// treat any error diagnostic as aborting the run.
pub fn build_dependency_graph(
    config: &StackConfig,
) -> (BTreeMap<ComponentAddr, ComponentDeps>, Diagnostics) {
    let mut graph: BTreeMap<ComponentAddr, ComponentDeps> = BTreeMap::new();
    let mut diags = Diagnostics::new();

    for (addr, _) in config.components() {
        graph.entry(addr.clone()).or_default();
    }

    for (addr, component) in config.components() {
        for target in component.edge_targets() {
            if !config.has_component(target) {
                diags.push(
                    Diagnostic::error(
                        "reference to undeclared component",
                        format!("{addr} refers to {target}, which is not declared in the configuration"),
                    )
                    .with_address(addr),
                );
                continue;
            }
            if target == addr {
                // Self-edges carry no ordering information.
                continue;
            }
            graph
                .entry(addr.clone())
                .or_default()
                .dependencies
                .insert(target.clone());
            graph
                .entry(target.clone())
                .or_default()
                .dependents
                .insert(addr.clone());
        }
    }

    (graph, diags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ComponentConfig;

    #[test]
    fn test_reference_produces_symmetric_edges() {
        let parent = ComponentAddr::root("parent");
        let child = ComponentAddr::root("child");
        let config = StackConfig::new()
            .with_component(parent.clone(), ComponentConfig::default())
            .with_component(
                child.clone(),
                ComponentConfig::default().with_reference(parent.clone()),
            );

        let (graph, diags) = build_dependency_graph(&config);
        assert!(!diags.has_errors());
        assert!(graph[&child].dependencies.contains(&parent));
        assert!(graph[&parent].dependents.contains(&child));
        assert!(graph[&parent].dependencies.is_empty());
        assert!(graph[&child].dependents.is_empty());
    }

    #[test]
    fn test_depends_on_produces_same_shape() {
        let first = ComponentAddr::root("first");
        let second = ComponentAddr::root("second");
        let config = StackConfig::new()
            .with_component(first.clone(), ComponentConfig::default())
            .with_component(
                second.clone(),
                ComponentConfig::default().with_depends_on(first.clone()),
            );

        let (graph, diags) = build_dependency_graph(&config);
        assert!(!diags.has_errors());
        assert!(graph[&second].dependencies.contains(&first));
        assert!(graph[&first].dependents.contains(&second));
    }

    #[test]
    fn test_symmetry_holds_across_the_graph() {
        let a = ComponentAddr::root("a");
        let b = ComponentAddr::root("b");
        let c = ComponentAddr::root("c");
        let config = StackConfig::new()
            .with_component(a.clone(), ComponentConfig::default().with_reference(b.clone()))
            .with_component(
                b.clone(),
                ComponentConfig::default()
                    .with_reference(c.clone())
                    .with_depends_on(c.clone()),
            )
            .with_component(c.clone(), ComponentConfig::default());

        let (graph, diags) = build_dependency_graph(&config);
        assert!(!diags.has_errors());
        for (addr, deps) in &graph {
            for dep in &deps.dependencies {
                assert!(
                    graph[dep].dependents.contains(addr),
                    "{addr} depends on {dep} but is not recorded as its dependent"
                );
            }
            for dependent in &deps.dependents {
                assert!(
                    graph[dependent].dependencies.contains(addr),
                    "{dependent} is a dependent of {addr} but does not list it"
                );
            }
        }
    }

    #[test]
    fn test_unresolved_reference_is_reported_once_per_edge() {
        let a = ComponentAddr::root("a");
        let ghost = ComponentAddr::root("ghost");
        let config = StackConfig::new().with_component(
            a.clone(),
            ComponentConfig::default()
                .with_reference(ghost.clone())
                .with_depends_on(ghost.clone()),
        );

        let (graph, diags) = build_dependency_graph(&config);
        assert!(diags.has_errors());
        assert_eq!(diags.len(), 2);
        assert!(graph[&a].dependencies.is_empty());
    }

    #[test]
    fn test_components_without_edges_get_empty_sets() {
        let lonely = ComponentAddr::root("lonely");
        let config =
            StackConfig::new().with_component(lonely.clone(), ComponentConfig::default());

        let (graph, _) = build_dependency_graph(&config);
        let deps = &graph[&lonely];
        assert!(deps.dependencies.is_empty() && deps.dependents.is_empty());
    }
}
