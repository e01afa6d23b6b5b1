//! The slice of the target configuration migration consumes.
//!
//! The configuration language and its loader live outside this core; what
//! arrives here is already resolved: per component, the names of its
//! declared input variables and output values, the set of components its
//! input expressions reference, and its explicit ordering hints.

use std::collections::{BTreeMap, BTreeSet};

use terrace_types::ComponentAddr;

/// Configuration of one component declaration.
#[derive(Debug, Clone, Default)]
pub struct ComponentConfig {
    /// Input variable names the component's module declares.
    pub input_variables: BTreeSet<String>,
    /// Output value names the component's module declares.
    pub output_values: BTreeSet<String>,
    /// Components referenced by this component's input expressions.
    pub references: BTreeSet<ComponentAddr>,
    /// Explicit ordering hints (`depends_on`).
    pub depends_on: Vec<ComponentAddr>,
}

impl ComponentConfig {
    /// A component whose module declares the given variables and outputs.
    pub fn new<I, O>(input_variables: I, output_values: O) -> Self
    where
        I: IntoIterator<Item = &'static str>,
        O: IntoIterator<Item = &'static str>,
    {
        Self {
            input_variables: input_variables.into_iter().map(String::from).collect(),
            output_values: output_values.into_iter().map(String::from).collect(),
            references: BTreeSet::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_reference(mut self, target: ComponentAddr) -> Self {
        self.references.insert(target);
        self
    }

    pub fn with_depends_on(mut self, target: ComponentAddr) -> Self {
        self.depends_on.push(target);
        self
    }

    /// Every component this one declares an edge to, from either source.
    pub fn edge_targets(&self) -> impl Iterator<Item = &ComponentAddr> {
        self.references.iter().chain(self.depends_on.iter())
    }
}

/// The target configuration's component declarations, keyed by address
/// (components of embedded stacks use stack-qualified addresses).
#[derive(Debug, Clone, Default)]
pub struct StackConfig {
    components: BTreeMap<ComponentAddr, ComponentConfig>,
}

impl StackConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_component(mut self, addr: ComponentAddr, config: ComponentConfig) -> Self {
        self.components.insert(addr, config);
        self
    }

    pub fn component(&self, addr: &ComponentAddr) -> Option<&ComponentConfig> {
        self.components.get(addr)
    }

    pub fn has_component(&self, addr: &ComponentAddr) -> bool {
        self.components.contains_key(addr)
    }

    pub fn components(&self) -> impl Iterator<Item = (&ComponentAddr, &ComponentConfig)> {
        self.components.iter()
    }
}
