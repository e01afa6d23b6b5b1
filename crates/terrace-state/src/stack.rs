//! The stack state model and the changes that build it.
//!
//! Stack state groups resource instance objects under component instances
//! and tracks which components depend on which. It is assembled from a
//! stream of [`AppliedChange`] values: consumers must treat that stream as
//! a set keyed by address — emission order carries no meaning beyond
//! "resource objects before the component instance that summarizes them".

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use terrace_schema::Schema;
use terrace_types::{
    AbsProviderConfig, ComponentAddr, ComponentInstanceAddr, StackResourceInstanceObject, Value,
};

use crate::object::ResourceInstanceObjectRecord;
use crate::statekeys::StateKey;

/// Per-component-instance state.
///
/// The dependency and dependent sets are kept mutually consistent by the
/// graph builder: if A lists B as a dependency, B lists A as a dependent.
/// Both sets are always present, possibly empty, so consumers never need a
/// null check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInstanceState {
    pub output_values: BTreeMap<String, Value>,
    pub input_variables: BTreeMap<String, Value>,
    pub dependencies: BTreeSet<ComponentAddr>,
    pub dependents: BTreeSet<ComponentAddr>,
}

/// A resource instance object as stored in stack state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackResourceInstanceState {
    pub record: ResourceInstanceObjectRecord,
    pub provider_config: AbsProviderConfig,
}

/// A whole run's state in the stack model.
#[derive(Debug, Clone, Default)]
pub struct StackState {
    component_instances: BTreeMap<ComponentInstanceAddr, ComponentInstanceState>,
    resource_instance_objects: BTreeMap<StackResourceInstanceObject, StackResourceInstanceState>,
    /// Keys loaded with `DiscardIfUnrecognized` handling; the next save
    /// emits explicit deletions for these so stale optional records do not
    /// accumulate forever.
    discard_unsupported_keys: BTreeSet<StateKey>,
}

impl StackState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The state for a component instance, created empty on first access.
    pub fn ensure_component_instance(
        &mut self,
        addr: ComponentInstanceAddr,
    ) -> &mut ComponentInstanceState {
        self.component_instances.entry(addr).or_default()
    }

    pub fn add_resource_instance_object(
        &mut self,
        addr: StackResourceInstanceObject,
        record: ResourceInstanceObjectRecord,
        provider_config: AbsProviderConfig,
    ) {
        self.ensure_component_instance(addr.component.clone());
        self.resource_instance_objects.insert(
            addr,
            StackResourceInstanceState {
                record,
                provider_config,
            },
        );
    }

    pub fn mark_key_for_discard(&mut self, key: StateKey) {
        self.discard_unsupported_keys.insert(key);
    }

    pub fn component_instances(
        &self,
    ) -> &BTreeMap<ComponentInstanceAddr, ComponentInstanceState> {
        &self.component_instances
    }

    pub fn resource_instance_objects(
        &self,
    ) -> &BTreeMap<StackResourceInstanceObject, StackResourceInstanceState> {
        &self.resource_instance_objects
    }

    pub fn discard_unsupported_keys(&self) -> &BTreeSet<StateKey> {
        &self.discard_unsupported_keys
    }
}

/// One applied-change event emitted by migration (and by apply, which this
/// core does not implement). Each value is handed to the caller's sink;
/// the emitter retains nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum AppliedChange {
    ResourceInstanceObject(AppliedChangeResourceInstanceObject),
    ComponentInstance(AppliedChangeComponentInstance),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedChangeResourceInstanceObject {
    pub addr: StackResourceInstanceObject,
    /// The refreshed record, or `None` to record a deletion.
    pub new_record: Option<ResourceInstanceObjectRecord>,
    pub provider_config_addr: AbsProviderConfig,
    /// The type schema the record's attributes were refreshed against.
    pub schema: Schema,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedChangeComponentInstance {
    pub component_addr: ComponentAddr,
    pub instance_addr: ComponentInstanceAddr,
    pub output_values: BTreeMap<String, Value>,
    pub input_variables: BTreeMap<String, Value>,
    pub dependencies: BTreeSet<ComponentAddr>,
    pub dependents: BTreeSet<ComponentAddr>,
}
