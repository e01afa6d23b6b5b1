//! The legacy flat state model.
//!
//! Everything is addressed by module instance path and resource instance;
//! there are no components. Migration reads this model and never writes it
//! back, so the API here is a plain data store with the builder-style
//! setters tests and callers populate it with.

use std::collections::BTreeMap;

use terrace_types::{
    AbsProviderConfig, AbsResourceInstance, DeposedKey, InstanceKey, ModuleInstanceAddr, Resource,
    ResourceInstance,
};

use crate::object::ResourceInstanceObjectRecord;

/// The current and deposed objects stored at one resource instance address.
#[derive(Debug, Clone, Default)]
pub struct ResourceInstanceObjects {
    pub current: Option<ResourceInstanceObjectRecord>,
    pub deposed: BTreeMap<DeposedKey, ResourceInstanceObjectRecord>,
}

/// All stored instances of one resource, plus its provider configuration.
#[derive(Debug, Clone)]
pub struct ResourceState {
    pub addr: Resource,
    pub provider_config: AbsProviderConfig,
    pub instances: BTreeMap<InstanceKey, ResourceInstanceObjects>,
}

/// The resources stored for one module instance.
#[derive(Debug, Clone)]
pub struct ModuleState {
    pub addr: ModuleInstanceAddr,
    /// Keyed by the resource's display form, e.g. `testing_resource.data`.
    pub resources: BTreeMap<String, ResourceState>,
}

impl ModuleState {
    fn new(addr: ModuleInstanceAddr) -> Self {
        Self {
            addr,
            resources: BTreeMap::new(),
        }
    }

    fn resource_mut(
        &mut self,
        resource: Resource,
        provider_config: AbsProviderConfig,
    ) -> &mut ResourceState {
        self.resources
            .entry(resource.to_string())
            .or_insert_with(|| ResourceState {
                addr: resource,
                provider_config,
                instances: BTreeMap::new(),
            })
    }

    /// Set or clear the current object at a resource instance address.
    pub fn set_resource_instance_current(
        &mut self,
        instance: ResourceInstance,
        record: Option<ResourceInstanceObjectRecord>,
        provider_config: AbsProviderConfig,
    ) {
        let key = instance.key.clone();
        let resource = self.resource_mut(instance.resource, provider_config);
        resource.instances.entry(key).or_default().current = record;
    }

    /// Store a deposed object at a resource instance address.
    pub fn set_resource_instance_deposed(
        &mut self,
        instance: ResourceInstance,
        deposed_key: DeposedKey,
        record: ResourceInstanceObjectRecord,
        provider_config: AbsProviderConfig,
    ) {
        let key = instance.key.clone();
        let resource = self.resource_mut(instance.resource, provider_config);
        resource
            .instances
            .entry(key)
            .or_default()
            .deposed
            .insert(deposed_key, record);
    }
}

/// A whole previous run's state in the flat model.
#[derive(Debug, Clone, Default)]
pub struct State {
    /// Keyed by the module instance's display form; the root module is `""`.
    pub modules: BTreeMap<String, ModuleState>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// The root module's state, created on first access.
    pub fn root_module(&mut self) -> &mut ModuleState {
        self.ensure_module(ModuleInstanceAddr::root())
    }

    /// A module's state, created on first access.
    pub fn ensure_module(&mut self, addr: ModuleInstanceAddr) -> &mut ModuleState {
        self.modules
            .entry(addr.to_string())
            .or_insert_with(|| ModuleState::new(addr))
    }

    /// Iterate every stored resource instance, yielding the absolute
    /// address alongside the resource's state and instance objects.
    pub fn all_resource_instances(
        &self,
    ) -> impl Iterator<Item = (AbsResourceInstance, &ResourceState, &ResourceInstanceObjects)> + '_
    {
        self.modules.values().flat_map(|module| {
            module.resources.values().flat_map(move |resource| {
                resource.instances.iter().map(move |(key, objects)| {
                    (
                        AbsResourceInstance {
                            module: module.addr.clone(),
                            resource: ResourceInstance {
                                resource: resource.addr.clone(),
                                key: key.clone(),
                            },
                        },
                        resource,
                        objects,
                    )
                })
            })
        })
    }
}
