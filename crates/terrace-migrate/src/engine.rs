//! The migration engine.
//!
//! Failure semantics: anything wrong with one resource instance object
//! (schema fetch, read, identity reconciliation) becomes an error
//! diagnostic attached to that object's address, and migration moves on to
//! the next object. Structural problems — an address with no destination
//! component, a reference to an undeclared component — mean the
//! caller-supplied mapping or configuration is incomplete, so they abort
//! the whole run: partial results would be misleading.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::debug;

use terrace_provider::{
    Plugins, Provider, ProviderFactory, ReadResourceRequest, SchemaCaches,
};
use terrace_schema::{IdentitySchema, Schema};
use terrace_state::{
    AppliedChange, AppliedChangeComponentInstance, AppliedChangeResourceInstanceObject,
    ResourceInstanceObjectRecord, State,
};
use terrace_types::{
    AbsProviderConfig, AbsResourceInstance, AbsResourceInstanceObject, ComponentAddr,
    ComponentInstanceAddr, DeposedKey, Diagnostic, Diagnostics, InstanceKey, ModuleInstanceAddr,
    Provider as ProviderAddr, StackResourceInstanceObject, Value,
};

use crate::config::StackConfig;
use crate::graph::build_dependency_graph;
use crate::identity::{reconcile_identities, upgrade_stored_identity};

/// One migration run: a previous flat state, the destination configuration,
/// and the provider factories needed to refresh every stored object.
pub struct Migration {
    pub providers: HashMap<ProviderAddr, ProviderFactory>,
    pub previous_state: State,
    pub config: StackConfig,
    /// Schema caches to resolve against; [`SchemaCaches::global`] for
    /// normal runs, an isolated instance in tests.
    pub caches: Arc<SchemaCaches>,
}

impl Migration {
    /// Migrate every resource instance object in the previous state.
    ///
    /// `resources` maps resource addresses to destination components;
    /// `modules` maps module paths (root is `""`) likewise, and covers any
    /// resource the resource mapping does not name, nearest enclosing
    /// module first. Destinations may be a bare component name (`self`), a
    /// component address (`component.self`), or a stack-qualified instance
    /// address (`stack.embedded.component.self`).
    ///
    /// Applied changes and diagnostics go to the two sinks as they are
    /// produced. Resource object changes are emitted before the component
    /// instance changes that summarize them; no other ordering is
    /// guaranteed, and consumers must key on addresses.
    pub async fn migrate(
        &self,
        resources: &HashMap<String, String>,
        modules: &HashMap<String, String>,
        mut emit: impl FnMut(AppliedChange),
        mut emit_diag: impl FnMut(Diagnostic),
    ) {
        let plugins = Plugins::with_caches(
            self.providers.clone(),
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
            self.caches.clone(),
        );

        // Destination resolution for the whole state happens up front:
        // an unmapped address is fatal before any provider is spoken to.
        let mut placements: Vec<Placement<'_>> = Vec::new();
        for (addr, resource_state, objects) in self.previous_state.all_resource_instances() {
            let Some((dest, consumed_steps)) = destination_for(resources, modules, &addr) else {
                emit_diag(
                    Diagnostic::error(
                        format!("no destination component for resource {addr}"),
                        "the migration mapping does not cover this resource or any of its \
                         enclosing modules",
                    )
                    .with_address(&addr),
                );
                return;
            };
            let component = match parse_destination(dest) {
                Ok(component) => component,
                Err(err) => {
                    emit_diag(
                        Diagnostic::error(
                            format!("invalid destination component address {dest:?}"),
                            err.to_string(),
                        )
                        .with_address(&addr),
                    );
                    return;
                }
            };
            // The mapped module prefix dissolves into the component;
            // any deeper module steps survive below it.
            let item_module = ModuleInstanceAddr(addr.module.0[consumed_steps..].to_vec());
            placements.push(Placement {
                component,
                item: AbsResourceInstance {
                    module: item_module,
                    resource: addr.resource.clone(),
                },
                provider_config: &resource_state.provider_config,
                objects,
            });
        }

        // The configuration's reference graph is validated once, globally;
        // a dangling reference aborts the run before any emission.
        let (graph, graph_diags) = build_dependency_graph(&self.config);
        if graph_diags.has_errors() {
            for diag in graph_diags {
                emit_diag(diag);
            }
            return;
        }

        let mut components: BTreeSet<ComponentInstanceAddr> = BTreeSet::new();

        for placement in &placements {
            components.insert(placement.component.clone());

            let mut object_addrs: Vec<(Option<DeposedKey>, &ResourceInstanceObjectRecord)> =
                Vec::new();
            if let Some(record) = &placement.objects.current {
                object_addrs.push((None, record));
            }
            for (deposed_key, record) in &placement.objects.deposed {
                object_addrs.push((Some(deposed_key.clone()), record));
            }

            for (deposed, record) in object_addrs {
                let addr = StackResourceInstanceObject {
                    component: placement.component.clone(),
                    item: AbsResourceInstanceObject {
                        resource_instance: placement.item.clone(),
                        deposed,
                    },
                };
                match migrate_object(&plugins, &addr, record, placement.provider_config).await {
                    Ok(change) => emit(AppliedChange::ResourceInstanceObject(change)),
                    Err(err) => {
                        debug!(addr = %addr, error = %err, "failed to migrate object");
                        emit_diag(
                            Diagnostic::error(format!("{err:#}"), "").with_address(&addr),
                        );
                    }
                }
            }
        }

        // One summarizing change per touched component instance, after all
        // of its objects.
        for component in components {
            let component_addr = component.component_addr();
            let deps = graph.get(&component_addr).cloned().unwrap_or_default();

            let (input_variables, output_values) = match self.config.component(&component_addr) {
                Some(config) => (
                    unknown_values(&config.input_variables),
                    unknown_values(&config.output_values),
                ),
                None => (BTreeMap::new(), BTreeMap::new()),
            };

            emit(AppliedChange::ComponentInstance(
                AppliedChangeComponentInstance {
                    component_addr,
                    instance_addr: component,
                    output_values,
                    input_variables,
                    dependencies: deps.dependencies,
                    dependents: deps.dependents,
                },
            ));
        }
    }

    /// Run the migration in a background task, streaming results over two
    /// channels. The changes channel closing signals completion; callers
    /// must keep draining the diagnostics channel until it closes too.
    pub fn migrate_streaming(
        self,
        resources: HashMap<String, String>,
        modules: HashMap<String, String>,
    ) -> (
        mpsc::UnboundedReceiver<AppliedChange>,
        mpsc::UnboundedReceiver<Diagnostic>,
    ) {
        let (change_tx, change_rx) = mpsc::unbounded_channel();
        let (diag_tx, diag_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            self.migrate(
                &resources,
                &modules,
                |change| {
                    let _ = change_tx.send(change);
                },
                |diag| {
                    let _ = diag_tx.send(diag);
                },
            )
            .await;
        });
        (change_rx, diag_rx)
    }
}

/// Drain both output channels of a streaming migration to completion.
///
/// Returns once the changes channel has closed *and* any buffered
/// diagnostics have been consumed; stopping earlier risks deadlocking the
/// sender.
pub async fn collect_migration_output(
    mut changes: mpsc::UnboundedReceiver<AppliedChange>,
    mut diagnostics: mpsc::UnboundedReceiver<Diagnostic>,
) -> (Vec<AppliedChange>, Diagnostics) {
    let mut collected = Vec::new();
    let mut diags = Diagnostics::new();
    let mut diags_open = true;

    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Some(change) => collected.push(change),
                None => {
                    // Migration is complete, but there may still be
                    // buffered diagnostics to consume.
                    if diags_open {
                        while let Some(diag) = diagnostics.recv().await {
                            diags.push(diag);
                        }
                    }
                    return (collected, diags);
                }
            },
            diag = diagnostics.recv(), if diags_open => match diag {
                Some(diag) => diags.push(diag),
                None => diags_open = false,
            },
        }
    }
}

struct Placement<'a> {
    component: ComponentInstanceAddr,
    item: AbsResourceInstance,
    provider_config: &'a AbsProviderConfig,
    objects: &'a terrace_state::ResourceInstanceObjects,
}

/// Process one stored object: fetch schemas, refresh through the provider,
/// reconcile identity, and produce the applied change.
async fn migrate_object(
    plugins: &Plugins,
    addr: &StackResourceInstanceObject,
    record: &ResourceInstanceObjectRecord,
    provider_config: &AbsProviderConfig,
) -> Result<AppliedChangeResourceInstanceObject> {
    let provider_addr = &provider_config.provider;
    let resource = &addr.item.resource_instance.resource.resource;

    let schema = plugins
        .resource_type_schema(provider_addr, resource.mode, &resource.type_name)
        .await
        .context("failed to fetch provider schema")?;
    let Some((schema, _schema_version)) = schema else {
        anyhow::bail!(
            "provider {provider_addr} does not declare resource type {type_name:?}",
            type_name = resource.type_name
        );
    };

    let identity_schemas = plugins
        .resource_identity_schemas(provider_addr)
        .await
        .context("failed to fetch resource identity schemas")?;
    let identity_schema = identity_schemas.get(&resource.type_name);

    let provider = plugins
        .new_provider_instance(provider_addr)
        .with_context(|| format!("failed to instantiate provider {provider_addr}"))?;
    let result = refresh_object(
        provider.as_ref(),
        provider_addr,
        addr,
        record,
        &schema,
        identity_schema,
    )
    .await;
    provider.close().await;

    let new_record = result?;
    Ok(AppliedChangeResourceInstanceObject {
        addr: addr.clone(),
        new_record,
        provider_config_addr: provider_config.clone(),
        schema,
    })
}

/// The read/reconcile cycle against one scoped provider instance.
async fn refresh_object(
    provider: &dyn Provider,
    provider_addr: &ProviderAddr,
    addr: &StackResourceInstanceObject,
    record: &ResourceInstanceObjectRecord,
    schema: &Schema,
    identity_schema: Option<&IdentitySchema>,
) -> Result<Option<ResourceInstanceObjectRecord>> {
    let resource = &addr.item.resource_instance.resource.resource;

    let stored_identity = match identity_schema {
        Some(identity_schema) => {
            upgrade_stored_identity(
                provider,
                &resource.type_name,
                identity_schema,
                record.identity_schema_version,
                record.identity_json.as_deref(),
            )
            .await?
        }
        // The provider has no identity schema for this type; any stored
        // identity passes through untouched below.
        None => None,
    };

    let resp = provider
        .read_resource(ReadResourceRequest {
            type_name: resource.type_name.clone(),
            prior_attrs_json: record.attrs_json.clone(),
            private: record.private.clone(),
            current_identity: stored_identity.clone(),
        })
        .await;
    if let Some(err) = resp.diagnostics.to_error() {
        return Err(err.context(format!("failed to read {addr}")));
    }

    let Some(new_attrs_json) = resp.new_attrs_json else {
        // The remote object no longer exists; record an explicit deletion.
        debug!(addr = %addr, "object no longer exists, recording deletion");
        return Ok(None);
    };

    let mut new_record = ResourceInstanceObjectRecord {
        attrs_json: new_attrs_json,
        status: record.status,
        schema_version: schema.version.max(0) as u64,
        identity_schema_version: record.identity_schema_version,
        identity_json: record.identity_json.clone(),
        private: resp.private,
        create_before_destroy: record.create_before_destroy,
        dependencies: record.dependencies.clone(),
    };

    if let Some(identity_schema) = identity_schema {
        let identity = reconcile_identities(
            provider_addr,
            &addr.item.resource_instance.to_string(),
            stored_identity,
            resp.identity.as_ref(),
        )?;
        new_record.identity_schema_version = identity_schema.version.max(0) as u64;
        new_record.identity_json = match identity {
            Some(identity) => Some(serde_json::to_vec(&identity)?),
            None => None,
        };
    }

    Ok(Some(new_record))
}

fn unknown_values(names: &BTreeSet<String>) -> BTreeMap<String, Value> {
    names
        .iter()
        .map(|name| (name.clone(), Value::Unknown))
        .collect()
}

/// Resolve a resource instance to its destination component string, along
/// with how many of its module steps the mapping consumed.
///
/// The resource mapping wins over module mappings; module mappings apply to
/// the nearest enclosing mapped module, so unmapped descendants inherit
/// their ancestors' destination.
fn destination_for<'m>(
    resources: &'m HashMap<String, String>,
    modules: &'m HashMap<String, String>,
    addr: &AbsResourceInstance,
) -> Option<(&'m str, usize)> {
    let resource_key = addr.resource.resource.to_string();
    if addr.module.is_root() {
        if let Some(dest) = resources.get(&resource_key) {
            return Some((dest, 0));
        }
    } else if let Some(dest) = resources.get(&format!("{}.{}", addr.module, resource_key)) {
        return Some((dest, addr.module.0.len()));
    }

    let names: Vec<&str> = addr.module.0.iter().map(|step| step.name.as_str()).collect();
    for depth in (0..=names.len()).rev() {
        let key = names[..depth].join(".");
        if let Some(dest) = modules.get(&key) {
            return Some((dest, depth));
        }
    }
    None
}

/// A destination may be a bare component name or a full component instance
/// address.
fn parse_destination(dest: &str) -> Result<ComponentInstanceAddr> {
    if dest.contains('.') {
        dest.parse()
    } else {
        Ok(ComponentAddr::root(dest).instance(InstanceKey::None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrace_types::Resource;

    fn abs(module: ModuleInstanceAddr, type_name: &str, name: &str) -> AbsResourceInstance {
        AbsResourceInstance {
            module,
            resource: Resource::managed(type_name, name).instance(InstanceKey::None),
        }
    }

    #[test]
    fn test_resource_mapping_wins_over_module_mapping() {
        let resources = HashMap::from([(
            "testing_resource.data".to_string(),
            "special".to_string(),
        )]);
        let modules = HashMap::from([(String::new(), "self".to_string())]);

        let addr = abs(ModuleInstanceAddr::root(), "testing_resource", "data");
        assert_eq!(
            destination_for(&resources, &modules, &addr),
            Some(("special", 0))
        );

        let other = abs(ModuleInstanceAddr::root(), "testing_resource", "other");
        assert_eq!(
            destination_for(&resources, &modules, &other),
            Some(("self", 0))
        );
    }

    #[test]
    fn test_module_mapping_inherits_downward() {
        let resources = HashMap::new();
        let modules = HashMap::from([("child_mod".to_string(), "child".to_string())]);

        let nested = abs(
            ModuleInstanceAddr::root()
                .child("child_mod", InstanceKey::None)
                .child("leaf", InstanceKey::None),
            "testing_resource",
            "deep",
        );
        // The mapped prefix is consumed; the unmapped remainder survives.
        assert_eq!(
            destination_for(&resources, &modules, &nested),
            Some(("child", 1))
        );
    }

    #[test]
    fn test_unmapped_address_has_no_destination() {
        let addr = abs(ModuleInstanceAddr::root(), "testing_resource", "data");
        assert_eq!(
            destination_for(&HashMap::new(), &HashMap::new(), &addr),
            None
        );
    }

    #[test]
    fn test_parse_destination_forms() {
        assert_eq!(
            parse_destination("self").unwrap().to_string(),
            "component.self"
        );
        assert_eq!(
            parse_destination("component.second").unwrap().to_string(),
            "component.second"
        );
        assert_eq!(
            parse_destination("stack.embedded.component.self")
                .unwrap()
                .to_string(),
            "stack.embedded.component.self"
        );
        assert!(parse_destination("not..valid").is_err());
    }
}
