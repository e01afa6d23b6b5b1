//! The schema resolver.
//!
//! [`Plugins`] wraps the registered provider and provisioner factories and
//! answers every schema question the rest of the workspace asks. Lookups go
//! cache → preloaded table → live fetch; a live fetch spins up a temporary
//! plugin instance, validates everything it reports, publishes the result
//! into the caches and releases the instance before returning, no matter
//! which path it exits through.
//!
//! Validation failures here are always phrased as a bug in the provider:
//! they mean the plugin violated its own contract, and retrying cannot
//! help.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tracing::trace;

use terrace_schema::{
    valid_identifier, BlockSchema, FunctionDecl, ProviderSchemaBundle, ResourceIdentitySchemas,
    Schema,
};
use terrace_types::{Provider as ProviderAddr, ResourceMode};

use crate::cache::SchemaCaches;
use crate::provider::{
    Provider, ProviderFactory, Provisioner, ProvisionerFactory, UNSUPPORTED_PLUGIN_METHOD,
};

/// A library of available plugins for which it is safe to cache schema
/// information.
pub struct Plugins {
    provider_factories: HashMap<ProviderAddr, ProviderFactory>,
    provisioner_factories: HashMap<String, ProvisionerFactory>,

    preloaded_provider_schemas: HashMap<ProviderAddr, Arc<ProviderSchemaBundle>>,
    preloaded_identity_schemas: HashMap<ProviderAddr, Arc<ResourceIdentitySchemas>>,

    caches: Arc<SchemaCaches>,
}

impl Plugins {
    /// Build a plugin library backed by the process-wide schema caches.
    pub fn new(
        provider_factories: HashMap<ProviderAddr, ProviderFactory>,
        provisioner_factories: HashMap<String, ProvisionerFactory>,
        preloaded_provider_schemas: HashMap<ProviderAddr, Arc<ProviderSchemaBundle>>,
        preloaded_identity_schemas: HashMap<ProviderAddr, Arc<ResourceIdentitySchemas>>,
    ) -> Self {
        Self::with_caches(
            provider_factories,
            provisioner_factories,
            preloaded_provider_schemas,
            preloaded_identity_schemas,
            SchemaCaches::global(),
        )
    }

    /// Build a plugin library against an isolated cache pair. Tests use
    /// this so that schemas cached by one case never leak into another.
    pub fn with_caches(
        provider_factories: HashMap<ProviderAddr, ProviderFactory>,
        provisioner_factories: HashMap<String, ProvisionerFactory>,
        preloaded_provider_schemas: HashMap<ProviderAddr, Arc<ProviderSchemaBundle>>,
        preloaded_identity_schemas: HashMap<ProviderAddr, Arc<ResourceIdentitySchemas>>,
        caches: Arc<SchemaCaches>,
    ) -> Self {
        Self {
            provider_factories,
            provisioner_factories,
            preloaded_provider_schemas,
            preloaded_identity_schemas,
            caches,
        }
    }

    pub fn has_provider(&self, addr: &ProviderAddr) -> bool {
        self.provider_factories.contains_key(addr)
    }

    pub fn has_provisioner(&self, type_name: &str) -> bool {
        self.provisioner_factories.contains_key(type_name)
    }

    pub fn has_preloaded_schema_for_provider(&self, addr: &ProviderAddr) -> bool {
        self.preloaded_provider_schemas.contains_key(addr)
    }

    pub fn has_preloaded_identity_schemas_for_provider(&self, addr: &ProviderAddr) -> bool {
        self.preloaded_identity_schemas.contains_key(addr)
    }

    /// Instantiate a fresh provider via its registered factory.
    pub fn new_provider_instance(&self, addr: &ProviderAddr) -> Result<Box<dyn Provider>> {
        let factory = self
            .provider_factories
            .get(addr)
            .ok_or_else(|| anyhow!("unavailable provider {addr:?}", addr = addr.to_string()))?;
        factory()
    }

    /// Instantiate a fresh provisioner via its registered factory.
    pub fn new_provisioner_instance(&self, type_name: &str) -> Result<Box<dyn Provisioner>> {
        let factory = self
            .provisioner_factories
            .get(type_name)
            .ok_or_else(|| anyhow!("unavailable provisioner {type_name:?}"))?;
        factory()
    }

    /// Obtain the full schema bundle for a provider.
    ///
    /// Results are memoized by provider identity, so it is fine to call
    /// this repeatedly from unrelated call sites. A live fetch validates
    /// the response before anything is cached or returned.
    pub async fn provider_schema(&self, addr: &ProviderAddr) -> Result<Arc<ProviderSchemaBundle>> {
        if let Some(bundle) = self.caches.schemas.get(addr) {
            trace!(provider = %addr, "provider schema is in the cache");
            return Ok(bundle);
        }
        if let Some(bundle) = self.preloaded_provider_schemas.get(addr) {
            trace!(provider = %addr, "provider schema is preloaded");
            return Ok(bundle.clone());
        }

        trace!(provider = %addr, "initializing provider to read its schema");
        let provider = self
            .new_provider_instance(addr)
            .with_context(|| format!("failed to instantiate provider {addr} to obtain schema"))?;
        let result = fetch_provider_schema(provider.as_ref(), addr).await;
        provider.close().await;

        let bundle = Arc::new(result?);
        self.caches.schemas.set(addr.clone(), bundle.clone());
        Ok(bundle)
    }

    /// Obtain the resource identity schemas for a provider.
    ///
    /// Providers that predate identity support are tolerated: a factory
    /// failure or an "Unsupported plugin method" response yields an empty
    /// schema set rather than an error. Anything else propagates.
    pub async fn resource_identity_schemas(
        &self,
        addr: &ProviderAddr,
    ) -> Result<Arc<ResourceIdentitySchemas>> {
        if let Some(schemas) = self.caches.identity_schemas.get(addr) {
            trace!(provider = %addr, "resource identity schemas are in the cache");
            return Ok(schemas);
        }
        if let Some(schemas) = self.preloaded_identity_schemas.get(addr) {
            trace!(provider = %addr, "resource identity schemas are preloaded");
            return Ok(schemas.clone());
        }

        trace!(provider = %addr, "initializing provider to read its resource identity schemas");
        let provider = match self.new_provider_instance(addr) {
            Ok(provider) => provider,
            Err(err) => {
                // The provider may have shipped preloaded resource schemas
                // without identity schemas; treat it as having none.
                trace!(provider = %addr, error = %err,
                    "failed to instantiate provider to obtain resource identity schemas");
                return Ok(Arc::new(ResourceIdentitySchemas::new()));
            }
        };
        let result = fetch_identity_schemas(provider.as_ref(), addr).await;
        provider.close().await;

        let schemas = Arc::new(result?);
        self.caches.identity_schemas.set(addr.clone(), schemas.clone());
        Ok(schemas)
    }

    /// The schema expected in a `provider` configuration block for the
    /// given provider.
    pub async fn provider_config_schema(&self, addr: &ProviderAddr) -> Result<BlockSchema> {
        let bundle = self.provider_schema(addr).await?;
        Ok(bundle.provider.body.clone())
    }

    /// The schema for one resource type of the given mode, plus its current
    /// schema version. Returns `Ok(None)` when the provider schema loads
    /// but the provider has no such resource type.
    pub async fn resource_type_schema(
        &self,
        addr: &ProviderAddr,
        mode: ResourceMode,
        type_name: &str,
    ) -> Result<Option<(Schema, u64)>> {
        let bundle = self.provider_schema(addr).await?;
        Ok(bundle
            .schema_for_resource_type(mode, type_name)
            .map(|(schema, version)| (schema.clone(), version)))
    }

    /// All functions the provider declares, if any.
    pub async fn provider_function_decls(
        &self,
        addr: &ProviderAddr,
    ) -> Result<BTreeMap<String, FunctionDecl>> {
        let bundle = self.provider_schema(addr).await?;
        Ok(bundle.functions.clone())
    }

    /// Obtain a provisioner's configuration schema via a temporary
    /// instance.
    pub async fn provisioner_schema(&self, type_name: &str) -> Result<BlockSchema> {
        trace!(provisioner = type_name, "initializing provisioner to read its schema");
        let provisioner = self.new_provisioner_instance(type_name).with_context(|| {
            format!("failed to instantiate provisioner {type_name:?} to obtain schema")
        })?;
        let resp = provisioner.get_schema().await;
        provisioner.close().await;

        if let Some(err) = resp.diagnostics.to_error() {
            bail!("failed to retrieve schema from provisioner {type_name:?}: {err}");
        }
        Ok(resp.provisioner)
    }
}

async fn fetch_provider_schema(
    provider: &dyn Provider,
    addr: &ProviderAddr,
) -> Result<ProviderSchemaBundle> {
    let resp = provider.get_provider_schema().await;
    if let Some(err) = resp.diagnostics.to_error() {
        bail!("failed to retrieve schema from provider {addr}: {err}");
    }
    let schemas = resp.schemas;

    if schemas.provider.version < 0 {
        bail!(
            "provider {addr} has invalid negative schema version for its configuration block, \
             which is a bug in the provider"
        );
    }
    schemas.provider.body.internal_validate().map_err(|err| {
        anyhow!("provider {addr} has invalid schema for its configuration block, which is a bug in the provider: {err}")
    })?;

    for (type_name, schema) in &schemas.resource_types {
        schema.body.internal_validate().map_err(|err| {
            anyhow!(
                "provider {addr} has invalid schema for managed resource type {type_name:?}, \
                 which is a bug in the provider: {err}"
            )
        })?;
        if schema.version < 0 {
            bail!(
                "provider {addr} has invalid negative schema version for managed resource type \
                 {type_name:?}, which is a bug in the provider"
            );
        }
    }

    for (type_name, schema) in &schemas.data_sources {
        schema.body.internal_validate().map_err(|err| {
            anyhow!(
                "provider {addr} has invalid schema for data resource type {type_name:?}, \
                 which is a bug in the provider: {err}"
            )
        })?;
        if schema.version < 0 {
            bail!(
                "provider {addr} has invalid negative schema version for data resource type \
                 {type_name:?}, which is a bug in the provider"
            );
        }
    }

    for (type_name, schema) in &schemas.ephemeral_resource_types {
        schema.body.internal_validate().map_err(|err| {
            anyhow!(
                "provider {addr} has invalid schema for ephemeral resource type {type_name:?}, \
                 which is a bug in the provider: {err}"
            )
        })?;
    }

    for (name, decl) in &schemas.functions {
        if !valid_identifier(name) {
            bail!("provider {addr} declares function with invalid name {name:?}");
        }
        let mut seen_params: HashMap<&str, usize> = HashMap::with_capacity(decl.parameters.len());
        for (i, param) in decl.parameters.iter().enumerate() {
            if !valid_identifier(&param.name) {
                bail!(
                    "provider {addr} function {name:?} declares invalid name {param:?} for \
                     parameter {i}",
                    param = param.name
                );
            }
            if let Some(prev) = seen_params.insert(param.name.as_str(), i) {
                bail!(
                    "provider {addr} function {name:?} reuses name {param:?} for both \
                     parameters {prev} and {i}",
                    param = param.name
                );
            }
        }
        if let Some(param) = &decl.variadic_parameter {
            if !valid_identifier(&param.name) {
                bail!(
                    "provider {addr} function {name:?} declares invalid name {param:?} for its \
                     variadic parameter",
                    param = param.name
                );
            }
            if let Some(prev) = seen_params.get(param.name.as_str()) {
                bail!(
                    "provider {addr} function {name:?} reuses name {param:?} for both \
                     parameter {prev} and its variadic parameter",
                    param = param.name
                );
            }
        }
    }

    Ok(schemas)
}

async fn fetch_identity_schemas(
    provider: &dyn Provider,
    addr: &ProviderAddr,
) -> Result<ResourceIdentitySchemas> {
    let resp = provider.get_resource_identity_schemas().await;
    if resp.diagnostics.has_errors() {
        if resp
            .diagnostics
            .iter()
            .any(|diag| diag.summary == UNSUPPORTED_PLUGIN_METHOD)
        {
            // The provider predates identity support; it simply has no
            // identities.
            return Ok(ResourceIdentitySchemas::new());
        }
        let err = resp.diagnostics.to_error().unwrap_or_else(|| anyhow!("unknown error"));
        bail!("failed to retrieve resource identity schemas from provider {addr}: {err}");
    }

    for (type_name, schema) in &resp.identity_types {
        if schema.version < 0 {
            bail!(
                "provider {addr} has invalid negative schema version for managed resource type \
                 {type_name:?}, which is a bug in the provider"
            );
        }
        for (attr_name, attr) in &schema.attributes {
            if attr.attr_type.is_map() {
                bail!(
                    "provider {addr} has invalid schema for managed resource type {type_name:?}, \
                     attribute {attr_name:?} is a map, which is not allowed in identity schemas"
                );
            }
            if attr.attr_type.is_set() {
                bail!(
                    "provider {addr} has invalid schema for managed resource type {type_name:?}, \
                     attribute {attr_name:?} is a set, which is not allowed in identity schemas"
                );
            }
            if attr.attr_type.is_object() {
                bail!(
                    "provider {addr} has invalid schema for managed resource type {type_name:?}, \
                     attribute {attr_name:?} is an object, which is not allowed in identity schemas"
                );
            }
        }
    }

    Ok(resp.identity_types)
}
