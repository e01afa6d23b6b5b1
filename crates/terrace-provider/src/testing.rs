//! An in-memory provider for tests.
//!
//! [`TestingProvider`] is a fully in-process [`Provider`] with canned,
//! per-case-configurable responses, used by tests across the workspace in
//! place of a real plugin transport. Its default shape declares a single
//! managed resource type, `testing_resource`, with an `id`/`value` pair of
//! attributes and a one-attribute identity schema.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use terrace_schema::{
    Attribute, AttrType, BlockSchema, FunctionDecl, IdentityAttribute, IdentitySchema,
    ProviderSchemaBundle, ResourceIdentitySchemas, Schema,
};
use terrace_types::Diagnostic;

use crate::provider::{
    GetProviderSchemaResponse, GetResourceIdentitySchemasResponse, Provider, ReadResourceRequest,
    ReadResourceResponse, UpgradeResourceIdentityRequest, UpgradeResourceIdentityResponse,
};

/// The schema of the `testing_resource` managed resource type.
pub fn testing_resource_schema() -> Schema {
    let mut id = Attribute::optional(AttrType::String);
    id.computed = true;
    Schema {
        version: 0,
        body: BlockSchema {
            attributes: BTreeMap::from([
                ("id".to_string(), id),
                ("value".to_string(), Attribute::optional(AttrType::String)),
            ]),
            block_types: BTreeMap::new(),
        },
    }
}

/// The identity schema of the `testing_resource` managed resource type.
pub fn testing_resource_identity_schema() -> IdentitySchema {
    IdentitySchema {
        version: 0,
        attributes: BTreeMap::from([(
            "id".to_string(),
            IdentityAttribute::required_for_import(AttrType::String),
        )]),
    }
}

/// Call counts observed across every instance sharing the counter set.
///
/// Factories hand out a fresh provider per instantiation, so tests that
/// assert on call counts share one `Arc<CallCounters>` across instances.
#[derive(Debug, Default)]
pub struct CallCounters {
    get_schema: AtomicUsize,
    get_identity_schemas: AtomicUsize,
    read: AtomicUsize,
    upgrade: AtomicUsize,
    close: AtomicUsize,
}

impl CallCounters {
    pub fn get_schema(&self) -> usize {
        self.get_schema.load(Ordering::SeqCst)
    }

    pub fn get_identity_schemas(&self) -> usize {
        self.get_identity_schemas.load(Ordering::SeqCst)
    }

    pub fn read(&self) -> usize {
        self.read.load(Ordering::SeqCst)
    }

    pub fn upgrade(&self) -> usize {
        self.upgrade.load(Ordering::SeqCst)
    }

    pub fn close(&self) -> usize {
        self.close.load(Ordering::SeqCst)
    }
}

/// An in-memory provider with configurable responses.
#[derive(Clone)]
pub struct TestingProvider {
    schemas: ProviderSchemaBundle,
    schema_diagnostic: Option<Diagnostic>,
    identity_types: ResourceIdentitySchemas,
    identity_schemas_diagnostic: Option<Diagnostic>,
    /// Identity reported alongside reads, keyed by resource type.
    read_identities: BTreeMap<String, serde_json::Value>,
    read_response: Option<ReadResourceResponse>,
    upgrade_response: Option<UpgradeResourceIdentityResponse>,
    counters: Arc<CallCounters>,
}

impl Default for TestingProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TestingProvider {
    pub fn new() -> Self {
        Self {
            schemas: ProviderSchemaBundle {
                resource_types: BTreeMap::from([(
                    "testing_resource".to_string(),
                    testing_resource_schema(),
                )]),
                ..Default::default()
            },
            schema_diagnostic: None,
            identity_types: BTreeMap::from([(
                "testing_resource".to_string(),
                testing_resource_identity_schema(),
            )]),
            identity_schemas_diagnostic: None,
            read_identities: BTreeMap::new(),
            read_response: None,
            upgrade_response: None,
            counters: Arc::new(CallCounters::default()),
        }
    }

    pub fn with_counters(mut self, counters: Arc<CallCounters>) -> Self {
        self.counters = counters;
        self
    }

    pub fn with_resource_type(mut self, type_name: impl Into<String>, schema: Schema) -> Self {
        self.schemas.resource_types.insert(type_name.into(), schema);
        self
    }

    pub fn with_function(mut self, name: impl Into<String>, decl: FunctionDecl) -> Self {
        self.schemas.functions.insert(name.into(), decl);
        self
    }

    pub fn with_schema_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.schema_diagnostic = Some(diagnostic);
        self
    }

    pub fn with_identity_schema(
        mut self,
        type_name: impl Into<String>,
        schema: IdentitySchema,
    ) -> Self {
        self.identity_types.insert(type_name.into(), schema);
        self
    }

    pub fn without_identity_schemas(mut self) -> Self {
        self.identity_types.clear();
        self
    }

    pub fn with_identity_schemas_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.identity_schemas_diagnostic = Some(diagnostic);
        self
    }

    /// Report `identity` alongside every read of the given resource type.
    pub fn with_read_identity(
        mut self,
        type_name: impl Into<String>,
        identity: serde_json::Value,
    ) -> Self {
        self.read_identities.insert(type_name.into(), identity);
        self
    }

    /// Replace the default echo behavior of reads with a canned response.
    pub fn with_read_response(mut self, response: ReadResourceResponse) -> Self {
        self.read_response = Some(response);
        self
    }

    pub fn with_upgrade_response(mut self, response: UpgradeResourceIdentityResponse) -> Self {
        self.upgrade_response = Some(response);
        self
    }
}

#[async_trait]
impl Provider for TestingProvider {
    async fn get_provider_schema(&self) -> GetProviderSchemaResponse {
        self.counters.get_schema.fetch_add(1, Ordering::SeqCst);
        let mut resp = GetProviderSchemaResponse {
            schemas: self.schemas.clone(),
            ..Default::default()
        };
        if let Some(diag) = &self.schema_diagnostic {
            resp.diagnostics.push(diag.clone());
        }
        resp
    }

    async fn get_resource_identity_schemas(&self) -> GetResourceIdentitySchemasResponse {
        self.counters.get_identity_schemas.fetch_add(1, Ordering::SeqCst);
        let mut resp = GetResourceIdentitySchemasResponse {
            identity_types: self.identity_types.clone(),
            ..Default::default()
        };
        if let Some(diag) = &self.identity_schemas_diagnostic {
            resp.diagnostics.push(diag.clone());
        }
        resp
    }

    async fn read_resource(&self, request: ReadResourceRequest) -> ReadResourceResponse {
        self.counters.read.fetch_add(1, Ordering::SeqCst);
        if let Some(canned) = &self.read_response {
            return canned.clone();
        }
        // Default behavior: the remote object still exists and matches the
        // stored attributes exactly.
        ReadResourceResponse {
            new_attrs_json: Some(request.prior_attrs_json),
            identity: self.read_identities.get(&request.type_name).cloned(),
            private: request.private,
            diagnostics: Default::default(),
        }
    }

    async fn upgrade_resource_identity(
        &self,
        request: UpgradeResourceIdentityRequest,
    ) -> UpgradeResourceIdentityResponse {
        self.counters.upgrade.fetch_add(1, Ordering::SeqCst);
        if let Some(canned) = &self.upgrade_response {
            return canned.clone();
        }
        // Default behavior: the identity payload is unchanged across
        // versions.
        match serde_json::from_slice(&request.raw_identity_json) {
            Ok(value) => UpgradeResourceIdentityResponse {
                upgraded_identity: Some(value),
                diagnostics: Default::default(),
            },
            Err(err) => {
                let mut resp = UpgradeResourceIdentityResponse::default();
                resp.diagnostics.push(Diagnostic::error(
                    "failed to upgrade resource identity",
                    err.to_string(),
                ));
                resp
            }
        }
    }

    async fn close(&self) {
        self.counters.close.fetch_add(1, Ordering::SeqCst);
    }
}
