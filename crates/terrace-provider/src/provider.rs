//! Capability traits and messages for provider and provisioner plugins.
//!
//! The traits model the subset of the plugin protocol this core consumes.
//! Responses carry diagnostics rather than a `Result` because a plugin can
//! return partial data alongside its complaints, and because some
//! diagnostics (notably [`UNSUPPORTED_PLUGIN_METHOD`]) are tolerated by
//! callers rather than treated as failures.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use terrace_schema::{BlockSchema, ProviderSchemaBundle, ResourceIdentitySchemas};
use terrace_types::Diagnostics;

/// Diagnostic summary used by plugins that do not implement an optional
/// protocol method. Callers that can degrade gracefully match on this.
pub const UNSUPPORTED_PLUGIN_METHOD: &str = "Unsupported plugin method";

#[derive(Debug, Clone, Default)]
pub struct GetProviderSchemaResponse {
    pub schemas: ProviderSchemaBundle,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Default)]
pub struct GetResourceIdentitySchemasResponse {
    pub identity_types: ResourceIdentitySchemas,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone)]
pub struct ReadResourceRequest {
    pub type_name: String,
    /// The object's previously stored attributes, JSON-encoded.
    pub prior_attrs_json: Vec<u8>,
    /// Opaque provider-private payload stored alongside the object.
    pub private: Option<Vec<u8>>,
    /// The stored identity, already upgraded to the provider's current
    /// identity schema version, if one exists.
    pub current_identity: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct ReadResourceResponse {
    /// The refreshed attributes, or `None` when the remote object no longer
    /// exists.
    pub new_attrs_json: Option<Vec<u8>>,
    /// The identity the provider reports for the freshly read object.
    pub identity: Option<serde_json::Value>,
    pub private: Option<Vec<u8>>,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone)]
pub struct UpgradeResourceIdentityRequest {
    pub type_name: String,
    /// The stored identity payload, encoded against `from_version`.
    pub raw_identity_json: Vec<u8>,
    pub from_version: i64,
    pub to_version: i64,
}

#[derive(Debug, Clone, Default)]
pub struct UpgradeResourceIdentityResponse {
    pub upgraded_identity: Option<serde_json::Value>,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Default)]
pub struct GetProvisionerSchemaResponse {
    pub provisioner: BlockSchema,
    pub diagnostics: Diagnostics,
}

/// The capability set of a provider plugin.
///
/// One instance is scoped to a tight request/response cycle: instantiate
/// through a [`ProviderFactory`], make the calls, then [`Provider::close`].
/// Implementations must be safe to drive from any task; they hold no state
/// the caller depends on between calls.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn get_provider_schema(&self) -> GetProviderSchemaResponse;

    async fn get_resource_identity_schemas(&self) -> GetResourceIdentitySchemasResponse;

    async fn read_resource(&self, request: ReadResourceRequest) -> ReadResourceResponse;

    async fn upgrade_resource_identity(
        &self,
        request: UpgradeResourceIdentityRequest,
    ) -> UpgradeResourceIdentityResponse;

    /// Release the plugin instance. Must be called on every exit path.
    async fn close(&self);
}

/// The capability set of a provisioner plugin.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn get_schema(&self) -> GetProvisionerSchemaResponse;

    async fn close(&self);
}

/// Creates a fresh provider instance per call.
pub type ProviderFactory = Arc<dyn Fn() -> Result<Box<dyn Provider>> + Send + Sync>;

/// Creates a fresh provisioner instance per call.
pub type ProvisionerFactory = Arc<dyn Fn() -> Result<Box<dyn Provisioner>> + Send + Sync>;
