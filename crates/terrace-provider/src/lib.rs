//! The provider plugin boundary.
//!
//! Providers are independently versioned plugins reached over an RPC-like
//! transport. This crate defines the capability traits the rest of the
//! workspace programs against ([`Provider`], [`Provisioner`]), the typed
//! request/response messages that cross the boundary, the process-wide
//! schema caches, and [`Plugins`] — the resolver that instantiates a
//! provider on demand, fetches and validates its schemas, and publishes
//! the result into the caches.
//!
//! Nothing in this crate knows how a call is framed or dispatched; a
//! concrete transport supplies its own [`Provider`] implementation via a
//! [`ProviderFactory`].

pub mod cache;
pub mod plugins;
pub mod provider;
pub mod testing;

pub use cache::{ProviderKeyedCache, SchemaCaches};
pub use plugins::Plugins;
pub use provider::{
    GetProviderSchemaResponse, GetProvisionerSchemaResponse, GetResourceIdentitySchemasResponse,
    Provider, ProviderFactory, Provisioner, ProvisionerFactory, ReadResourceRequest,
    ReadResourceResponse, UpgradeResourceIdentityRequest, UpgradeResourceIdentityResponse,
    UNSUPPORTED_PLUGIN_METHOD,
};
