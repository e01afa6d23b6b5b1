//! Process-wide schema caches.
//!
//! Fetching a provider's schema means spinning up a plugin instance, so the
//! results are cached per provider for the lifetime of the process. Entries
//! are never evicted: a long-running host serving many unrelated
//! configurations will hold memory proportional to the distinct providers it
//! has seen. That is a known limitation, accepted here.
//!
//! Both this core and the provider-instantiation layer reach the same
//! caches, so the defaults are process singletons; tests (and embedders
//! that must not share schemas process-wide) construct their own
//! [`SchemaCaches`] and inject it into the resolver instead.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use terrace_schema::{ProviderSchemaBundle, ResourceIdentitySchemas};
use terrace_types::Provider;

/// A mutex-guarded map keyed by provider identity.
///
/// Operations are O(1) map accesses; the lock is only ever held for the
/// access itself, never across a provider RPC.
#[derive(Debug, Default)]
pub struct ProviderKeyedCache<V> {
    m: Mutex<HashMap<Provider, V>>,
}

impl<V: Clone> ProviderKeyedCache<V> {
    pub fn new() -> Self {
        Self {
            m: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, provider: &Provider) -> Option<V> {
        self.m.lock().get(provider).cloned()
    }

    pub fn set(&self, provider: Provider, value: V) {
        self.m.lock().insert(provider, value);
    }

    pub fn len(&self) -> usize {
        self.m.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.m.lock().is_empty()
    }
}

/// The pair of caches the schema resolver works against.
#[derive(Debug, Default)]
pub struct SchemaCaches {
    pub schemas: ProviderKeyedCache<Arc<ProviderSchemaBundle>>,
    pub identity_schemas: ProviderKeyedCache<Arc<ResourceIdentitySchemas>>,
}

impl SchemaCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache pair, created on first use.
    pub fn global() -> Arc<SchemaCaches> {
        static GLOBAL: OnceLock<Arc<SchemaCaches>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(SchemaCaches::new())).clone()
    }
}
