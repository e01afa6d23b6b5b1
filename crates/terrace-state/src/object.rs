//! Stored resource instance objects.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use terrace_types::ConfigResource;

/// Lifecycle status of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectStatus {
    /// The object exists and matched its configuration when last applied.
    Ready,
    /// The object was damaged during a failed operation and must be
    /// replaced on the next apply.
    Tainted,
}

impl ObjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectStatus::Ready => "ready",
            ObjectStatus::Tainted => "tainted",
        }
    }
}

impl fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "ready" => Ok(ObjectStatus::Ready),
            "tainted" => Ok(ObjectStatus::Tainted),
            _ => bail!("unsupported status {s:?}"),
        }
    }
}

impl Default for ObjectStatus {
    fn default() -> Self {
        ObjectStatus::Ready
    }
}

/// One stored resource instance object: the current object at an address,
/// or a deposed one awaiting destruction.
///
/// Attribute and identity payloads stay in their encoded JSON form; only
/// the provider (through its schema) knows how to interpret them, so the
/// state layer never decodes them beyond structural checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInstanceObjectRecord {
    /// JSON-encoded attribute payload.
    pub attrs_json: Vec<u8>,
    pub status: ObjectStatus,
    /// Version of the type schema `attrs_json` was encoded against.
    pub schema_version: u64,
    /// Version of the identity schema `identity_json` was encoded against.
    pub identity_schema_version: u64,
    /// JSON-encoded identity payload; `None` means no identity was stored.
    pub identity_json: Option<Vec<u8>>,
    /// Opaque payload owned by the provider.
    pub private: Option<Vec<u8>>,
    pub create_before_destroy: bool,
    /// Configuration resources this object depended on when created.
    pub dependencies: Vec<ConfigResource>,
}

impl ResourceInstanceObjectRecord {
    /// A ready object with the given attribute payload and defaults for
    /// everything else.
    pub fn ready(attrs_json: impl Into<Vec<u8>>) -> Self {
        Self {
            attrs_json: attrs_json.into(),
            ..Default::default()
        }
    }

    pub fn with_identity(mut self, version: u64, identity_json: impl Into<Vec<u8>>) -> Self {
        self.identity_schema_version = version;
        self.identity_json = Some(identity_json.into());
        self
    }
}
