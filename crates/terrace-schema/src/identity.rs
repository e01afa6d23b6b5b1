//! Resource identity schemas.
//!
//! An identity is a small, versioned attribute set that names a remote
//! object independently of its full configuration schema; it is what import
//! and drift detection key on. Identity attributes are deliberately
//! restricted to primitive and list-like shapes — map, set and object
//! shapes are rejected at validation time even though the general type
//! schema allows them.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::attr::AttrType;

/// One attribute in an identity schema.
///
/// Every identity attribute is required when a provider reports an identity;
/// the import flags only loosen what a user must spell out when importing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityAttribute {
    pub attr_type: AttrType,
    pub description: String,
    pub required_for_import: bool,
    pub optional_for_import: bool,
}

impl IdentityAttribute {
    pub fn required_for_import(attr_type: AttrType) -> Self {
        Self {
            attr_type,
            description: String::new(),
            required_for_import: true,
            optional_for_import: false,
        }
    }
}

/// A provider's identity schema for one resource type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySchema {
    pub version: i64,
    pub attributes: BTreeMap<String, IdentityAttribute>,
}

/// Identity schemas for all resource types of one provider.
pub type ResourceIdentitySchemas = BTreeMap<String, IdentitySchema>;

impl IdentitySchema {
    /// Decode a stored identity payload against this schema.
    ///
    /// The payload must be a JSON object whose attribute set matches the
    /// schema exactly; an attribute the schema does not declare means the
    /// provider changed its identity schema without bumping the version.
    pub fn decode(&self, payload: &[u8]) -> Result<serde_json::Value> {
        let value: serde_json::Value =
            serde_json::from_slice(payload).context("identity payload is not valid JSON")?;
        let obj = match &value {
            serde_json::Value::Object(obj) => obj,
            _ => bail!("identity payload is not an object"),
        };
        for name in obj.keys() {
            if !self.attributes.contains_key(name) {
                bail!("unsupported attribute {name:?}");
            }
        }
        for (name, attr) in &self.attributes {
            match obj.get(name) {
                None => bail!("missing attribute {name:?}"),
                Some(item) if !attr.attr_type.value_conforms(item) => {
                    bail!(
                        "attribute {name:?} does not conform to type {}",
                        attr.attr_type
                    );
                }
                Some(_) => {}
            }
        }
        Ok(value)
    }
}
