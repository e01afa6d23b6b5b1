//! Block/attribute schemas for resource types and provider configuration.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::attr::AttrType;
use crate::function::FunctionDecl;
use crate::valid_identifier;
use terrace_types::ResourceMode;

/// One attribute within a block schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub attr_type: AttrType,
    pub description: String,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
}

impl Attribute {
    pub fn required(attr_type: AttrType) -> Self {
        Self {
            attr_type,
            description: String::new(),
            required: true,
            optional: false,
            computed: false,
            sensitive: false,
        }
    }

    pub fn optional(attr_type: AttrType) -> Self {
        Self {
            attr_type,
            description: String::new(),
            required: false,
            optional: true,
            computed: false,
            sensitive: false,
        }
    }

    pub fn computed(attr_type: AttrType) -> Self {
        Self {
            attr_type,
            description: String::new(),
            required: false,
            optional: false,
            computed: true,
            sensitive: false,
        }
    }
}

/// How a nested block repeats within its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NestingMode {
    Single,
    List,
    Set,
    Map,
}

/// A nested block declaration within a block schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedBlock {
    pub nesting: NestingMode,
    pub block: BlockSchema,
}

/// The body of a resource type or provider configuration schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSchema {
    pub attributes: BTreeMap<String, Attribute>,
    pub block_types: BTreeMap<String, NestedBlock>,
}

impl BlockSchema {
    /// Structural self-consistency check.
    ///
    /// A failure indicates the provider emitted a schema that violates its
    /// own contract; callers surface it as a bug in the provider.
    pub fn internal_validate(&self) -> Result<()> {
        for (name, attr) in &self.attributes {
            if !valid_identifier(name) {
                bail!("attribute {name:?} has an invalid name");
            }
            let valid_flags = match (attr.required, attr.optional, attr.computed) {
                (true, false, false) => true,
                (false, true, false) => true,
                (false, false, true) => true,
                (false, true, true) => true,
                _ => false,
            };
            if !valid_flags {
                bail!(
                    "attribute {name:?} has an invalid combination of required, optional and computed"
                );
            }
        }
        for (name, nested) in &self.block_types {
            if !valid_identifier(name) {
                bail!("block type {name:?} has an invalid name");
            }
            if self.attributes.contains_key(name) {
                bail!("block type {name:?} collides with an attribute of the same name");
            }
            nested.block.internal_validate()?;
        }
        Ok(())
    }
}

/// A versioned resource type (or provider configuration) schema.
///
/// The version is `i64` because it crosses the plugin wire: a misbehaving
/// provider can report a negative version, and the resolver must detect
/// that rather than silently wrap it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub version: i64,
    pub body: BlockSchema,
}

/// Everything a provider declares about itself: its own configuration
/// schema, its resource/data/ephemeral types, and its functions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSchemaBundle {
    pub provider: Schema,
    pub resource_types: BTreeMap<String, Schema>,
    pub data_sources: BTreeMap<String, Schema>,
    pub ephemeral_resource_types: BTreeMap<String, Schema>,
    pub functions: BTreeMap<String, FunctionDecl>,
}

impl ProviderSchemaBundle {
    /// Look up the schema for a resource type in the given mode, along with
    /// its current schema version. The version is only meaningful for
    /// managed resources.
    pub fn schema_for_resource_type(
        &self,
        mode: ResourceMode,
        type_name: &str,
    ) -> Option<(&Schema, u64)> {
        let schema = match mode {
            ResourceMode::Managed => self.resource_types.get(type_name)?,
            ResourceMode::Data => self.data_sources.get(type_name)?,
            ResourceMode::Ephemeral => self.ephemeral_resource_types.get(type_name)?,
        };
        Some((schema, schema.version.max(0) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_with(name: &str, attr: Attribute) -> BlockSchema {
        BlockSchema {
            attributes: BTreeMap::from([(name.to_string(), attr)]),
            block_types: BTreeMap::new(),
        }
    }

    #[test]
    fn test_validate_accepts_usual_flags() {
        for attr in [
            Attribute::required(AttrType::String),
            Attribute::optional(AttrType::String),
            Attribute::computed(AttrType::String),
        ] {
            body_with("id", attr).internal_validate().unwrap();
        }
        let mut opt_computed = Attribute::optional(AttrType::String);
        opt_computed.computed = true;
        body_with("id", opt_computed).internal_validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_flag_conflicts() {
        let mut required_computed = Attribute::required(AttrType::String);
        required_computed.computed = true;
        assert!(body_with("id", required_computed).internal_validate().is_err());

        let mut none = Attribute::required(AttrType::String);
        none.required = false;
        assert!(body_with("id", none).internal_validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        assert!(body_with("not a name", Attribute::required(AttrType::String))
            .internal_validate()
            .is_err());
    }

    #[test]
    fn test_validate_recurses_into_blocks() {
        let mut bad_inner = Attribute::required(AttrType::String);
        bad_inner.optional = true;
        let schema = BlockSchema {
            attributes: BTreeMap::new(),
            block_types: BTreeMap::from([(
                "rule".to_string(),
                NestedBlock {
                    nesting: NestingMode::List,
                    block: body_with("action", bad_inner),
                },
            )]),
        };
        assert!(schema.internal_validate().is_err());
    }

    #[test]
    fn test_schema_for_resource_type() {
        let bundle = ProviderSchemaBundle {
            resource_types: BTreeMap::from([(
                "testing_resource".to_string(),
                Schema {
                    version: 3,
                    body: BlockSchema::default(),
                },
            )]),
            ..Default::default()
        };
        let (schema, version) = bundle
            .schema_for_resource_type(ResourceMode::Managed, "testing_resource")
            .unwrap();
        assert_eq!(schema.version, 3);
        assert_eq!(version, 3);
        assert!(bundle
            .schema_for_resource_type(ResourceMode::Data, "testing_resource")
            .is_none());
    }
}
