//! Provider schema data model.
//!
//! Providers describe their resource types with a block/attribute schema and,
//! separately, describe resource identities with a flat versioned attribute
//! set. Both arrive over an untrusted plugin boundary, so everything here
//! carries a `validate`-style structural self-check; a schema that fails
//! validation indicates a bug in the provider, never in the caller.

pub mod attr;
pub mod block;
pub mod function;
pub mod identity;

pub use attr::AttrType;
pub use block::{Attribute, BlockSchema, NestedBlock, NestingMode, ProviderSchemaBundle, Schema};
pub use function::{FunctionDecl, FunctionParam};
pub use identity::{IdentityAttribute, IdentitySchema, ResourceIdentitySchemas};

/// Whether `s` is a valid configuration identifier: a leading ASCII letter
/// or underscore followed by letters, digits, underscores or dashes.
pub fn valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifier() {
        assert!(valid_identifier("id"));
        assert!(valid_identifier("_private"));
        assert!(valid_identifier("instance-id"));
        assert!(valid_identifier("v2_name"));
        assert!(!valid_identifier(""));
        assert!(!valid_identifier("2fast"));
        assert!(!valid_identifier("has space"));
        assert!(!valid_identifier("dotted.name"));
    }
}
