//! Attribute type shapes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed vocabulary of attribute type shapes a provider may declare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrType {
    String,
    Number,
    Bool,
    List(Box<AttrType>),
    Set(Box<AttrType>),
    Map(Box<AttrType>),
    Object(BTreeMap<String, AttrType>),
}

impl AttrType {
    pub fn list_of(elem: AttrType) -> Self {
        AttrType::List(Box::new(elem))
    }

    pub fn set_of(elem: AttrType) -> Self {
        AttrType::Set(Box::new(elem))
    }

    pub fn map_of(elem: AttrType) -> Self {
        AttrType::Map(Box::new(elem))
    }

    pub fn is_map(&self) -> bool {
        matches!(self, AttrType::Map(_))
    }

    pub fn is_set(&self) -> bool {
        matches!(self, AttrType::Set(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, AttrType::Object(_))
    }

    /// Shallow-recursive check that a decoded JSON value has this shape.
    pub fn value_conforms(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value as J;
        match (self, value) {
            // Null is accepted for any shape; absence of a value is a
            // separate concern handled by the schema's required flags.
            (_, J::Null) => true,
            (AttrType::String, J::String(_)) => true,
            (AttrType::Number, J::Number(_)) => true,
            (AttrType::Bool, J::Bool(_)) => true,
            (AttrType::List(elem), J::Array(items)) | (AttrType::Set(elem), J::Array(items)) => {
                items.iter().all(|item| elem.value_conforms(item))
            }
            (AttrType::Map(elem), J::Object(entries)) => {
                entries.values().all(|item| elem.value_conforms(item))
            }
            (AttrType::Object(attrs), J::Object(entries)) => {
                entries.iter().all(|(name, item)| {
                    attrs
                        .get(name)
                        .is_some_and(|attr_ty| attr_ty.value_conforms(item))
                })
            }
            _ => false,
        }
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrType::String => f.write_str("string"),
            AttrType::Number => f.write_str("number"),
            AttrType::Bool => f.write_str("bool"),
            AttrType::List(elem) => write!(f, "list({elem})"),
            AttrType::Set(elem) => write!(f, "set({elem})"),
            AttrType::Map(elem) => write!(f, "map({elem})"),
            AttrType::Object(attrs) => {
                f.write_str("object({")?;
                let mut first = true;
                for (name, ty) in attrs {
                    if !first {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name} = {ty}")?;
                    first = false;
                }
                f.write_str("})")
            }
        }
    }
}
