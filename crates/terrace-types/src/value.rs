//! Values flowing through component inputs and outputs.

use serde::{Deserialize, Serialize};

/// A component input or output value.
///
/// Migration usually cannot resolve the real value of a component's inputs
/// and outputs — those are only computed by a later plan/apply — so most
/// values emitted here are the [`Value::Unknown`] sentinel. Consumers must
/// treat `Unknown` as "will be determined later", never as null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Unknown,
    Known(serde_json::Value),
}

impl Value {
    pub fn known(v: impl Into<serde_json::Value>) -> Self {
        Value::Known(v.into())
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Known(v)
    }
}
