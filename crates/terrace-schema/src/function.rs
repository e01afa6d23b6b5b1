//! Provider-declared functions.
//!
//! Function and parameter names arrive over the plugin wire and are only
//! used for documentation today, but the resolver still enforces that they
//! are valid identifiers with no duplicates so that they can safely be used
//! for more later.

use serde::{Deserialize, Serialize};

use crate::attr::AttrType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionParam {
    pub name: String,
    pub param_type: AttrType,
    pub description: String,
}

impl FunctionParam {
    pub fn new(name: impl Into<String>, param_type: AttrType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub parameters: Vec<FunctionParam>,
    pub variadic_parameter: Option<FunctionParam>,
    pub return_type: AttrType,
    pub summary: String,
}

impl FunctionDecl {
    pub fn new(parameters: Vec<FunctionParam>, return_type: AttrType) -> Self {
        Self {
            parameters,
            variadic_parameter: None,
            return_type,
            summary: String::new(),
        }
    }
}
