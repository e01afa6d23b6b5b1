//! User-facing diagnostics.
//!
//! Per-resource failures during migration are not propagated as errors;
//! they are collected as diagnostics and streamed to the caller's sink so
//! that one broken resource never aborts its siblings.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

/// One problem report, optionally attached to the address it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
    /// Display form of the address this diagnostic is about, if any.
    pub address: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
            address: None,
        }
    }

    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
            address: None,
        }
    }

    pub fn with_address(mut self, address: impl ToString) -> Self {
        self.address = Some(address.to_string());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Error => write!(f, "Error: {}", self.summary)?,
            Severity::Warning => write!(f, "Warning: {}", self.summary)?,
        }
        if let Some(addr) = &self.address {
            write!(f, "\nwith {addr}")?;
        }
        if !self.detail.is_empty() {
            write!(f, "\n\n{}", self.detail)?;
        }
        Ok(())
    }
}

/// An ordered collection of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics(pub Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.0.push(diag);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    /// Collapse all error diagnostics into one error value, for callers that
    /// only care whether the operation failed.
    pub fn to_error(&self) -> Option<anyhow::Error> {
        let mut messages: Vec<String> = Vec::new();
        for diag in &self.0 {
            if diag.severity == Severity::Error {
                if diag.detail.is_empty() {
                    messages.push(diag.summary.clone());
                } else {
                    messages.push(format!("{}: {}", diag.summary, diag.detail));
                }
            }
        }
        if messages.is_empty() {
            None
        } else {
            Some(anyhow::anyhow!(messages.join("; ")))
        }
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<Vec<Diagnostic>> for Diagnostics {
    fn from(v: Vec<Diagnostic>) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_errors() {
        let mut diags = Diagnostics::new();
        assert!(!diags.has_errors());
        diags.push(Diagnostic::warning("minor", ""));
        assert!(!diags.has_errors());
        diags.push(Diagnostic::error("broken", "badly"));
        assert!(diags.has_errors());
        assert_eq!(diags.to_error().unwrap().to_string(), "broken: badly");
    }

    #[test]
    fn test_display_includes_address() {
        let diag = Diagnostic::error("failed to read resource", "it is gone")
            .with_address("testing_resource.data");
        let rendered = diag.to_string();
        assert!(rendered.contains("Error: failed to read resource"));
        assert!(rendered.contains("with testing_resource.data"));
    }
}
