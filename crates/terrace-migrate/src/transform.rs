//! Graph-node insertion for file-level variable declarations.
//!
//! The execution engine walks a graph of nodes in dependency order; that
//! engine and its graph live outside this core. This adapter contributes
//! one node per top-level variable a file-level scope declares, so that
//! variable evaluation participates in the walk.

use std::collections::BTreeMap;

use anyhow::Result;

use terrace_types::ModuleAddr;

/// Top-level declarations of one file-level scope.
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    /// Variable name to its (unevaluated) expression source.
    pub variables: BTreeMap<String, String>,
}

/// A node contributed to the execution graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileVariableNode {
    pub name: String,
    pub expr: String,
    /// The module path the variable evaluates within.
    pub module: ModuleAddr,
}

/// The execution graph's node set, as visible to transformers.
#[derive(Debug, Default)]
pub struct ExecGraph {
    nodes: Vec<FileVariableNode>,
}

impl ExecGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: FileVariableNode) {
        self.nodes.push(node);
    }

    pub fn nodes(&self) -> &[FileVariableNode] {
        &self.nodes
    }
}

/// A step that contributes nodes to the execution graph.
pub trait GraphTransformer {
    fn transform(&self, graph: &mut ExecGraph) -> Result<()>;
}

/// Adds one node per file-level variable declaration.
pub struct FileVariablesTransformer<'a> {
    pub file: &'a FileConfig,
    pub module: ModuleAddr,
}

impl GraphTransformer for FileVariablesTransformer<'_> {
    fn transform(&self, graph: &mut ExecGraph) -> Result<()> {
        for (name, expr) in &self.file.variables {
            graph.add(FileVariableNode {
                name: name.clone(),
                expr: expr.clone(),
                module: self.module.clone(),
            });
        }
        Ok(())
    }
}
