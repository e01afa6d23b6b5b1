//! Shared types for the terrace workspace.
//!
//! Everything that more than one crate needs to name lives here: the typed
//! address vocabulary (providers, modules, resources, components, stacks),
//! the diagnostics model carried through change sinks, and the [`Value`]
//! type with its unknown/dynamic sentinel.

pub mod addrs;
pub mod diags;
pub mod value;

pub use addrs::{
    AbsProviderConfig, AbsResourceInstance, AbsResourceInstanceObject, ComponentAddr,
    ComponentInstanceAddr, ConfigResource, DeposedKey, InstanceKey, ModuleAddr,
    ModuleInstanceAddr, ModuleInstanceStep, Provider, Resource, ResourceInstance, ResourceMode,
    StackAddr, StackResourceInstanceObject,
};
pub use diags::{Diagnostic, Diagnostics, Severity};
pub use value::Value;
