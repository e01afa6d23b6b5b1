//! Persisted state for the orchestrator, in both of its shapes.
//!
//! The legacy model ([`flat`]) addresses everything by module and resource.
//! The stack model ([`stack`]) groups resources under component instances
//! and tracks inter-component dependencies. The [`codec`] module moves the
//! stack model in and out of a set of independently keyed binary records,
//! applying the forward-compatibility policy declared by each record's
//! [`statekeys::StateKey`].

pub mod codec;
pub mod flat;
pub mod object;
pub mod stack;
pub mod statekeys;

pub use codec::{decode_state, encode_state};
pub use flat::{ModuleState, ResourceInstanceObjects, ResourceState, State};
pub use object::{ObjectStatus, ResourceInstanceObjectRecord};
pub use stack::{
    AppliedChange, AppliedChangeComponentInstance, AppliedChangeResourceInstanceObject,
    ComponentInstanceState, StackResourceInstanceState, StackState,
};
pub use statekeys::{StateKey, UnrecognizedKeyHandling};
