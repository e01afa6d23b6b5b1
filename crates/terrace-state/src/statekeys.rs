//! The state key taxonomy.
//!
//! Every persisted record is identified by a key string of the form
//! `TAG:payload`. The tag both routes a recognized key to its payload
//! handler and tells an *older* version of this software what to do with a
//! key it does not recognize, via a naming convention on the tag's final
//! character:
//!
//! - a tag ending in `-` may be preserved unchanged by software that does
//!   not understand it;
//! - a tag ending in `.` may be discarded (the codec emits an explicit
//!   deletion for it on the next save);
//! - any other tag is load-bearing, and software that does not recognize
//!   it must refuse to load the state.
//!
//! A key that is not even syntactically valid indicates corruption, not
//! versioning, and always fails the load.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use terrace_types::{ComponentInstanceAddr, DeposedKey, StackResourceInstanceObject};

/// Tag for component instance records.
pub const COMPONENT_INSTANCE_TAG: &str = "CMPT";
/// Tag for resource instance object records.
pub const RESOURCE_INSTANCE_OBJECT_TAG: &str = "RSRC";

/// What to do with a key whose tag this version does not recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnrecognizedKeyHandling {
    FailIfUnrecognized,
    PreserveIfUnrecognized,
    DiscardIfUnrecognized,
}

/// The policy encoded in a tag's final character.
pub fn unrecognized_handling(tag: &str) -> UnrecognizedKeyHandling {
    if tag.ends_with('-') {
        UnrecognizedKeyHandling::PreserveIfUnrecognized
    } else if tag.ends_with('.') {
        UnrecognizedKeyHandling::DiscardIfUnrecognized
    } else {
        UnrecognizedKeyHandling::FailIfUnrecognized
    }
}

/// A parsed, typed identifier for one persisted record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StateKey {
    ComponentInstance {
        addr: ComponentInstanceAddr,
    },
    ResourceInstanceObject {
        addr: StackResourceInstanceObject,
    },
    /// A syntactically valid key whose tag this version does not know.
    Unrecognized {
        type_tag: String,
        remainder: String,
    },
}

impl StateKey {
    /// Whether this version understands the key's record payload.
    pub fn recognized(&self) -> bool {
        !matches!(self, StateKey::Unrecognized { .. })
    }

    pub fn type_tag(&self) -> &str {
        match self {
            StateKey::ComponentInstance { .. } => COMPONENT_INSTANCE_TAG,
            StateKey::ResourceInstanceObject { .. } => RESOURCE_INSTANCE_OBJECT_TAG,
            StateKey::Unrecognized { type_tag, .. } => type_tag,
        }
    }

    pub fn unrecognized_handling(&self) -> UnrecognizedKeyHandling {
        unrecognized_handling(self.type_tag())
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateKey::ComponentInstance { addr } => {
                write!(f, "{COMPONENT_INSTANCE_TAG}:{addr}")
            }
            StateKey::ResourceInstanceObject { addr } => {
                write!(f, "{RESOURCE_INSTANCE_OBJECT_TAG}:{}", addr.component)?;
                write!(f, ":{}", addr.item.resource_instance)?;
                if let Some(deposed) = &addr.item.deposed {
                    write!(f, ":{deposed}")?;
                }
                Ok(())
            }
            StateKey::Unrecognized {
                type_tag,
                remainder,
            } => write!(f, "{type_tag}:{remainder}"),
        }
    }
}

impl FromStr for StateKey {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let (tag, rest) = raw
            .split_once(':')
            .with_context(|| format!("key {raw:?} has no type tag"))?;
        if !valid_tag(tag) {
            bail!("key {raw:?} has malformed type tag {tag:?}");
        }
        match tag {
            COMPONENT_INSTANCE_TAG => {
                let addr: ComponentInstanceAddr = rest
                    .parse()
                    .with_context(|| format!("key {raw:?} has invalid component instance"))?;
                Ok(StateKey::ComponentInstance { addr })
            }
            RESOURCE_INSTANCE_OBJECT_TAG => {
                let (component_part, item_part) = rest
                    .split_once(':')
                    .with_context(|| format!("key {raw:?} has no resource instance"))?;
                let component: ComponentInstanceAddr = component_part
                    .parse()
                    .with_context(|| format!("key {raw:?} has invalid component instance"))?;
                let (instance_part, deposed) = match item_part.split_once(':') {
                    Some((instance_part, deposed_part)) => {
                        let deposed: DeposedKey = deposed_part.parse().with_context(|| {
                            format!("key {raw:?} has invalid deposed key")
                        })?;
                        (instance_part, Some(deposed))
                    }
                    None => (item_part, None),
                };
                let resource_instance = instance_part
                    .parse()
                    .with_context(|| format!("key {raw:?} has invalid resource instance"))?;
                Ok(StateKey::ResourceInstanceObject {
                    addr: StackResourceInstanceObject {
                        component,
                        item: terrace_types::AbsResourceInstanceObject {
                            resource_instance,
                            deposed,
                        },
                    },
                })
            }
            _ => Ok(StateKey::Unrecognized {
                type_tag: tag.to_string(),
                remainder: rest.to_string(),
            }),
        }
    }
}

/// Tags are uppercase ASCII, optionally ending with a policy marker.
fn valid_tag(tag: &str) -> bool {
    let body = tag
        .strip_suffix(|c| c == '-' || c == '.')
        .unwrap_or(tag);
    !body.is_empty() && body.bytes().all(|b| b.is_ascii_uppercase())
}
