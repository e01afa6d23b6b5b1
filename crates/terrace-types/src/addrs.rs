//! Typed addresses for everything the orchestrator can point at.
//!
//! Addresses come in two families: the legacy flat model (modules containing
//! resources, e.g. `module.child.testing_resource.data[0]`) and the stack
//! model (stacks containing components containing resources, e.g.
//! `stack.embedded.component.self.testing_resource.data`). All addresses
//! round-trip through their `Display` form, which is also the form used in
//! persisted state keys and in user-facing diagnostics.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Identifies a provider plugin implementation, e.g. `builtin/testing`.
///
/// This is the lookup key for provider factories and for the process-wide
/// schema caches.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Provider {
    pub namespace: String,
    pub type_name: String,
}

impl Provider {
    pub fn new(namespace: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            type_name: type_name.into(),
        }
    }

    /// A provider in the default `builtin` namespace.
    pub fn builtin(type_name: impl Into<String>) -> Self {
        Self::new("builtin", type_name)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.type_name)
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (namespace, type_name) = s
            .split_once('/')
            .ok_or_else(|| anyhow!("invalid provider address {s:?}: expected namespace/type"))?;
        if namespace.is_empty() || type_name.is_empty() || type_name.contains('/') {
            bail!("invalid provider address {s:?}: expected namespace/type");
        }
        Ok(Self::new(namespace, type_name))
    }
}

/// The lifecycle mode of a resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceMode {
    Managed,
    Data,
    Ephemeral,
}

/// A resource block within one module, e.g. `testing_resource.data`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Resource {
    pub mode: ResourceMode,
    pub type_name: String,
    pub name: String,
}

impl Resource {
    pub fn managed(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: ResourceMode::Managed,
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    pub fn instance(self, key: InstanceKey) -> ResourceInstance {
        ResourceInstance {
            resource: self,
            key,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ResourceMode::Managed => write!(f, "{}.{}", self.type_name, self.name),
            ResourceMode::Data => write!(f, "data.{}.{}", self.type_name, self.name),
            ResourceMode::Ephemeral => write!(f, "ephemeral.{}.{}", self.type_name, self.name),
        }
    }
}

/// The repetition key of one instance of a resource, module or component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InstanceKey {
    /// A singleton declaration.
    None,
    /// A `count`-style index.
    Int(i64),
    /// A `for_each`-style string key.
    Str(String),
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::None => Ok(()),
            InstanceKey::Int(i) => write!(f, "[{i}]"),
            InstanceKey::Str(s) => write!(f, "[{s:?}]"),
        }
    }
}

/// One instance of a resource, e.g. `testing_resource.another[0]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceInstance {
    pub resource: Resource,
    pub key: InstanceKey,
}

impl fmt::Display for ResourceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.resource, self.key)
    }
}

/// A module path in configuration space (no instance keys).
///
/// The root module is the empty path and displays as the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleAddr(pub Vec<String>);

impl ModuleAddr {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ModuleAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for name in &self.0 {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "module.{name}")?;
            first = false;
        }
        Ok(())
    }
}

/// One step of a module instance path: a call name plus its instance key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleInstanceStep {
    pub name: String,
    pub key: InstanceKey,
}

/// A module path in instance space, e.g. `module.child[0].module.leaf`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleInstanceAddr(pub Vec<ModuleInstanceStep>);

impl ModuleInstanceAddr {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(mut self, name: impl Into<String>, key: InstanceKey) -> Self {
        self.0.push(ModuleInstanceStep {
            name: name.into(),
            key,
        });
        self
    }

    /// The configuration-space path this instance path belongs to.
    pub fn config_addr(&self) -> ModuleAddr {
        ModuleAddr(self.0.iter().map(|s| s.name.clone()).collect())
    }

    /// The dotted call-name path used as a key in migration module mappings,
    /// e.g. `child_mod` or `child_mod.leaf`; the root module maps to `""`.
    pub fn mapping_key(&self) -> String {
        self.0
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for ModuleInstanceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for step in &self.0 {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "module.{}{}", step.name, step.key)?;
            first = false;
        }
        Ok(())
    }
}

/// A resource instance qualified by its module instance path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AbsResourceInstance {
    pub module: ModuleInstanceAddr,
    pub resource: ResourceInstance,
}

impl fmt::Display for AbsResourceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module.is_root() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}.{}", self.module, self.resource)
        }
    }
}

impl FromStr for AbsResourceInstance {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let segs = split_segments(s)?;
        let mut cursor = Cursor::new(&segs, s);
        let module = cursor.module_instance_steps()?;
        let resource = cursor.resource_instance()?;
        cursor.finish()?;
        Ok(Self { module, resource })
    }
}

/// A resource block qualified by its configuration-space module path.
///
/// This is the "config resource" subset of resource addressing used for
/// recorded dependencies: no module or resource instance keys are allowed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConfigResource {
    pub module: ModuleAddr,
    pub resource: Resource,
}

impl fmt::Display for ConfigResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module.is_root() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}.{}", self.module, self.resource)
        }
    }
}

impl FromStr for ConfigResource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        // Parse with the instance grammar first, then insist that no step
        // actually carried an instance key.
        let inst = AbsResourceInstance::from_str(s)?;
        if inst.resource.key != InstanceKey::None
            || inst.module.0.iter().any(|step| step.key != InstanceKey::None)
        {
            bail!("invalid config resource address {s:?}: instance keys are not allowed here");
        }
        Ok(Self {
            module: inst.module.config_addr(),
            resource: inst.resource.resource,
        })
    }
}

/// Distinguishes a deposed object from the current object at the same
/// resource instance address. Eight lowercase hex digits.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeposedKey(String);

impl DeposedKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        Self(format!("{:08x}", rand::random::<u32>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeposedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeposedKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            bail!("invalid deposed key {s:?}: expected eight lowercase hex digits");
        }
        Ok(Self(s.to_string()))
    }
}

/// A provider configuration block, e.g. `provider["builtin/testing"]` or
/// `module.child.provider["builtin/testing"].alias`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AbsProviderConfig {
    pub module: ModuleAddr,
    pub provider: Provider,
    pub alias: Option<String>,
}

impl AbsProviderConfig {
    /// The default (unaliased) configuration for a provider in the root
    /// module.
    pub fn default_root(provider: Provider) -> Self {
        Self {
            module: ModuleAddr::root(),
            provider,
            alias: None,
        }
    }
}

impl fmt::Display for AbsProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.module.is_root() {
            write!(f, "{}.", self.module)?;
        }
        write!(f, "provider[{:?}]", self.provider.to_string())?;
        if let Some(alias) = &self.alias {
            write!(f, ".{alias}")?;
        }
        Ok(())
    }
}

impl FromStr for AbsProviderConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let segs = split_segments(s)?;
        let mut i = 0;
        let mut module = Vec::new();
        while segs.get(i).map(String::as_str) == Some("module") {
            let name = segs
                .get(i + 1)
                .ok_or_else(|| anyhow!("invalid provider config address {s:?}"))?;
            module.push(name.clone());
            i += 2;
        }
        let prov_seg = segs
            .get(i)
            .ok_or_else(|| anyhow!("invalid provider config address {s:?}"))?;
        let inner = prov_seg
            .strip_prefix("provider[\"")
            .and_then(|rest| rest.strip_suffix("\"]"))
            .ok_or_else(|| anyhow!("invalid provider config address {s:?}"))?;
        let provider: Provider = inner
            .parse()
            .with_context(|| format!("invalid provider config address {s:?}"))?;
        i += 1;
        let alias = match segs.get(i) {
            Some(alias) if i + 1 == segs.len() => {
                i += 1;
                Some(alias.clone())
            }
            Some(_) => bail!("invalid provider config address {s:?}"),
            None => None,
        };
        if i != segs.len() {
            bail!("invalid provider config address {s:?}");
        }
        Ok(Self {
            module: ModuleAddr(module),
            provider,
            alias,
        })
    }
}

/// A stack scope path; the root stack is the empty path.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StackAddr(pub Vec<String>);

impl StackAddr {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for StackAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for name in &self.0 {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "stack.{name}")?;
            first = false;
        }
        Ok(())
    }
}

/// A component declaration within a stack, e.g. `component.self` or
/// `stack.embedded.component.self`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentAddr {
    pub stack: StackAddr,
    pub name: String,
}

impl ComponentAddr {
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            stack: StackAddr::root(),
            name: name.into(),
        }
    }

    /// The singleton instance of this component.
    pub fn instance(self, key: InstanceKey) -> ComponentInstanceAddr {
        ComponentInstanceAddr {
            stack: self.stack,
            name: self.name,
            key,
        }
    }
}

impl fmt::Display for ComponentAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.stack.is_root() {
            write!(f, "{}.", self.stack)?;
        }
        write!(f, "component.{}", self.name)
    }
}

impl FromStr for ComponentAddr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let inst: ComponentInstanceAddr = s.parse()?;
        if inst.key != InstanceKey::None {
            bail!("invalid component address {s:?}: instance keys are not allowed here");
        }
        Ok(inst.component_addr())
    }
}

/// One instance of a component, e.g. `component.workers[0]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentInstanceAddr {
    pub stack: StackAddr,
    pub name: String,
    pub key: InstanceKey,
}

impl ComponentInstanceAddr {
    pub fn component_addr(&self) -> ComponentAddr {
        ComponentAddr {
            stack: self.stack.clone(),
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for ComponentInstanceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.stack.is_root() {
            write!(f, "{}.", self.stack)?;
        }
        write!(f, "component.{}{}", self.name, self.key)
    }
}

impl FromStr for ComponentInstanceAddr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let segs = split_segments(s)?;
        let mut cursor = Cursor::new(&segs, s);
        let (stack, name, key) = cursor.component_instance()?;
        cursor.finish()?;
        Ok(Self { stack, name, key })
    }
}

/// A resource instance object: the current object when `deposed` is `None`,
/// otherwise the deposed object with the given key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AbsResourceInstanceObject {
    pub resource_instance: AbsResourceInstance,
    pub deposed: Option<DeposedKey>,
}

impl fmt::Display for AbsResourceInstanceObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource_instance)?;
        if let Some(key) = &self.deposed {
            write!(f, " (deposed {key})")?;
        }
        Ok(())
    }
}

/// A resource instance object qualified by the component instance that owns
/// it in the stack state model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StackResourceInstanceObject {
    pub component: ComponentInstanceAddr,
    pub item: AbsResourceInstanceObject,
}

impl fmt::Display for StackResourceInstanceObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.component, self.item)
    }
}

impl FromStr for StackResourceInstanceObject {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let segs = split_segments(s)?;
        let mut cursor = Cursor::new(&segs, s);
        let (stack, name, key) = cursor.component_instance()?;
        let module = cursor.module_instance_steps()?;
        let resource = cursor.resource_instance()?;
        cursor.finish()?;
        Ok(Self {
            component: ComponentInstanceAddr { stack, name, key },
            item: AbsResourceInstanceObject {
                resource_instance: AbsResourceInstance { module, resource },
                deposed: None,
            },
        })
    }
}

// ==================== Parsing helpers ====================

/// Split an address on `.` while respecting `[...]` instance keys, so that
/// `component.a.testing_resource.b["x.y"]` yields four segments.
fn split_segments(s: &str) -> Result<Vec<String>> {
    if s.is_empty() {
        bail!("empty address");
    }
    let mut segs = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    for ch in s.chars() {
        match ch {
            '"' if depth > 0 => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '[' if !in_quotes => {
                depth += 1;
                current.push(ch);
            }
            ']' if !in_quotes => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| anyhow!("invalid address {s:?}: unbalanced brackets"))?;
                current.push(ch);
            }
            '.' if depth == 0 && !in_quotes => {
                segs.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    if depth != 0 || in_quotes {
        bail!("invalid address {s:?}: unbalanced brackets");
    }
    segs.push(current);
    if segs.iter().any(String::is_empty) {
        bail!("invalid address {s:?}: empty segment");
    }
    Ok(segs)
}

/// Split a `name[key]` segment into its parts.
fn parse_name_key(seg: &str, addr: &str) -> Result<(String, InstanceKey)> {
    let Some(open) = seg.find('[') else {
        return Ok((seg.to_string(), InstanceKey::None));
    };
    let name = &seg[..open];
    let raw = seg[open..]
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| anyhow!("invalid address {addr:?}: malformed instance key"))?;
    if name.is_empty() || raw.is_empty() {
        bail!("invalid address {addr:?}: malformed instance key");
    }
    let key = if let Some(quoted) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        InstanceKey::Str(quoted.to_string())
    } else {
        InstanceKey::Int(
            raw.parse::<i64>()
                .with_context(|| format!("invalid address {addr:?}: malformed instance key"))?,
        )
    };
    Ok((name.to_string(), key))
}

struct Cursor<'a> {
    segs: &'a [String],
    addr: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(segs: &'a [String], addr: &'a str) -> Self {
        Self { segs, addr, pos: 0 }
    }

    fn peek(&self) -> Option<&str> {
        self.segs.get(self.pos).map(String::as_str)
    }

    fn next(&mut self) -> Result<&'a str> {
        let seg = self
            .segs
            .get(self.pos)
            .ok_or_else(|| anyhow!("invalid address {:?}: truncated", self.addr))?;
        self.pos += 1;
        Ok(seg)
    }

    fn finish(&self) -> Result<()> {
        if self.pos != self.segs.len() {
            bail!(
                "invalid address {:?}: unexpected trailing {:?}",
                self.addr,
                self.segs[self.pos]
            );
        }
        Ok(())
    }

    fn component_instance(&mut self) -> Result<(StackAddr, String, InstanceKey)> {
        let mut stack = Vec::new();
        while self.peek() == Some("stack") {
            self.next()?;
            stack.push(self.next()?.to_string());
        }
        if self.next()? != "component" {
            bail!("invalid address {:?}: expected component", self.addr);
        }
        let (name, key) = parse_name_key(self.next()?, self.addr)?;
        Ok((StackAddr(stack), name, key))
    }

    fn module_instance_steps(&mut self) -> Result<ModuleInstanceAddr> {
        let mut steps = Vec::new();
        while self.peek() == Some("module") {
            self.next()?;
            let (name, key) = parse_name_key(self.next()?, self.addr)?;
            steps.push(ModuleInstanceStep { name, key });
        }
        Ok(ModuleInstanceAddr(steps))
    }

    fn resource_instance(&mut self) -> Result<ResourceInstance> {
        let mode = match self.peek() {
            Some("data") => {
                self.next()?;
                ResourceMode::Data
            }
            Some("ephemeral") => {
                self.next()?;
                ResourceMode::Ephemeral
            }
            _ => ResourceMode::Managed,
        };
        let type_name = self.next()?.to_string();
        if type_name.contains('[') {
            bail!(
                "invalid address {:?}: resource type may not carry an instance key",
                self.addr
            );
        }
        let (name, key) = parse_name_key(self.next()?, self.addr)?;
        Ok(ResourceInstance {
            resource: Resource {
                mode,
                type_name,
                name,
            },
            key,
        })
    }
}
