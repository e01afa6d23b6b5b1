//! Encode/decode between stack state and its persisted record set.
//!
//! A persisted snapshot is a map from key string to a binary record; the
//! byte-level envelope around that map (file format, transport) belongs to
//! the caller. This module owns the record payload shapes and the
//! forward-compatibility behavior: recognized keys dispatch to a payload
//! handler, unrecognized keys follow the policy their tag declares.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::trace;

use terrace_types::{AbsProviderConfig, ConfigResource};

use crate::object::{ObjectStatus, ResourceInstanceObjectRecord};
use crate::stack::StackState;
use crate::statekeys::{StateKey, UnrecognizedKeyHandling};

/// Payload for a component instance record. All of the information lives
/// in the key itself, for now at least.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ComponentInstanceRecordV1 {}

/// Payload for a resource instance object record.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ResourceInstanceObjectRecordV1 {
    pub schema_version: u64,
    pub attrs_json: Vec<u8>,
    /// Lifecycle status, `"ready"` or `"tainted"`.
    pub status: String,
    pub provider_config_addr: String,
    pub create_before_destroy: bool,
    pub private: Option<Vec<u8>>,
    pub identity_schema_version: u64,
    pub identity_json: Option<Vec<u8>>,
    /// Recorded but not yet interpreted; see [`decode_state`].
    pub sensitive_paths: Vec<String>,
    /// Display forms of config resource addresses.
    pub dependencies: Vec<String>,
}

/// Decode a persisted record set into stack state.
///
/// Fails as a whole on corruption (malformed keys, undecodable payloads,
/// unsupported status values, unparseable addresses) and on load-bearing
/// keys written by a newer version. Unrecognized keys with gentler
/// policies are skipped or remembered for deletion per their tag.
pub fn decode_state(records: &BTreeMap<String, Vec<u8>>) -> Result<StackState> {
    let mut state = StackState::new();

    for (raw_key, raw_record) in records {
        let key: StateKey = raw_key
            .parse()
            .with_context(|| format!("invalid tracking key {raw_key:?} in state"))?;

        if !key.recognized() {
            match key.unrecognized_handling() {
                UnrecognizedKeyHandling::FailIfUnrecognized => {
                    // Load-bearing keys cannot be ignored; this state needs
                    // a newer version of the software that wrote it.
                    bail!(
                        "state was created by a newer version (unrecognized tracking key {raw_key:?})"
                    );
                }
                UnrecognizedKeyHandling::PreserveIfUnrecognized => {
                    // The caller preserves any record we do not explicitly
                    // update or delete, so nothing to do here.
                    trace!(key = raw_key, "preserving unrecognized state key");
                }
                UnrecognizedKeyHandling::DiscardIfUnrecognized => {
                    trace!(key = raw_key, "discarding unrecognized state key");
                    state.mark_key_for_discard(key);
                }
            }
            continue;
        }

        match key {
            StateKey::ComponentInstance { addr } => {
                let _: ComponentInstanceRecordV1 = bincode::deserialize(raw_record)
                    .with_context(|| format!("invalid raw value for state key {raw_key:?}"))?;
                state.ensure_component_instance(addr);
            }
            StateKey::ResourceInstanceObject { addr } => {
                let record: ResourceInstanceObjectRecordV1 = bincode::deserialize(raw_record)
                    .with_context(|| format!("invalid raw value for state key {raw_key:?}"))?;

                let status: ObjectStatus = record
                    .status
                    .parse()
                    .map_err(|_| {
                        anyhow::anyhow!("unsupported status {status:?} for {addr}", status = record.status)
                    })?;

                let provider_config: AbsProviderConfig =
                    record.provider_config_addr.parse().map_err(|_| {
                        anyhow::anyhow!(
                            "provider configuration reference {reference:?} for {addr}",
                            reference = record.provider_config_addr
                        )
                    })?;

                if !record.sensitive_paths.is_empty() {
                    // Not interpreted yet; dropped on load. Revisit before
                    // anything starts writing sensitive paths in earnest.
                    trace!(addr = %addr, count = record.sensitive_paths.len(),
                        "ignoring sensitive paths in stored object");
                }

                let mut dependencies = Vec::with_capacity(record.dependencies.len());
                for raw_dep in &record.dependencies {
                    let dep: ConfigResource = raw_dep.parse().map_err(|_| {
                        anyhow::anyhow!("invalid dependency {raw_dep:?} for {addr}")
                    })?;
                    dependencies.push(dep);
                }

                state.add_resource_instance_object(
                    addr,
                    ResourceInstanceObjectRecord {
                        attrs_json: record.attrs_json,
                        status,
                        schema_version: record.schema_version,
                        identity_schema_version: record.identity_schema_version,
                        identity_json: record.identity_json,
                        private: record.private,
                        create_before_destroy: record.create_before_destroy,
                        dependencies,
                    },
                    provider_config,
                );
            }
            StateKey::Unrecognized { .. } => unreachable!("handled above"),
        }
    }

    Ok(state)
}

/// Encode stack state back into a record set.
///
/// A `Some` payload is a record to write; a `None` payload is an explicit
/// deletion, emitted for every key the decode pass marked for discard.
pub fn encode_state(state: &StackState) -> Result<BTreeMap<String, Option<Vec<u8>>>> {
    let mut records: BTreeMap<String, Option<Vec<u8>>> = BTreeMap::new();

    for addr in state.component_instances().keys() {
        let key = StateKey::ComponentInstance { addr: addr.clone() };
        let payload = bincode::serialize(&ComponentInstanceRecordV1 {})
            .with_context(|| format!("failed to encode record for {addr}"))?;
        records.insert(key.to_string(), Some(payload));
    }

    for (addr, object) in state.resource_instance_objects() {
        let key = StateKey::ResourceInstanceObject { addr: addr.clone() };
        let record = &object.record;
        let payload = bincode::serialize(&ResourceInstanceObjectRecordV1 {
            schema_version: record.schema_version,
            attrs_json: record.attrs_json.clone(),
            status: record.status.as_str().to_string(),
            provider_config_addr: object.provider_config.to_string(),
            create_before_destroy: record.create_before_destroy,
            private: record.private.clone(),
            identity_schema_version: record.identity_schema_version,
            identity_json: record.identity_json.clone(),
            sensitive_paths: Vec::new(),
            dependencies: record
                .dependencies
                .iter()
                .map(ToString::to_string)
                .collect(),
        })
        .with_context(|| format!("failed to encode record for {addr}"))?;
        records.insert(key.to_string(), Some(payload));
    }

    for key in state.discard_unsupported_keys() {
        records.insert(key.to_string(), None);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrace_types::Provider;

    fn object_record_bytes(status: &str, deps: Vec<String>) -> Vec<u8> {
        bincode::serialize(&ResourceInstanceObjectRecordV1 {
            schema_version: 0,
            attrs_json: br#"{"id":"foo","value":"hello"}"#.to_vec(),
            status: status.to_string(),
            provider_config_addr: "provider[\"builtin/testing\"]".to_string(),
            create_before_destroy: false,
            private: None,
            identity_schema_version: 0,
            identity_json: None,
            sensitive_paths: Vec::new(),
            dependencies: deps,
        })
        .unwrap()
    }

    fn component_record_bytes() -> Vec<u8> {
        bincode::serialize(&ComponentInstanceRecordV1 {}).unwrap()
    }

    #[test]
    fn test_decode_builds_state_tree() {
        let records = BTreeMap::from([
            ("CMPT:component.self".to_string(), component_record_bytes()),
            (
                "RSRC:component.self:testing_resource.data".to_string(),
                object_record_bytes("ready", vec!["testing_resource.base".to_string()]),
            ),
        ]);

        let state = decode_state(&records).unwrap();
        assert_eq!(state.component_instances().len(), 1);
        assert_eq!(state.resource_instance_objects().len(), 1);

        let (addr, object) = state.resource_instance_objects().iter().next().unwrap();
        assert_eq!(addr.to_string(), "component.self.testing_resource.data");
        assert_eq!(object.record.status, ObjectStatus::Ready);
        assert_eq!(
            object.provider_config,
            AbsProviderConfig::default_root(Provider::builtin("testing"))
        );
        assert_eq!(object.record.dependencies.len(), 1);
        assert_eq!(
            object.record.dependencies[0].to_string(),
            "testing_resource.base"
        );
    }

    #[test]
    fn test_decode_rejects_malformed_key() {
        let records = BTreeMap::from([("not a key".to_string(), Vec::new())]);
        let err = decode_state(&records).unwrap_err();
        assert!(format!("{err:#}").contains("invalid tracking key"));
    }

    #[test]
    fn test_decode_rejects_unsupported_status() {
        let records = BTreeMap::from([(
            "RSRC:component.self:testing_resource.data".to_string(),
            object_record_bytes("deposed", Vec::new()),
        )]);
        let err = decode_state(&records).unwrap_err();
        assert!(err.to_string().contains("unsupported status \"deposed\""));
    }

    #[test]
    fn test_decode_rejects_invalid_dependency() {
        let records = BTreeMap::from([(
            "RSRC:component.self:testing_resource.data".to_string(),
            object_record_bytes("ready", vec!["testing_resource.base[0]".to_string()]),
        )]);
        let err = decode_state(&records).unwrap_err();
        assert!(err
            .to_string()
            .contains("invalid dependency \"testing_resource.base[0]\""));
    }

    #[test]
    fn test_fail_if_unrecognized_aborts_load() {
        let records = BTreeMap::from([("WIDGET:anything".to_string(), vec![1, 2, 3])]);
        let err = decode_state(&records).unwrap_err();
        assert!(err.to_string().contains("created by a newer version"));
    }

    #[test]
    fn test_preserve_if_unrecognized_skips_quietly() {
        let records = BTreeMap::from([
            ("NOTE-:anything".to_string(), vec![1, 2, 3]),
            ("CMPT:component.self".to_string(), component_record_bytes()),
        ]);
        let state = decode_state(&records).unwrap();
        assert_eq!(state.component_instances().len(), 1);
        assert!(state.discard_unsupported_keys().is_empty());
    }

    #[test]
    fn test_discard_if_unrecognized_emits_deletion_on_save() {
        let records = BTreeMap::from([
            ("HINT.:anything".to_string(), vec![1, 2, 3]),
            ("CMPT:component.self".to_string(), component_record_bytes()),
        ]);
        let state = decode_state(&records).unwrap();
        assert_eq!(state.discard_unsupported_keys().len(), 1);

        let saved = encode_state(&state).unwrap();
        assert_eq!(saved.get("HINT.:anything"), Some(&None));
        assert!(saved.get("CMPT:component.self").unwrap().is_some());
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let records = BTreeMap::from([
            ("CMPT:component.self".to_string(), component_record_bytes()),
            (
                "RSRC:component.self:testing_resource.data".to_string(),
                object_record_bytes("tainted", Vec::new()),
            ),
            (
                "RSRC:component.self:testing_resource.data:deadbeef".to_string(),
                object_record_bytes("ready", Vec::new()),
            ),
        ]);

        let state = decode_state(&records).unwrap();
        let saved = encode_state(&state).unwrap();
        assert_eq!(saved.len(), 3);

        let reloaded: BTreeMap<String, Vec<u8>> = saved
            .into_iter()
            .map(|(k, v)| (k, v.unwrap()))
            .collect();
        let state2 = decode_state(&reloaded).unwrap();
        assert_eq!(
            state.resource_instance_objects(),
            state2.resource_instance_objects()
        );
    }

    // Sensitive-path handling is a known gap: values decode but are
    // deliberately dropped rather than masked. This pins the gap.
    #[test]
    fn test_sensitive_paths_are_ignored() {
        let payload = bincode::serialize(&ResourceInstanceObjectRecordV1 {
            attrs_json: b"{}".to_vec(),
            status: "ready".to_string(),
            provider_config_addr: "provider[\"builtin/testing\"]".to_string(),
            sensitive_paths: vec!["value".to_string()],
            ..Default::default()
        })
        .unwrap();
        let records = BTreeMap::from([(
            "RSRC:component.self:testing_resource.data".to_string(),
            payload,
        )]);

        let state = decode_state(&records).unwrap();
        let object = state.resource_instance_objects().values().next().unwrap();
        assert_eq!(object.record.attrs_json, b"{}".to_vec());
    }
}
