//! Reconciliation of stored resource identities against the provider.
//!
//! Runs once per resource instance object during a refresh-style read, in
//! two phases around the provider's read call:
//!
//! 1. Before the read, the stored identity is checked against the
//!    provider's current identity schema version and, when the schema has
//!    moved ahead, upgraded through the provider.
//! 2. After the read, the authoritative stored identity is compared for
//!    exact equality against the identity the provider reported alongside
//!    the fresh object. Divergence is a provider bug and fails loudly;
//!    refresh must never silently accept identity drift.
//!
//! Every error here is terminal for the single object being processed and
//! never retried; sibling objects are unaffected.

use anyhow::{anyhow, bail, Result};

use terrace_provider::{Provider, UpgradeResourceIdentityRequest};
use terrace_schema::IdentitySchema;
use terrace_types::Provider as ProviderAddr;

/// Phase one: validate the stored identity against the provider's current
/// schema, upgrading it through the provider when the schema version moved
/// ahead. Returns the authoritative stored identity, or `None` when no
/// identity was stored.
pub async fn upgrade_stored_identity(
    provider: &dyn Provider,
    type_name: &str,
    schema: &IdentitySchema,
    stored_version: u64,
    stored_identity_json: Option<&[u8]>,
) -> Result<Option<serde_json::Value>> {
    let stored_json = match stored_identity_json {
        Some(raw) if !raw.is_empty() => raw,
        // No previous identity; the freshly read one will be adopted as-is.
        _ => return Ok(None),
    };

    let current_version = schema.version;
    let stored_version = stored_version as i64;

    if current_version < stored_version {
        // A provider must never report an older schema version than data
        // already encoded against a newer one.
        bail!("identity schema version mismatch: got {stored_version}, want {current_version}");
    }

    if current_version == stored_version {
        let decoded = schema.decode(stored_json).map_err(|err| {
            anyhow!(
                "failed to decode identity schema: {err}. This is most likely a bug in the \
                 provider, which must not change the identity schema without updating the \
                 identity schema version"
            )
        })?;
        return Ok(Some(decoded));
    }

    // The schema moved ahead of the stored payload; only the provider knows
    // how to reshape it.
    let resp = provider
        .upgrade_resource_identity(UpgradeResourceIdentityRequest {
            type_name: type_name.to_string(),
            raw_identity_json: stored_json.to_vec(),
            from_version: stored_version,
            to_version: current_version,
        })
        .await;
    if let Some(err) = resp.diagnostics.to_error() {
        let msg = err.to_string();
        let msg = msg
            .strip_prefix("failed to upgrade resource identity: ")
            .unwrap_or(&msg);
        bail!("failed to upgrade resource identity: {msg}");
    }
    let upgraded = resp.upgraded_identity.ok_or_else(|| {
        anyhow!("failed to upgrade resource identity: provider returned no identity")
    })?;
    Ok(Some(upgraded))
}

/// Phase two: reconcile the authoritative stored identity against the one
/// the provider reported alongside the fresh read.
pub fn reconcile_identities(
    provider_addr: &ProviderAddr,
    resource_display: &str,
    stored: Option<serde_json::Value>,
    fresh: Option<&serde_json::Value>,
) -> Result<Option<serde_json::Value>> {
    match stored {
        // Nothing stored: adopt whatever the provider reported, unchanged.
        None => Ok(fresh.cloned()),
        Some(stored) => {
            if fresh == Some(&stored) {
                Ok(Some(stored))
            } else {
                bail!(
                    "provider produced different identity: provider {provider_addr:?} planned a \
                     different identity for {resource_display} during refresh. This is a bug in \
                     the provider, which should be reported in the provider's own issue tracker",
                    provider_addr = provider_addr.to_string()
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use terrace_schema::{AttrType, IdentityAttribute};
    use terrace_provider::testing::TestingProvider;
    use terrace_provider::UpgradeResourceIdentityResponse;
    use terrace_types::Diagnostic;

    fn schema_v(version: i64) -> IdentitySchema {
        IdentitySchema {
            version,
            attributes: BTreeMap::from([(
                "id".to_string(),
                IdentityAttribute::required_for_import(AttrType::String),
            )]),
        }
    }

    #[tokio::test]
    async fn test_no_stored_identity_adopts_fresh() {
        let provider = TestingProvider::new();
        let stored = upgrade_stored_identity(&provider, "testing_resource", &schema_v(0), 0, None)
            .await
            .unwrap();
        assert_eq!(stored, None);

        let fresh = json!({"id": "foo"});
        let result = reconcile_identities(
            &ProviderAddr::builtin("testing"),
            "testing_resource.data",
            stored,
            Some(&fresh),
        )
        .unwrap();
        assert_eq!(result, Some(fresh));
    }

    #[tokio::test]
    async fn test_version_regression_is_a_hard_error() {
        let provider = TestingProvider::new();
        let err = upgrade_stored_identity(
            &provider,
            "testing_resource",
            &schema_v(0),
            1,
            Some(br#"{"id": "foo"}"#),
        )
        .await
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "identity schema version mismatch: got 1, want 0"
        );
    }

    #[tokio::test]
    async fn test_undecodable_stored_identity_blames_provider() {
        let provider = TestingProvider::new();
        let err = upgrade_stored_identity(
            &provider,
            "testing_resource",
            &schema_v(0),
            0,
            Some(br#"{"arn": "foo"}"#),
        )
        .await
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("failed to decode identity schema: unsupported attribute \"arn\""));
        assert!(msg.contains("bug in the provider"));
    }

    #[tokio::test]
    async fn test_upgrade_invoked_when_schema_is_newer() {
        let provider = TestingProvider::new().with_upgrade_response(UpgradeResourceIdentityResponse {
            upgraded_identity: Some(json!({"id": "foo"})),
            diagnostics: Default::default(),
        });
        let stored = upgrade_stored_identity(
            &provider,
            "testing_resource",
            &schema_v(2),
            1,
            Some(br#"{"arn": "foo"}"#),
        )
        .await
        .unwrap();
        assert_eq!(stored, Some(json!({"id": "foo"})));
    }

    #[tokio::test]
    async fn test_upgrade_diagnostics_become_errors() {
        let mut resp = UpgradeResourceIdentityResponse::default();
        resp.diagnostics.push(Diagnostic::error(
            "failed to upgrade resource identity",
            "provider was unable to do so",
        ));
        let provider = TestingProvider::new().with_upgrade_response(resp);
        let err = upgrade_stored_identity(
            &provider,
            "testing_resource",
            &schema_v(2),
            1,
            Some(br#"{"id": "foo"}"#),
        )
        .await
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to upgrade resource identity: provider was unable to do so"
        );
    }

    #[test]
    fn test_identity_drift_is_a_provider_bug() {
        let err = reconcile_identities(
            &ProviderAddr::builtin("testing"),
            "testing_resource.data",
            Some(json!({"id": "foo"})),
            Some(&json!({"id": "bar"})),
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("provider produced different identity"));
        assert!(msg.contains("testing_resource.data"));
        assert!(msg.contains("\"builtin/testing\""));
    }

    #[test]
    fn test_matching_identities_reconcile() {
        let result = reconcile_identities(
            &ProviderAddr::builtin("testing"),
            "testing_resource.data",
            Some(json!({"id": "foo"})),
            Some(&json!({"id": "foo"})),
        )
        .unwrap();
        assert_eq!(result, Some(json!({"id": "foo"})));
    }
}
