//! End-to-end migration scenarios against the in-memory testing provider.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use terrace_migrate::{collect_migration_output, ComponentConfig, Migration, StackConfig};
use terrace_provider::testing::{CallCounters, TestingProvider};
use terrace_provider::{
    ProviderFactory, ReadResourceResponse, SchemaCaches, UpgradeResourceIdentityResponse,
};
use terrace_schema::{AttrType, IdentityAttribute, IdentitySchema};
use terrace_state::{
    AppliedChange, AppliedChangeComponentInstance, AppliedChangeResourceInstanceObject,
    ObjectStatus, ResourceInstanceObjectRecord, State,
};
use terrace_types::{
    AbsProviderConfig, ComponentAddr, Diagnostic, DeposedKey, InstanceKey, ModuleInstanceAddr,
    Provider, Resource, StackAddr, Value,
};

const ATTRS: &[u8] = br#"{"id":"foo","value":"hello"}"#;

fn provider_config() -> AbsProviderConfig {
    AbsProviderConfig::default_root(Provider::builtin("testing"))
}

fn factory_for(template: TestingProvider) -> (ProviderFactory, Arc<CallCounters>) {
    let counters = Arc::new(CallCounters::default());
    let template = Arc::new(template.with_counters(counters.clone()));
    let factory: ProviderFactory = Arc::new(move || Ok(Box::new((*template).clone())));
    (factory, counters)
}

fn migration(state: State, config: StackConfig, template: TestingProvider) -> (Migration, Arc<CallCounters>) {
    let (factory, counters) = factory_for(template);
    let mig = Migration {
        providers: HashMap::from([(Provider::builtin("testing"), factory)]),
        previous_state: state,
        config,
        caches: Arc::new(SchemaCaches::new()),
    };
    (mig, counters)
}

/// The configuration shape of the single-component fixtures: one component
/// whose module declares `id` and `input` variables and no outputs.
fn single_component_config(name: &str) -> StackConfig {
    StackConfig::new().with_component(
        ComponentAddr::root(name),
        ComponentConfig::new(["id", "input"], []),
    )
}

fn set_current(state: &mut State, name: &str, key: InstanceKey) {
    state.root_module().set_resource_instance_current(
        Resource::managed("testing_resource", name).instance(key),
        Some(ResourceInstanceObjectRecord::ready(ATTRS.to_vec())),
        provider_config(),
    );
}

async fn run(
    mig: &Migration,
    resources: HashMap<String, String>,
    modules: HashMap<String, String>,
) -> (
    Vec<AppliedChangeResourceInstanceObject>,
    Vec<AppliedChangeComponentInstance>,
    Vec<Diagnostic>,
) {
    let mut resource_changes = Vec::new();
    let mut component_changes = Vec::new();
    let mut diags = Vec::new();
    mig.migrate(
        &resources,
        &modules,
        |change| match change {
            AppliedChange::ResourceInstanceObject(change) => resource_changes.push(change),
            AppliedChange::ComponentInstance(change) => component_changes.push(change),
        },
        |diag| diags.push(diag),
    )
    .await;
    (resource_changes, component_changes, diags)
}

fn unknown_inputs() -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("id".to_string(), Value::Unknown),
        ("input".to_string(), Value::Unknown),
    ])
}

#[tokio::test]
async fn migrate_via_module_mapping() {
    let mut state = State::new();
    set_current(&mut state, "data", InstanceKey::None);
    state.root_module().set_resource_instance_deposed(
        Resource::managed("testing_resource", "data").instance(InstanceKey::None),
        DeposedKey::generate(),
        ResourceInstanceObjectRecord::ready(ATTRS.to_vec()),
        provider_config(),
    );

    let (mig, _) = migration(state, single_component_config("self"), TestingProvider::new());
    let (resource_changes, component_changes, diags) = run(
        &mig,
        HashMap::new(),
        HashMap::from([(String::new(), "self".to_string())]),
    )
    .await;

    assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");

    // Current and deposed objects both migrate, sharing a destination
    // address but keeping distinct deposed keys.
    assert_eq!(resource_changes.len(), 2);
    let mut deposed_keys = Vec::new();
    for change in &resource_changes {
        assert_eq!(
            change.addr.component.to_string() + "." + &change.addr.item.resource_instance.to_string(),
            "component.self.testing_resource.data"
        );
        let record = change.new_record.as_ref().expect("record should survive");
        assert_eq!(record.attrs_json, ATTRS.to_vec());
        assert_eq!(record.status, ObjectStatus::Ready);
        assert_eq!(record.private, None);
        assert_eq!(change.provider_config_addr, provider_config());
        deposed_keys.push(change.addr.item.deposed.clone());
    }
    deposed_keys.sort();
    deposed_keys.dedup();
    assert_eq!(deposed_keys.len(), 2, "deposed keys must stay distinct");
    assert!(deposed_keys.contains(&None));

    assert_eq!(component_changes.len(), 1);
    let component = &component_changes[0];
    assert_eq!(component.component_addr, ComponentAddr::root("self"));
    assert_eq!(component.instance_addr.to_string(), "component.self");
    assert!(component.output_values.is_empty());
    assert_eq!(component.input_variables, unknown_inputs());
    assert!(component.dependencies.is_empty());
    assert!(component.dependents.is_empty());
}

#[tokio::test]
async fn migrate_via_resource_mapping() {
    let mut state = State::new();
    set_current(&mut state, "data", InstanceKey::None);

    let (mig, _) = migration(state, single_component_config("self"), TestingProvider::new());
    let (resource_changes, component_changes, diags) = run(
        &mig,
        HashMap::from([("testing_resource.data".to_string(), "self".to_string())]),
        HashMap::new(),
    )
    .await;

    assert!(diags.is_empty());
    assert_eq!(resource_changes.len(), 1);
    assert_eq!(
        resource_changes[0].addr.to_string(),
        "component.self.testing_resource.data"
    );
    assert_eq!(component_changes.len(), 1);
}

#[tokio::test]
async fn migrate_builds_component_dependencies() {
    let mut state = State::new();
    set_current(&mut state, "data", InstanceKey::None);
    set_current(&mut state, "another", InstanceKey::Int(0));
    set_current(&mut state, "another", InstanceKey::Int(1));

    let parent = ComponentAddr::root("parent");
    let child = ComponentAddr::root("child");
    let config = StackConfig::new()
        .with_component(parent.clone(), ComponentConfig::new(["id", "input"], ["id"]))
        .with_component(
            child.clone(),
            ComponentConfig::new(["id", "input"], ["id"]).with_reference(parent.clone()),
        );

    let (mig, _) = migration(state, config, TestingProvider::new());
    let (resource_changes, component_changes, diags) = run(
        &mig,
        HashMap::from([
            ("testing_resource.data".to_string(), "parent".to_string()),
            ("testing_resource.another".to_string(), "child".to_string()),
        ]),
        HashMap::new(),
    )
    .await;

    assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");

    let mut addrs: Vec<String> = resource_changes.iter().map(|c| c.addr.to_string()).collect();
    addrs.sort();
    assert_eq!(
        addrs,
        vec![
            "component.child.testing_resource.another[0]",
            "component.child.testing_resource.another[1]",
            "component.parent.testing_resource.data",
        ]
    );

    assert_eq!(component_changes.len(), 2);
    let by_addr: BTreeMap<String, &AppliedChangeComponentInstance> = component_changes
        .iter()
        .map(|c| (c.component_addr.to_string(), c))
        .collect();

    let parent_change = by_addr["component.parent"];
    assert_eq!(parent_change.dependents.iter().collect::<Vec<_>>(), vec![&child]);
    assert!(parent_change.dependencies.is_empty());
    assert_eq!(
        parent_change.output_values,
        BTreeMap::from([("id".to_string(), Value::Unknown)])
    );
    assert_eq!(parent_change.input_variables, unknown_inputs());

    let child_change = by_addr["component.child"];
    assert_eq!(child_change.dependencies.iter().collect::<Vec<_>>(), vec![&parent]);
    assert!(child_change.dependents.is_empty());
}

#[tokio::test]
async fn migrate_nested_module_resources() {
    let mut state = State::new();
    set_current(&mut state, "data", InstanceKey::None);
    set_current(&mut state, "another", InstanceKey::Int(0));
    set_current(&mut state, "another", InstanceKey::Int(1));
    let child_module = state.ensure_module(
        ModuleInstanceAddr::root().child("child_mod", InstanceKey::None),
    );
    for (name, key) in [
        ("child_data", InstanceKey::None),
        ("another_child_data", InstanceKey::Int(0)),
        ("another_child_data", InstanceKey::Int(1)),
    ] {
        child_module.set_resource_instance_current(
            Resource::managed("testing_resource", name).instance(key),
            Some(ResourceInstanceObjectRecord::ready(ATTRS.to_vec())),
            provider_config(),
        );
    }

    let parent = ComponentAddr::root("parent");
    let child = ComponentAddr::root("child");
    let config = StackConfig::new()
        .with_component(parent.clone(), ComponentConfig::new(["id", "input"], ["id"]))
        .with_component(
            child.clone(),
            ComponentConfig::new(["id", "input"], ["id"]).with_reference(parent.clone()),
        );

    let (mig, _) = migration(state, config, TestingProvider::new());
    let (resource_changes, component_changes, diags) = run(
        &mig,
        HashMap::from([
            ("testing_resource.data".to_string(), "parent".to_string()),
            ("testing_resource.another".to_string(), "parent".to_string()),
        ]),
        HashMap::from([("child_mod".to_string(), "child".to_string())]),
    )
    .await;

    assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");

    let mut addrs: Vec<String> = resource_changes.iter().map(|c| c.addr.to_string()).collect();
    addrs.sort();
    assert_eq!(
        addrs,
        vec![
            "component.child.testing_resource.another_child_data[0]",
            "component.child.testing_resource.another_child_data[1]",
            "component.child.testing_resource.child_data",
            "component.parent.testing_resource.another[0]",
            "component.parent.testing_resource.another[1]",
            "component.parent.testing_resource.data",
        ]
    );

    let by_addr: BTreeMap<String, &AppliedChangeComponentInstance> = component_changes
        .iter()
        .map(|c| (c.component_addr.to_string(), c))
        .collect();
    assert!(by_addr["component.parent"].dependents.contains(&child));
    assert!(by_addr["component.child"].dependencies.contains(&parent));
}

#[tokio::test]
async fn migrate_depends_on_and_embedded_stacks() {
    let mut state = State::new();
    set_current(&mut state, "data", InstanceKey::None);
    set_current(&mut state, "second", InstanceKey::None);
    set_current(&mut state, "third", InstanceKey::None);

    let first = ComponentAddr::root("first");
    let second = ComponentAddr::root("second");
    let embedded_self = ComponentAddr {
        stack: StackAddr(vec!["embedded".to_string()]),
        name: "self".to_string(),
    };
    let config = StackConfig::new()
        .with_component(first.clone(), ComponentConfig::new(["id", "input"], []))
        .with_component(
            second.clone(),
            ComponentConfig::new(["id", "input"], [])
                .with_depends_on(first.clone())
                .with_depends_on(embedded_self.clone()),
        )
        .with_component(embedded_self.clone(), ComponentConfig::new(["id", "input"], []));

    let (mig, _) = migration(state, config, TestingProvider::new());
    let (resource_changes, component_changes, diags) = run(
        &mig,
        HashMap::from([
            ("testing_resource.data".to_string(), "component.first".to_string()),
            ("testing_resource.second".to_string(), "component.second".to_string()),
            (
                "testing_resource.third".to_string(),
                "stack.embedded.component.self".to_string(),
            ),
        ]),
        HashMap::new(),
    )
    .await;

    assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");

    let mut addrs: Vec<String> = resource_changes.iter().map(|c| c.addr.to_string()).collect();
    addrs.sort();
    assert_eq!(
        addrs,
        vec![
            "component.first.testing_resource.data",
            "component.second.testing_resource.second",
            "stack.embedded.component.self.testing_resource.third",
        ]
    );

    let by_addr: BTreeMap<String, &AppliedChangeComponentInstance> = component_changes
        .iter()
        .map(|c| (c.component_addr.to_string(), c))
        .collect();

    assert_eq!(
        by_addr["component.first"].dependents.iter().collect::<Vec<_>>(),
        vec![&second]
    );
    assert_eq!(
        by_addr["component.second"].dependencies,
        [first.clone(), embedded_self.clone()].into_iter().collect()
    );
    assert_eq!(
        by_addr["stack.embedded.component.self"]
            .dependents
            .iter()
            .collect::<Vec<_>>(),
        vec![&second]
    );
}

#[tokio::test]
async fn unmapped_resource_aborts_the_run() {
    let mut state = State::new();
    set_current(&mut state, "data", InstanceKey::None);

    let (mig, _) = migration(state, single_component_config("self"), TestingProvider::new());
    let (resource_changes, component_changes, diags) =
        run(&mig, HashMap::new(), HashMap::new()).await;

    assert!(resource_changes.is_empty());
    assert!(component_changes.is_empty());
    assert_eq!(diags.len(), 1);
    assert!(diags[0]
        .summary
        .contains("no destination component for resource testing_resource.data"));
}

#[tokio::test]
async fn unresolved_component_reference_aborts_the_run() {
    let mut state = State::new();
    set_current(&mut state, "data", InstanceKey::None);

    let config = StackConfig::new().with_component(
        ComponentAddr::root("self"),
        ComponentConfig::new(["id", "input"], [])
            .with_reference(ComponentAddr::root("ghost")),
    );
    let (mig, _) = migration(state, config, TestingProvider::new());
    let (resource_changes, component_changes, diags) = run(
        &mig,
        HashMap::from([("testing_resource.data".to_string(), "self".to_string())]),
        HashMap::new(),
    )
    .await;

    assert!(resource_changes.is_empty());
    assert!(component_changes.is_empty());
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].summary, "reference to undeclared component");
}

// ==================== Identity reconciliation ====================

fn identity_schema_v(version: i64) -> IdentitySchema {
    IdentitySchema {
        version,
        attributes: BTreeMap::from([(
            "id".to_string(),
            IdentityAttribute::required_for_import(AttrType::String),
        )]),
    }
}

fn state_with_identity(version: u64, identity_json: &[u8]) -> State {
    let mut state = State::new();
    state.root_module().set_resource_instance_current(
        Resource::managed("testing_resource", "data").instance(InstanceKey::None),
        Some(
            ResourceInstanceObjectRecord::ready(ATTRS.to_vec())
                .with_identity(version, identity_json.to_vec()),
        ),
        provider_config(),
    );
    state
}

fn self_mapping() -> HashMap<String, String> {
    HashMap::from([("testing_resource.data".to_string(), "self".to_string())])
}

#[tokio::test]
async fn identity_missing_adopts_the_fresh_one() {
    let mut state = State::new();
    set_current(&mut state, "data", InstanceKey::None);
    let provider = TestingProvider::new()
        .with_read_identity("testing_resource", serde_json::json!({"id": "foo"}));

    let (mig, counters) = migration(state, single_component_config("self"), provider);
    let (resource_changes, _, diags) = run(&mig, self_mapping(), HashMap::new()).await;

    assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
    assert_eq!(resource_changes.len(), 1);
    let record = resource_changes[0].new_record.as_ref().unwrap();
    assert_eq!(
        record.identity_json.as_deref(),
        Some(br#"{"id":"foo"}"#.as_slice())
    );
    assert_eq!(record.identity_schema_version, 0);
    assert_eq!(counters.upgrade(), 0);
    assert_eq!(counters.read(), 1);
}

#[tokio::test]
async fn identity_version_regression_fails_before_reading() {
    let state = state_with_identity(1, br#"{"id": "foo"}"#);
    let provider = TestingProvider::new()
        .with_read_identity("testing_resource", serde_json::json!({"id": "foo"}));

    let (mig, counters) = migration(state, single_component_config("self"), provider);
    let (resource_changes, component_changes, diags) =
        run(&mig, self_mapping(), HashMap::new()).await;

    assert!(resource_changes.is_empty());
    assert_eq!(diags.len(), 1);
    assert!(diags[0]
        .summary
        .contains("identity schema version mismatch: got 1, want 0"));
    assert_eq!(counters.upgrade(), 0);
    assert_eq!(counters.read(), 0);
    // One broken object never aborts its component.
    assert_eq!(component_changes.len(), 1);
}

#[tokio::test]
async fn identity_decode_failure_blames_the_provider() {
    let state = state_with_identity(0, br#"{"arn": "foo"}"#);
    let provider = TestingProvider::new()
        .with_read_identity("testing_resource", serde_json::json!({"id": "foo"}));

    let (mig, _) = migration(state, single_component_config("self"), provider);
    let (resource_changes, _, diags) = run(&mig, self_mapping(), HashMap::new()).await;

    assert!(resource_changes.is_empty());
    assert_eq!(diags.len(), 1);
    assert!(diags[0]
        .summary
        .contains("failed to decode identity schema: unsupported attribute \"arn\""));
    assert!(diags[0].summary.contains("bug in the provider"));
}

#[tokio::test]
async fn identity_upgrade_roundtrip_succeeds() {
    let state = state_with_identity(1, br#"{"arn": "foo"}"#);
    let provider = TestingProvider::new()
        .with_identity_schema("testing_resource", identity_schema_v(2))
        .with_read_identity("testing_resource", serde_json::json!({"id": "foo"}))
        .with_upgrade_response(UpgradeResourceIdentityResponse {
            upgraded_identity: Some(serde_json::json!({"id": "foo"})),
            diagnostics: Default::default(),
        });

    let (mig, counters) = migration(state, single_component_config("self"), provider);
    let (resource_changes, _, diags) = run(&mig, self_mapping(), HashMap::new()).await;

    assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
    assert_eq!(counters.upgrade(), 1);
    let record = resource_changes[0].new_record.as_ref().unwrap();
    assert_eq!(record.identity_schema_version, 2);
    assert_eq!(
        record.identity_json.as_deref(),
        Some(br#"{"id":"foo"}"#.as_slice())
    );
}

#[tokio::test]
async fn identity_upgrade_failure_is_terminal_for_the_object() {
    let state = state_with_identity(1, br#"{"id": "foo"}"#);
    let mut upgrade = UpgradeResourceIdentityResponse::default();
    upgrade.diagnostics.push(Diagnostic::error(
        "failed to upgrade resource identity",
        "provider was unable to do so",
    ));
    let provider = TestingProvider::new()
        .with_identity_schema("testing_resource", identity_schema_v(2))
        .with_upgrade_response(upgrade);

    let (mig, counters) = migration(state, single_component_config("self"), provider);
    let (resource_changes, _, diags) = run(&mig, self_mapping(), HashMap::new()).await;

    assert!(resource_changes.is_empty());
    assert_eq!(counters.upgrade(), 1);
    assert_eq!(diags.len(), 1);
    assert!(diags[0]
        .summary
        .contains("failed to upgrade resource identity: provider was unable to do so"));
}

#[tokio::test]
async fn identity_drift_after_refresh_is_a_provider_bug() {
    let state = state_with_identity(0, br#"{"id": "foo"}"#);
    let provider = TestingProvider::new()
        .with_read_identity("testing_resource", serde_json::json!({"id": "bar"}));

    let (mig, _) = migration(state, single_component_config("self"), provider);
    let (resource_changes, _, diags) = run(&mig, self_mapping(), HashMap::new()).await;

    assert!(resource_changes.is_empty());
    assert_eq!(diags.len(), 1);
    assert!(diags[0].summary.contains("provider produced different identity"));
    assert!(diags[0].summary.contains("testing_resource.data"));
}

// ==================== Other engine behavior ====================

#[tokio::test]
async fn vanished_object_becomes_a_deletion_marker() {
    let mut state = State::new();
    set_current(&mut state, "data", InstanceKey::None);
    let provider = TestingProvider::new().with_read_response(ReadResourceResponse {
        new_attrs_json: None,
        identity: None,
        private: None,
        diagnostics: Default::default(),
    });

    let (mig, _) = migration(state, single_component_config("self"), provider);
    let (resource_changes, _, diags) = run(&mig, self_mapping(), HashMap::new()).await;

    assert!(diags.is_empty());
    assert_eq!(resource_changes.len(), 1);
    assert!(resource_changes[0].new_record.is_none());
}

#[tokio::test]
async fn streaming_migration_drains_both_channels() {
    let mut state = State::new();
    set_current(&mut state, "data", InstanceKey::None);

    let (mig, _) = migration(state, single_component_config("self"), TestingProvider::new());
    let (changes_rx, diags_rx) = mig.migrate_streaming(self_mapping(), HashMap::new());
    let (changes, diags) = collect_migration_output(changes_rx, diags_rx).await;

    assert!(diags.is_empty());
    assert_eq!(changes.len(), 2);
    assert!(matches!(changes[0], AppliedChange::ResourceInstanceObject(_)));
    assert!(matches!(changes[1], AppliedChange::ComponentInstance(_)));
}
