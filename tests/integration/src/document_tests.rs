//! Document tests
//!
//! Drive the engine the way an extension host does: manifests and
//! fragments arrive as TOML or JSON text.

use ext_core::{Error, SchemaStatus, ViolationKind};
use ext_schema::{Namespace, SchemaFragment};
use ext_test_utils::{TestCore, fragments, v};
use pretty_assertions::assert_eq;
use serde_json::json;

const MANIFEST_TOML: &str = r#"
[extension]
id = "reporting"
version = "1.0.0"
permissions = ["schema:extend", "data:read"]
"#;

const MANIFEST_JSON: &str = r#"{
  "extension": { "id": "reporting", "version": "1.0.0", "permissions": ["schema:extend", "data:read"] }
}"#;

const FRAGMENT_JSON: &str = r#"{
  "enums": [{ "name": "status", "values": ["draft", "published"] }],
  "entities": [{
    "name": "reports",
    "fields": [
      { "name": "title", "type": "string", "required": true, "max_length": 200 },
      { "name": "status", "type": "enum", "enum": "status", "default": "draft" },
      { "name": "owner_id", "type": "string" }
    ]
  }],
  "relationships": [{
    "name": "report_owner",
    "source": "reports.owner_id",
    "target": "core.users.id",
    "on_delete": "restrict"
  }]
}"#;

#[test]
fn toml_and_json_fragments_are_the_same_schema() {
    let from_toml = SchemaFragment::from_toml(fragments::REPORTING_V1_TOML).unwrap();
    let from_json = SchemaFragment::from_json(FRAGMENT_JSON).unwrap();
    assert_eq!(from_toml, from_json);
    assert_eq!(from_toml.fingerprint(), from_json.fingerprint());
    assert_eq!(from_toml, fragments::reporting_v1());
}

#[test]
fn v3_document_matches_the_built_fragment() {
    let parsed = SchemaFragment::from_toml(fragments::REPORTING_V3_TOML).unwrap();
    assert_eq!(parsed, fragments::reporting_v3());
}

#[test]
fn lifecycle_from_documents() {
    let core = TestCore::in_memory();

    let submitted = core.submit_manifest("reporting", MANIFEST_TOML).unwrap();
    assert!(submitted.valid, "{:?}", submitted.errors);

    let registration = core
        .register_schema("reporting", &v("1.0.0"), fragments::REPORTING_V1_TOML)
        .unwrap();
    assert_eq!(registration.status, SchemaStatus::Candidate);

    let plan = core.generate_migration_plan("reporting", None, &v("1.0.0")).unwrap();
    assert!(!core.validate_migration_safety(&plan).blocked_without_confirmation);
    core.execute_migration(&plan, false, None).unwrap();

    let active = core.get_active_schema("reporting").unwrap().unwrap();
    assert_eq!(active, fragments::reporting_v1());

    let reporting = Namespace::new("reporting").unwrap();
    let ok = core
        .validate_entity_data(&reporting, "reports", &json!({"title": "Q1 revenue"}))
        .unwrap();
    assert!(ok.valid, "{:?}", ok.errors);
}

#[test]
fn json_and_toml_manifests_are_the_same_submission() {
    let core = TestCore::in_memory();
    assert!(core.submit_manifest("reporting", MANIFEST_TOML).unwrap().valid);

    // Identical content in the other encoding is a no-op.
    let again = core.submit_manifest("reporting", MANIFEST_JSON).unwrap();
    assert!(again.valid, "{:?}", again.errors);
    assert!(core.get_schema_history("reporting").unwrap().is_empty());
}

#[test]
fn changed_manifest_for_a_known_version_is_rejected() {
    let core = TestCore::in_memory();
    assert!(core.submit_manifest("reporting", MANIFEST_TOML).unwrap().valid);

    let changed = MANIFEST_TOML.replace("\"data:read\"", "\"data:write\"");
    let result = core.submit_manifest("reporting", &changed).unwrap();
    assert!(!result.valid);
    assert_eq!(result.errors[0].path, "extension.version");
}

#[test]
fn manifest_problems_are_collected_together() {
    let core = TestCore::in_memory();
    let document = r#"
[extension]
id = "Bad Id"
version = "one"
namespace = "core"
permissions = ["root:everything"]

[dependencies]
"base-metrics" = "not a range"
"#;

    let result = core.submit_manifest("reporting", document).unwrap();
    assert!(!result.valid);
    assert!(result.errors.iter().all(|e| e.kind == ViolationKind::Manifest));

    let paths: Vec<&str> = result.errors.iter().map(|e| e.path.as_str()).collect();
    for expected in [
        "extension.id",
        "extension.version",
        "extension.namespace",
        "extension.permissions",
        "dependencies.base-metrics",
    ] {
        assert!(paths.contains(&expected), "missing {expected} in {paths:?}");
    }
    assert!(core.status().unwrap().is_empty());
}

#[test]
fn invalid_fragment_document_lists_every_violation() {
    let core = TestCore::in_memory();
    assert!(core.submit_manifest("reporting", MANIFEST_TOML).unwrap().valid);

    let document = r#"
[[entities]]
name = "reports"

[[entities.fields]]
name = "title"
type = "blob"

[[entities.fields]]
name = "state"
type = "enum"

[[relationships]]
name = "dangling"
source = "reports"
target = "core.users.id"
"#;
    let err = core.register_schema("reporting", &v("1.0.0"), document).unwrap_err();
    match err {
        Error::Schema(ext_schema::Error::InvalidFragment { violations }) => {
            assert!(violations.len() >= 3, "{violations:?}");
        }
        other => panic!("expected InvalidFragment, got {other:?}"),
    }
    assert!(core.get_schema_history("reporting").unwrap().is_empty());
}

#[test]
fn schema_without_a_manifest_is_rejected() {
    let core = TestCore::in_memory();
    let err = core
        .register_schema("reporting", &v("1.0.0"), fragments::REPORTING_V1_TOML)
        .unwrap_err();
    assert!(matches!(err, Error::Manifest(_)), "{err:?}");
}
