//! Scenario tests
//!
//! End-to-end runs of the engine through its public operations, one
//! scenario per observable guarantee.

use ext_core::{Error, MigrationOutcome, NameSubtype, SchemaStatus};
use ext_manifest::DependencyNode;
use ext_schema::CascadePolicy;
use ext_test_utils::{ManifestBuilder, TestCore, fragments, v};
use pretty_assertions::assert_eq;

// =============================================================================
// Conflict detection
// =============================================================================

#[test]
fn independent_plugins_may_both_declare_reports() {
    let core = TestCore::in_memory();
    core.install(&ManifestBuilder::new("plugin_a", "1.0.0"), fragments::plain_reports());

    let registration = core.register(&ManifestBuilder::new("plugin_b", "1.0.0"), fragments::plain_reports());
    assert_eq!(registration.status, SchemaStatus::Candidate);
    assert!(registration.conflicts.is_empty());
}

#[test]
fn same_namespace_reports_is_exactly_one_table_conflict() {
    let core = TestCore::in_memory();
    core.install(&ManifestBuilder::new("plugin_a", "1.0.0"), fragments::plain_reports());

    let registration = core.register(
        &ManifestBuilder::new("plugin_a_fork", "1.0.0").namespace("plugin_a"),
        fragments::plain_reports(),
    );
    assert_eq!(registration.status, SchemaStatus::Pending);
    assert_eq!(registration.conflicts.names(NameSubtype::Table).count(), 1);
}

#[test]
fn exclusive_permissions_are_a_conflict() {
    let core = TestCore::in_memory();
    let registration = core.register(
        &ManifestBuilder::new("sandboxed", "1.0.0")
            .permission("sandboxed")
            .permission("network:outbound"),
        fragments::plain_reports(),
    );
    assert_eq!(registration.status, SchemaStatus::Pending);
    assert_eq!(registration.conflicts.len(), 1);
}

// =============================================================================
// Dependency resolution
// =============================================================================

#[test]
fn analytics_selects_base_metrics_1_2_0() {
    let core = TestCore::in_memory();
    core.submit(&ManifestBuilder::new("base-metrics", "1.2.0"));
    core.submit(&ManifestBuilder::new("base-metrics", "2.0.0"));
    core.submit(&ManifestBuilder::new("analytics", "1.0.0").depends_on("base-metrics", "^1.0.0"));

    let resolution = core.resolve_dependencies("analytics", &v("1.0.0")).unwrap();
    assert_eq!(resolution.selected.get("base-metrics"), Some(&v("1.2.0")));
    assert_eq!(
        resolution.install_order,
        vec![
            DependencyNode::new("base-metrics", v("1.2.0")),
            DependencyNode::new("analytics", v("1.0.0")),
        ]
    );

    let again = core.resolve_dependencies("analytics", &v("1.0.0")).unwrap();
    assert_eq!(resolution, again);
}

#[test]
fn mutual_dependency_reports_the_cycle() {
    let core = TestCore::in_memory();
    core.submit(&ManifestBuilder::new("alpha", "1.0.0").depends_on("beta", "^1.0.0"));
    core.submit(&ManifestBuilder::new("beta", "1.0.0").depends_on("alpha", "^1.0.0"));

    let err = core.resolve_dependencies("alpha", &v("1.0.0")).unwrap_err();
    match err {
        Error::CircularDependency { path } => {
            assert!(path.contains(&"alpha".to_string()), "{path:?}");
            assert!(path.contains(&"beta".to_string()), "{path:?}");
        }
        other => panic!("expected CircularDependency, got {other:?}"),
    }
}

#[test]
fn disjoint_ranges_are_unresolvable() {
    let core = TestCore::in_memory();
    core.submit(&ManifestBuilder::new("base-metrics", "1.2.0"));
    core.submit(&ManifestBuilder::new("base-metrics", "2.0.0"));
    core.submit(&ManifestBuilder::new("charts", "1.0.0").depends_on("base-metrics", "^2.0.0"));
    core.submit(
        &ManifestBuilder::new("analytics", "1.0.0")
            .depends_on("base-metrics", "^1.0.0")
            .depends_on("charts", "^1.0.0"),
    );

    let err = core.resolve_dependencies("analytics", &v("1.0.0")).unwrap_err();
    match err {
        Error::UnresolvableDependency {
            extension, constraints, ..
        } => {
            assert_eq!(extension, "base-metrics");
            assert_eq!(constraints.len(), 2);
        }
        other => panic!("expected UnresolvableDependency, got {other:?}"),
    }
}

// =============================================================================
// Migration
// =============================================================================

#[test]
fn full_lifecycle_with_dependencies() {
    let core = TestCore::in_memory();
    core.install(&ManifestBuilder::new("base-metrics", "1.2.0"), fragments::base_metrics());
    let analytics = ManifestBuilder::new("analytics", "1.0.0").depends_on("base-metrics", "^1.0.0");
    let record = core.install(&analytics, fragments::analytics(CascadePolicy::SetNull));

    assert_eq!(record.outcome, MigrationOutcome::Applied);
    assert_eq!(record.from_version, None);
    assert_eq!(record.executed_operations, vec![
        "add_entity dashboards".to_string(),
        "add_relationship dashboard_metric".to_string(),
    ]);

    let shape = core.store_shape().unwrap();
    let relationship = &shape.relationships["analytics.dashboard_metric"];
    assert_eq!(relationship.target_namespace, "base_metrics");
    assert_eq!(relationship.on_delete, "set_null");
}

#[test]
fn upgrade_matches_fresh_install_across_three_versions() {
    let upgraded = TestCore::in_memory();
    upgraded.install(&ManifestBuilder::new("reporting", "1.0.0"), fragments::reporting_v1());
    upgraded.install(&ManifestBuilder::new("reporting", "2.0.0"), fragments::reporting_v2());
    upgraded.install(&ManifestBuilder::new("reporting", "3.0.0"), fragments::reporting_v3());

    let fresh = TestCore::in_memory();
    fresh.install(&ManifestBuilder::new("reporting", "3.0.0"), fragments::reporting_v3());

    assert_eq!(upgraded.store_shape().unwrap(), fresh.store_shape().unwrap());
    assert_eq!(upgraded.migration_log(Some("reporting")).unwrap().len(), 3);
}

#[test]
fn unconfirmed_destructive_plan_leaves_no_trace() {
    let core = TestCore::in_memory();
    core.install(&ManifestBuilder::new("reporting", "2.0.0"), fragments::reporting_v2());
    let before = core.store_shape().unwrap();

    let v3 = ManifestBuilder::new("reporting", "3.0.0");
    core.register(&v3, fragments::reporting_v3());
    let plan = core.plan(&v3);
    let err = core.execute_migration(&plan, false, None).unwrap_err();

    assert!(matches!(err, Error::UnsafeMigration { .. }), "{err:?}");
    assert_eq!(core.store_shape().unwrap(), before);
    assert_eq!(core.migration_log(None).unwrap().len(), 1);
}

#[test]
fn namespace_cannot_change_between_versions() {
    let core = TestCore::in_memory();
    core.install(&ManifestBuilder::new("reporting", "1.0.0"), fragments::reporting_v1());
    core.register(
        &ManifestBuilder::new("reporting", "2.0.0").namespace("reports_v2"),
        fragments::reporting_v2(),
    );

    let err = core
        .generate_migration_plan("reporting", Some(&v("1.0.0")), &v("2.0.0"))
        .unwrap_err();
    assert!(matches!(err, Error::NamespaceMismatch { .. }), "{err:?}");
}
