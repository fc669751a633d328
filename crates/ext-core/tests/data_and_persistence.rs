use std::thread;

use ext_core::{Error, MigrationOutcome, SchemaStatus, ViolationKind};
use ext_schema::{CascadePolicy, Namespace};
use ext_test_utils::{ManifestBuilder, TestCore, fragments, v};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;

fn metrics_ns() -> Namespace {
    Namespace::new("base_metrics").unwrap()
}

fn analytics_ns() -> Namespace {
    Namespace::new("analytics").unwrap()
}

/// base-metrics 1.0.0 and analytics 1.0.0 installed, one metric with one dashboard.
fn analytics_core(on_delete: CascadePolicy) -> (TestCore, String, String) {
    let core = TestCore::in_memory();
    core.install(&ManifestBuilder::new("base-metrics", "1.0.0"), fragments::base_metrics());
    core.install(
        &ManifestBuilder::new("analytics", "1.0.0").depends_on("base-metrics", "^1.0.0"),
        fragments::analytics(on_delete),
    );
    let metric = core
        .insert_record(&metrics_ns(), "metrics", &json!({"name": "cpu", "value": 0.5}))
        .unwrap();
    let dashboard = core
        .insert_record(&analytics_ns(), "dashboards", &json!({"label": "Load", "metric_id": metric}))
        .unwrap();
    (core, metric, dashboard)
}

#[test]
fn record_problems_are_collected_in_one_pass() {
    let (core, _, _) = analytics_core(CascadePolicy::Restrict);
    let result = core
        .validate_entity_data(
            &analytics_ns(),
            "dashboards",
            &json!({"metric_id": "missing", "colour": "red"}),
        )
        .unwrap();

    assert!(!result.valid);
    assert_eq!(result.of_kind(ViolationKind::ConstraintViolation).count(), 1);
    assert_eq!(result.of_kind(ViolationKind::UnknownField).count(), 1);
    let integrity: Vec<_> = result.of_kind(ViolationKind::RelationshipIntegrity).collect();
    assert_eq!(integrity.len(), 1);
    assert_eq!(integrity[0].path, "dashboards.metric_id");
}

#[test]
fn unique_field_rejects_duplicates_without_writing() {
    let (core, _, _) = analytics_core(CascadePolicy::Restrict);
    let err = core
        .insert_record(&metrics_ns(), "metrics", &json!({"name": "cpu"}))
        .unwrap_err();
    match err {
        Error::InvalidRecord { violations, .. } => {
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].path, "metrics.name");
        }
        other => panic!("expected InvalidRecord, got {other:?}"),
    }
    assert_eq!(core.count_records(&metrics_ns(), "metrics").unwrap(), 1);
}

#[rstest]
#[case::cascade(CascadePolicy::Cascade, 0, 0)]
#[case::set_null(CascadePolicy::SetNull, 1, 1)]
#[case::no_action(CascadePolicy::NoAction, 1, 0)]
fn delete_follows_the_cascade_policy(
    #[case] policy: CascadePolicy,
    #[case] dashboards_left: u64,
    #[case] nullified: usize,
) {
    let (core, metric, _) = analytics_core(policy);
    let outcome = core.delete_record(&metrics_ns(), "metrics", &metric).unwrap();

    assert_eq!(outcome.deleted[0], format!("base_metrics__metrics:{metric}"));
    assert_eq!(outcome.nullified, nullified);
    assert_eq!(core.count_records(&metrics_ns(), "metrics").unwrap(), 0);
    assert_eq!(core.count_records(&analytics_ns(), "dashboards").unwrap(), dashboards_left);
}

#[test]
fn restrict_keeps_both_rows() {
    let (core, metric, _) = analytics_core(CascadePolicy::Restrict);
    let err = core.delete_record(&metrics_ns(), "metrics", &metric).unwrap_err();
    assert!(matches!(err, Error::DeleteRestricted { referencing: 1, .. }), "{err:?}");
    assert_eq!(core.count_records(&metrics_ns(), "metrics").unwrap(), 1);
    assert_eq!(core.count_records(&analytics_ns(), "dashboards").unwrap(), 1);
}

#[test]
fn deleting_a_missing_record_fails() {
    let (core, _, _) = analytics_core(CascadePolicy::Cascade);
    let err = core.delete_record(&metrics_ns(), "metrics", "nope").unwrap_err();
    assert!(matches!(err, Error::RecordNotFound { .. }), "{err:?}");
}

#[test]
fn reopened_store_rehydrates_the_registry() {
    let core = TestCore::on_disk();
    let reporting = |version: &str| ManifestBuilder::new("reporting", version);
    core.install(&reporting("1.0.0"), fragments::reporting_v1());
    core.register(&reporting("2.0.0"), fragments::reporting_v2());
    core.insert_record(
        &Namespace::new("reporting").unwrap(),
        "reports",
        &json!({"title": "kept"}),
    )
    .unwrap();
    let shape = core.store_shape().unwrap();
    let plan = core.plan(&reporting("2.0.0"));

    let core = core.reopen();
    assert_eq!(core.store_shape().unwrap(), shape);
    assert_eq!(core.get_active_schema("reporting").unwrap(), Some(fragments::reporting_v1()));
    let history = core.get_schema_history("reporting").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].status, SchemaStatus::Candidate);
    let log = core.migration_log(None).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].outcome, MigrationOutcome::Applied);

    // The latest plan survives the restart and is still executable.
    core.execute_migration(&plan, false, None).unwrap();
    assert_eq!(
        core.snapshot().unwrap().active_of("reporting").unwrap().version,
        v("2.0.0")
    );
    assert_eq!(
        core.count_records(&Namespace::new("reporting").unwrap(), "reports")
            .unwrap(),
        1
    );
}

#[test]
fn installs_in_different_namespaces_run_concurrently() {
    let core = TestCore::in_memory();
    thread::scope(|scope| {
        for i in 0..8 {
            let core = &core;
            scope.spawn(move || {
                let manifest = ManifestBuilder::new(&format!("plugin-{i}"), "1.0.0");
                core.install(&manifest, fragments::plain_reports());
                core.get_active_schema(&format!("plugin-{i}")).unwrap()
            });
        }
    });

    let status = core.status().unwrap();
    assert_eq!(status.len(), 8);
    assert!(status.iter().all(|s| s.active == Some(v("1.0.0"))));
    assert_eq!(core.migration_log(None).unwrap().len(), 8);
}

#[test]
fn racing_plans_for_one_namespace_apply_once() {
    let core = TestCore::in_memory();
    core.install(&ManifestBuilder::new("reporting", "1.0.0"), fragments::reporting_v1());
    core.register(&ManifestBuilder::new("reporting", "2.0.0"), fragments::reporting_v2());
    let plan = core
        .generate_migration_plan("reporting", Some(&v("1.0.0")), &v("2.0.0"))
        .unwrap();

    let outcomes: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| core.execute_migration(&plan, true, None).is_ok()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    assert_eq!(core.migration_log(Some("reporting")).unwrap().len(), 2);
}
