//! End-to-end reconciliations against the built-in catalog
//!
//! Each test scripts the controller with a `MockTransport` and drives the
//! engine exactly as the CLI does, with virtual time for the poller.

use crate::catalog;
use declarative::{
    Action, DesiredState, Engine, ErrorKind, ManualClock, MemorySink, Method, MockTransport,
    REDACTED, ReconcileOptions, ReconcileRequest, TransportError,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

const CREDENTIALS: &str = "/dna/intent/api/v2/global-credential";
const SSIDS: &str = "/dna/intent/api/v1/enterprise-ssid";
const FABRIC_ZONES: &str = "/dna/intent/api/v1/sda/fabricZones";
const IMAGES: &str = "/dna/intent/api/v1/image/importation";
const SITES: &str = "/dna/intent/api/v1/sites";
const PRODUCTS: &str = "/dna/intent/api/v1/productNames";
const TAG_STATUS: &str =
    "/dna/intent/api/v1/images/img-1/sites/S1/productNames/286315874/goldenTaggingStatus";
const TAG_GOLDEN: &str = "/dna/intent/api/v1/images/img-1/sites/S1/tagGolden";

fn task(id: &str) -> String {
    format!("/dna/intent/api/v1/task/{id}")
}

struct Harness {
    mock: Arc<MockTransport>,
    clock: Arc<ManualClock>,
    sink: Arc<MemorySink>,
    engine: Engine,
}

fn harness() -> Harness {
    let registry = catalog::registry(Vec::new()).unwrap();
    let mock = Arc::new(MockTransport::new());
    let clock = Arc::new(ManualClock::new());
    let sink = Arc::new(MemorySink::new());
    let engine = Engine::new(mock.clone(), Arc::new(registry))
        .with_clock(clock.clone())
        .with_sink(sink.clone());
    Harness {
        mock,
        clock,
        sink,
        engine,
    }
}

fn credential_request() -> ReconcileRequest {
    ReconcileRequest::from_value(
        "cli_credential",
        DesiredState::Present,
        json!({"username": "netops", "password": "s3cr3t!", "description": "lab"}),
    )
}

fn credentials(items: Value) -> Value {
    json!({"response": {"cliCredential": items}})
}

fn stored_credential() -> Value {
    json!({"id": "c1", "username": "netops", "description": "lab", "credentialType": "GLOBAL"})
}

fn task_pending() -> Value {
    json!({"response": {"progress": "in progress", "endTime": 0}})
}

fn task_done() -> Value {
    json!({"response": {"endTime": 1_700_000_000_000_u64, "isError": false, "progress": "done"}})
}

fn script_credential_create(h: &Harness) {
    script_credential_create_after(h, 1);
}

/// Script `absent_reads` empty listings, then the stored object for good.
fn script_credential_create_after(h: &Harness, absent_reads: usize) {
    for _ in 0..absent_reads {
        h.mock.ok(Method::Get, CREDENTIALS, credentials(json!([])));
    }
    h.mock
        .ok(Method::Get, CREDENTIALS, credentials(json!([stored_credential()])));
    h.mock.ok(
        Method::Post,
        CREDENTIALS,
        json!({"response": {"taskId": "t1", "url": "/api/v1/task/t1"}}),
    );
    h.mock
        .ok(Method::Get, &task("t1"), task_pending())
        .ok(Method::Get, &task("t1"), task_done());
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_create_global_credential() {
    let h = harness();
    script_credential_create(&h);

    let report = h.engine.reconcile(credential_request());

    assert!(!report.failed, "{}", report.msg);
    assert!(report.changed);
    assert_eq!(report.action, Action::Create);
    assert_eq!(h.mock.count(Method::Post, CREDENTIALS), 1);
    assert_eq!(h.mock.count(Method::Get, &task("t1")), 2);
    // initial read plus the verification re-read
    assert_eq!(h.mock.count(Method::Get, CREDENTIALS), 2);

    let posted = &h.mock.writes()[0];
    assert_eq!(
        posted.body.as_ref().unwrap()["cliCredential"][0]["password"],
        json!("s3cr3t!")
    );

    let diff = report.diff.as_ref().unwrap();
    assert!(diff.before.is_empty());
    assert_eq!(diff.after["username"], json!("netops"));
    assert_eq!(diff.after["description"], json!("lab"));
    assert_eq!(diff.after["password"], json!(REDACTED));
}

#[test]
fn test_reapply_credential_is_idempotent() {
    let h = harness();
    script_credential_create(&h);

    let first = h.engine.reconcile(credential_request());
    let second = h.engine.reconcile(credential_request());

    assert!(first.changed);
    assert!(!second.failed, "{}", second.msg);
    assert!(!second.changed);
    assert!(second.msg.contains("already in desired state"));
    assert_eq!(h.mock.writes().len(), 1);
}

#[test]
fn test_ssid_partial_update_patches_one_field() {
    let h = harness();
    let current = json!([{
        "instanceUuid": "g1",
        "ssidDetails": [{
            "name": "corp",
            "radioPolicy": "Dual band operation",
            "fastTransition": "Adaptive",
            "securityLevel": "WPA2_ENTERPRISE",
            "wlanType": "Enterprise"
        }]
    }]);
    let mut updated = current.clone();
    updated[0]["ssidDetails"][0]["fastTransition"] = json!("Enable");
    h.mock
        .ok(Method::Get, SSIDS, current)
        .ok(Method::Get, SSIDS, updated);
    h.mock.ok(
        Method::Put,
        SSIDS,
        json!({"executionId": "e1", "executionStatusUrl": "/dna/platform/management/business-api/v1/execution-status/e1"}),
    );
    h.mock.ok(
        Method::Get,
        "/dna/intent/api/v1/dnacaap/management/execution-status/e1",
        json!({"status": "SUCCESS", "bapiName": "Update Enterprise SSID"}),
    );

    let report = h.engine.reconcile(ReconcileRequest::from_value(
        "wireless_ssid",
        DesiredState::Present,
        json!({"name": "corp", "fastTransition": "Enable"}),
    ));

    assert!(!report.failed, "{}", report.msg);
    assert!(report.changed);
    assert_eq!(report.action, Action::Update);
    let writes = h.mock.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(
        writes[0].body.as_ref().unwrap(),
        &json!({"fastTransition": "Enable", "name": "corp"})
    );
    let diff = report.diff.unwrap();
    assert_eq!(diff.after.keys().collect::<Vec<_>>(), vec!["fastTransition"]);
    assert_eq!(diff.before["fastTransition"], json!("Adaptive"));
}

#[test]
fn test_fabric_zone_delete_when_absent() {
    let h = harness();
    h.mock.ok(Method::Get, FABRIC_ZONES, json!({"response": []}));

    let report = h.engine.reconcile(ReconcileRequest::from_value(
        "sda_fabric_zone",
        DesiredState::Absent,
        json!({"site_id": "S1"}),
    ));

    assert!(!report.failed, "{}", report.msg);
    assert!(!report.changed);
    assert_eq!(h.mock.calls().len(), 1);
    assert!(h.mock.writes().is_empty());
    assert_eq!(h.mock.calls()[0].query_value("siteId"), Some("S1"));
}

fn golden_tag_request() -> ReconcileRequest {
    ReconcileRequest::from_value(
        "image_golden_tag",
        DesiredState::Present,
        json!({
            "image_name": "cat9k_iosxe.17.09.04a.SPA.bin",
            "site_name": "Global/US/SJC",
            "device_family": "Cisco Catalyst 9300 Switch"
        }),
    )
}

fn script_golden_tag_lookups(h: &Harness) {
    h.mock.ok(
        Method::Get,
        IMAGES,
        json!({"response": [{"imageUuid": "img-1", "name": "cat9k_iosxe.17.09.04a.SPA.bin"}]}),
    );
    h.mock.ok(
        Method::Get,
        SITES,
        json!({"response": [{"id": "S1", "nameHierarchy": "Global/US/SJC", "type": "building"}]}),
    );
    h.mock.ok(
        Method::Get,
        PRODUCTS,
        json!({"response": [{"productName": "Cisco Catalyst 9300 Switch", "productNameOrdinal": 286_315_874}]}),
    );
    h.mock.ok(
        Method::Get,
        TAG_STATUS,
        json!({"response": {"taggedGolden": false}}),
    );
}

#[test]
fn test_image_golden_tag_workflow() {
    let h = harness();
    script_golden_tag_lookups(&h);
    h.mock
        .ok(Method::Get, TAG_STATUS, json!({"response": {"taggedGolden": true}}));
    h.mock
        .ok(Method::Post, TAG_GOLDEN, json!({"response": {"taskId": "t9"}}));
    h.mock.ok(Method::Get, &task("t9"), task_done());

    let report = h.engine.reconcile(golden_tag_request());

    assert!(!report.failed, "{}", report.msg);
    assert!(report.changed);
    let names: Vec<&str> = report.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["resolveImage", "resolveSite", "resolveProduct", "tagGolden"]);
    for step in ["resolveImage", "resolveSite", "resolveProduct", "tagGolden"] {
        assert!(h.sink.contains(&format!("step {step} completed")), "{step}");
    }
    let writes = h.mock.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(
        writes[0].body.as_ref().unwrap(),
        &json!({"productNameOrdinal": 286_315_874})
    );
}

#[test]
fn test_image_golden_tag_failure_names_step() {
    let h = harness();
    script_golden_tag_lookups(&h);
    h.mock.fail(
        Method::Post,
        TAG_GOLDEN,
        TransportError::from_status(500, json!({"response": {"detail": "image not applicable"}})),
    );

    let report = h.engine.reconcile(golden_tag_request());

    assert!(report.failed);
    assert!(!report.changed);
    assert_eq!(report.error_kind(), Some(ErrorKind::WorkflowFailed));
    let error = report.error.as_ref().unwrap();
    assert_eq!(error.step.as_deref(), Some("tagGolden"));
    assert_eq!(
        error.completed.clone().unwrap(),
        vec!["resolveImage", "resolveSite", "resolveProduct"]
    );
    assert!(report.msg.contains("image not applicable"));
}

#[test]
fn test_task_timeout_reports_outcome_unknown() {
    let h = harness();
    h.mock.ok(Method::Get, CREDENTIALS, credentials(json!([])));
    h.mock
        .ok(Method::Post, CREDENTIALS, json!({"response": {"taskId": "t1"}}));
    h.mock.ok(Method::Get, &task("t1"), task_pending());

    let timeout = Duration::from_secs(300);
    let report = h.engine.reconcile(
        credential_request().with_options(ReconcileOptions::default().with_timeout(timeout)),
    );

    assert!(report.failed);
    assert!(report.msg.contains("TimedOut"), "{}", report.msg);
    assert!(report.changed);
    assert!(report.outcome_unknown);
    assert_eq!(report.error_kind(), Some(ErrorKind::TimedOut));
    // the remote task is left running: the create is the only write
    assert_eq!(h.mock.writes().len(), 1);

    let elapsed = h.clock.elapsed().as_secs_f64();
    let target = timeout.as_secs_f64();
    assert!(elapsed >= target * 0.9 && elapsed <= target * 1.1, "{elapsed}");
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_poll_intervals_non_decreasing_up_to_cap() {
    let h = harness();
    h.mock.ok(Method::Get, CREDENTIALS, credentials(json!([])));
    h.mock
        .ok(Method::Post, CREDENTIALS, json!({"response": {"taskId": "t1"}}));
    h.mock.ok(Method::Get, &task("t1"), task_pending());

    h.engine.reconcile(credential_request());

    let sleeps = h.clock.sleeps();
    assert!(sleeps.len() > 5);
    // the last sleep is cut to the remaining time before the deadline
    let full = &sleeps[..sleeps.len() - 1];
    assert!(full.windows(2).all(|w| w[0] <= w[1]));
    assert!(full.iter().all(|d| *d <= Duration::from_secs(30)));
}

#[test]
fn test_check_mode_matches_real_run() {
    let h = harness();
    // one empty listing for the check run, one for the real run
    script_credential_create_after(&h, 2);

    let check = h.engine.reconcile(credential_request().check_mode(true));
    assert!(check.changed);
    assert!(check.msg.contains("would be created"), "{}", check.msg);
    assert!(h.mock.writes().is_empty());

    let real = h.engine.reconcile(credential_request());
    assert!(!real.failed, "{}", real.msg);
    assert_eq!(real.changed, check.changed);
    assert_eq!(real.action, check.action);

    let recheck = h.engine.reconcile(credential_request().check_mode(true));
    assert!(!recheck.changed);
    assert_eq!(h.mock.writes().len(), 1);
}

#[test]
fn test_secrets_never_leak() {
    let h = harness();
    h.mock.ok(Method::Get, CREDENTIALS, credentials(json!([])));
    h.mock.fail(
        Method::Post,
        CREDENTIALS,
        TransportError::from_status(
            400,
            json!({"response": {"detail": "password s3cr3t! does not meet complexity rules"}}),
        ),
    );

    let report = h.engine.reconcile(credential_request());

    assert!(report.failed);
    assert!(!report.changed);
    let serialized = serde_json::to_string(&report).unwrap();
    assert!(!serialized.contains("s3cr3t!"), "{serialized}");
    assert!(!h.sink.contains("s3cr3t!"));
    assert!(report.msg.contains("complexity rules"));
}

#[test]
fn test_rotation_redacts_both_sides() {
    let h = harness();
    h.mock
        .ok(Method::Get, CREDENTIALS, credentials(json!([stored_credential()])));
    let report = h.engine.reconcile(
        credential_request()
            .check_mode(true)
            .with_options(ReconcileOptions::default().rotate("password")),
    );
    assert!(report.changed, "{}", report.msg);
    let diff = report.diff.unwrap();
    assert_eq!(diff.after["password"], json!(REDACTED));
    assert!(!serde_json::to_string(&diff).unwrap().contains("s3cr3t!"));
}

#[test]
fn test_different_identity_creates_second_object() {
    let h = harness();
    h.mock
        .ok(Method::Get, CREDENTIALS, credentials(json!([stored_credential()])))
        .ok(
            Method::Get,
            CREDENTIALS,
            credentials(json!([
                stored_credential(),
                {"id": "c2", "username": "netops2", "description": "lab"}
            ])),
        );
    h.mock
        .ok(Method::Post, CREDENTIALS, json!({"response": {"taskId": "t1"}}));
    h.mock.ok(Method::Get, &task("t1"), task_done());

    let report = h.engine.reconcile(ReconcileRequest::from_value(
        "cli_credential",
        DesiredState::Present,
        json!({"username": "netops2", "password": "x", "description": "lab"}),
    ));

    assert!(!report.failed, "{}", report.msg);
    assert_eq!(report.action, Action::Create);
    assert!(h.mock.writes().iter().all(|w| w.method == Method::Post));
}

#[test]
fn test_conflict_on_create_converges_by_update() {
    let h = harness();
    let with_comments = |comments: &str| {
        credentials(json!([{"id": "c1", "username": "netops", "description": "lab", "comments": comments}]))
    };
    h.mock
        .ok(Method::Get, CREDENTIALS, credentials(json!([])))
        .ok(Method::Get, CREDENTIALS, with_comments("old"))
        .ok(Method::Get, CREDENTIALS, with_comments("new"));
    h.mock.fail(
        Method::Post,
        CREDENTIALS,
        TransportError::from_status(409, json!({"message": "credential exists"})),
    );
    h.mock
        .ok(Method::Put, CREDENTIALS, json!({"response": {"taskId": "t2"}}));
    h.mock.ok(Method::Get, &task("t2"), task_done());

    let mut request = credential_request();
    request.desired.insert("comments".into(), json!("new"));
    let report = h.engine.reconcile(request);

    assert!(!report.failed, "{}", report.msg);
    assert!(report.changed);
    assert_eq!(report.action, Action::Update);
    let put = h
        .mock
        .writes()
        .into_iter()
        .find(|w| w.method == Method::Put)
        .unwrap();
    assert_eq!(
        put.body.unwrap(),
        json!({"cliCredential": {"comments": "new", "id": "c1"}})
    );
}

#[test]
fn test_alias_resolves_to_latest_descriptor() {
    let h = harness();
    h.mock
        .ok(Method::Get, CREDENTIALS, credentials(json!([stored_credential()])));
    let report = h.engine.reconcile(ReconcileRequest::from_value(
        "cli_credential_v2",
        DesiredState::Present,
        json!({"username": "netops", "description": "lab"}),
    ));
    assert!(!report.failed, "{}", report.msg);
    assert_eq!(report.kind, "cli_credential");
}

#[test]
fn test_batch_of_mixed_kinds() {
    let h = harness();
    h.mock
        .ok(Method::Get, CREDENTIALS, credentials(json!([stored_credential()])));
    h.mock.ok(Method::Get, FABRIC_ZONES, json!({"response": []}));
    let requests = vec![
        credential_request(),
        ReconcileRequest::from_value("sda_fabric_zone", DesiredState::Absent, json!({"site_id": "S1"})),
        ReconcileRequest::from_value("nope", DesiredState::Present, json!({})),
    ];
    let reports = h.engine.reconcile_many(requests, 3);
    assert_eq!(reports.len(), 3);
    assert!(!reports[0].changed && !reports[0].failed);
    assert!(!reports[1].changed && !reports[1].failed);
    assert_eq!(reports[2].error_kind(), Some(ErrorKind::UnknownKind));
    let summary = declarative::BatchSummary::from_reports(&reports);
    assert_eq!(summary.unchanged, 2);
    assert_eq!(summary.failed, 1);
}
