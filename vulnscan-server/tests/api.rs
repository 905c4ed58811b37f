use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::{Value, json};

#[path = "support/mod.rs"]
mod support;
use support::{FixedEngine, RecordingLauncher, TestApp, UnavailableStore};

fn libssl_report() -> Value {
    json!({
        "ArtifactName": "nginx",
        "Results": [{
            "Target": "nginx (debian 12.5)",
            "Vulnerabilities": [{
                "VulnerabilityID": "CVE-2024-0001",
                "PkgName": "libssl",
                "Severity": "CRITICAL",
                "Description": "x"
            }]
        }]
    })
}

#[tokio::test]
async fn health_check_reports_running() {
    let app = TestApp::new();

    let response = app.server.get("/").await;
    response.assert_status_ok();
    response.assert_json(&json!({"status": "API running"}));
}

#[tokio::test]
async fn submission_is_queued_and_launched() {
    let app = TestApp::new();

    let response = app
        .server
        .post("/scan")
        .json(&json!({"image_name": "nginx"}))
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    response.assert_json(&json!({
        "status": "queued",
        "scan_id": 1,
        "job_triggered": true
    }));

    let launched = app.launcher.take();
    assert_eq!(launched.len(), 1);
    assert_eq!(launched[0].image_name, "nginx");

    let scans: Value = app.server.get("/scans").await.json();
    assert_eq!(scans[0]["id"], 1);
    assert_eq!(scans[0]["image_name"], "nginx");
    assert_eq!(scans[0]["status"], "PENDING");
}

#[tokio::test]
async fn completed_scan_exposes_its_findings() {
    let app = TestApp::new();
    app.server
        .post("/scan")
        .json(&json!({"image_name": "nginx"}))
        .await
        .assert_status(StatusCode::ACCEPTED);
    app.run_launched(FixedEngine(Some(libssl_report()))).await;

    let scans: Value = app.server.get("/scans").await.json();
    assert_eq!(scans[0]["status"], "DONE");

    let findings = app.server.get("/scans/1/vulnerabilities").await;
    findings.assert_status_ok();
    findings.assert_json(&json!([{
        "package_name": "libssl",
        "severity": "CRITICAL",
        "description": "x",
        "fixed_version": "N/A"
    }]));

    let detail: Value = app.server.get("/scans/1").await.json();
    assert_eq!(detail["image_tag"], "latest");
    assert_eq!(detail["results"], libssl_report());
}

#[tokio::test]
async fn failed_scan_has_error_payload_and_no_findings() {
    let app = TestApp::new();
    app.server
        .post("/scan")
        .json(&json!({"image_name": "does-not-exist:1"}))
        .await
        .assert_status(StatusCode::ACCEPTED);
    app.run_launched(FixedEngine(None)).await;

    let detail: Value = app.server.get("/scans/1").await.json();
    assert_eq!(detail["status"], "FAILED");
    assert_eq!(detail["results"]["error"], "Scan process failed");

    let findings: Value = app.server.get("/scans/1/vulnerabilities").await.json();
    assert_eq!(findings, json!([]));
}

#[tokio::test]
async fn listing_findings_twice_is_stable() {
    let app = TestApp::new();
    app.server
        .post("/scan")
        .json(&json!({"image_name": "nginx"}))
        .await
        .assert_status(StatusCode::ACCEPTED);
    app.run_launched(FixedEngine(Some(json!({
        "Results": [{"Vulnerabilities": [
            {"PkgName": "b"}, {"PkgName": "a"}, {"PkgName": "c"}
        ]}]
    }))))
    .await;

    let first: Value = app.server.get("/scans/1/vulnerabilities").await.json();
    let second: Value = app.server.get("/scans/1/vulnerabilities").await.json();
    assert_eq!(first.as_array().map(Vec::len), Some(3));
    assert_eq!(first, second);
}

#[tokio::test]
async fn scans_are_listed_newest_first() {
    let app = TestApp::new();
    for image in ["alpine", "redis", "nginx"] {
        app.server
            .post("/scan")
            .json(&json!({"image_name": image}))
            .await
            .assert_status(StatusCode::ACCEPTED);
    }

    let scans: Value = app.server.get("/scans").await.json();
    let names: Vec<&str> = scans
        .as_array()
        .unwrap()
        .iter()
        .map(|scan| scan["image_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["nginx", "redis", "alpine"]);
}

#[tokio::test]
async fn blank_image_name_is_rejected() {
    let app = TestApp::new();

    let response = app
        .server
        .post("/scan")
        .json(&json!({"image_name": "   "}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["status"], "error");
    assert!(body["detail"].as_str().unwrap().contains("image"));

    assert!(app.launcher.take().is_empty());
    let scans: Value = app.server.get("/scans").await.json();
    assert_eq!(scans, json!([]));
}

#[tokio::test]
async fn malformed_body_gets_a_json_error() {
    let app = TestApp::new();

    let response = app
        .server
        .post("/scan")
        .json(&json!({"image": "nginx"}))
        .await;
    assert!(response.status_code().is_client_error());
    let body: Value = response.json();
    assert_eq!(body["status"], "error");
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn launch_failure_is_an_error_but_keeps_the_scan() {
    let app = TestApp::with(
        Arc::new(vulnscan_core::InMemoryScanStore::new()),
        Arc::new(RecordingLauncher::refusing()),
    );

    let response = app
        .server
        .post("/scan")
        .json(&json!({"image_name": "nginx"}))
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["status"], "error");

    let scans: Value = app.server.get("/scans").await.json();
    assert_eq!(scans[0]["status"], "PENDING");
}

#[tokio::test]
async fn store_outage_degrades_reads_to_empty() {
    let app = TestApp::with(
        Arc::new(UnavailableStore),
        Arc::new(RecordingLauncher::default()),
    );

    let scans = app.server.get("/scans").await;
    scans.assert_status_ok();
    scans.assert_json(&json!([]));

    let findings = app.server.get("/scans/1/vulnerabilities").await;
    findings.assert_status_ok();
    findings.assert_json(&json!([]));

    let submit = app
        .server
        .post("/scan")
        .json(&json!({"image_name": "nginx"}))
        .await;
    submit.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = submit.json();
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn unknown_scan_detail_is_not_found() {
    let app = TestApp::new();

    let response = app.server.get("/scans/42").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["status"], "error");

    let findings = app.server.get("/scans/42/vulnerabilities").await;
    findings.assert_json(&json!([]));
}

#[tokio::test]
async fn non_numeric_scan_id_is_handled() {
    let app = TestApp::new();

    app.server
        .get("/scans/abc")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let findings = app.server.get("/scans/abc/vulnerabilities").await;
    findings.assert_status_ok();
    findings.assert_json(&json!([]));
}

#[tokio::test]
async fn cors_preflight_is_answered_for_any_origin() {
    let app = TestApp::new();

    let preflight = app
        .server
        .method(Method::OPTIONS, "/scan")
        .add_header("Origin", "http://dashboard.local")
        .add_header("Access-Control-Request-Method", "POST")
        .await;
    assert!(preflight.status_code().is_success());
    assert_eq!(preflight.header("access-control-allow-origin"), "*");

    let listing = app
        .server
        .get("/scans")
        .add_header("Origin", "http://dashboard.local")
        .await;
    listing.assert_status_ok();
    assert_eq!(listing.header("access-control-allow-origin"), "*");
}
