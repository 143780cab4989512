#![allow(clippy::unwrap_used)]
// Integration tests for `PackageClient`: install-state queries, the
// download/verify/upload/install pipeline, and uninstall, against a
// wiremock device that also serves the package artifact.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bigip_api::{Credentials, ManagementClient, TransportConfig};
use bigip_core::{CoreError, Device, InstallOptions, MetadataCatalog, RetryPolicy};

const TASKS: &str = "/mgmt/shared/iapp/package-management-tasks";
const RPM: &str = "f5-appsvcs-3.20.0-3.noarch.rpm";
const RPM_BYTES: &[u8] = b"not really an rpm, but close enough";

// ── Helpers ─────────────────────────────────────────────────────────

fn test_catalog(artifact_base: &str) -> MetadataCatalog {
    let doc = json!({
        "components": {
            "as3": {
                "endpoints": {
                    "configure": { "uri": "/mgmt/shared/appsvcs/declare", "methods": ["GET", "POST", "DELETE"] },
                    "info": { "uri": "/mgmt/shared/appsvcs/info", "methods": ["GET"] }
                },
                "versions": {
                    "3.20.0": {
                        "downloadUrl": format!("{artifact_base}/dist/{RPM}"),
                        "packageName": "f5-appsvcs-3.20.0-3.noarch",
                        "latest": true
                    },
                    "3.19.1": {
                        "downloadUrl": format!("{artifact_base}/dist/f5-appsvcs-3.19.1-1.noarch.rpm"),
                        "packageName": "f5-appsvcs-3.19.1-1.noarch",
                        "latest": false
                    }
                }
            }
        }
    });
    MetadataCatalog::from_json(&doc.to_string()).unwrap()
}

async fn setup() -> (MockServer, Device) {
    let server = MockServer::start().await;
    let catalog = test_catalog(&server.uri());
    let device = device_for(&server, catalog).await;
    (server, device)
}

async fn device_for(server: &MockServer, catalog: MetadataCatalog) -> Device {
    let mgmt = ManagementClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        Credentials::new("admin", SecretString::from("admin".to_string())),
    )
    .unwrap();

    Mock::given(method("POST"))
        .and(path("/mgmt/shared/authn/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "token": { "token": "tok", "timeout": 1200 } })),
        )
        .mount(server)
        .await;

    Device::from_parts(
        Arc::new(mgmt),
        TransportConfig::default().build_download_client().unwrap(),
        catalog,
        RetryPolicy::new(5, Duration::from_millis(10)),
    )
}

/// Serve one artifact response that promises `declared_len` bytes but
/// sends only `body` before closing the connection.
async fn truncated_artifact_host(body: &'static [u8], declared_len: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let head = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/octet-stream\r\ncontent-length: {declared_len}\r\n\r\n"
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(body).await.unwrap();
        socket.flush().await.unwrap();
    });
    format!("http://{addr}")
}

/// Mount a POST for `operation` returning `task_id`, and a finished GET for it.
async fn mount_task(
    server: &MockServer,
    operation: serde_json::Value,
    task_id: &str,
    finished: serde_json::Value,
    expected: u64,
) {
    Mock::given(method("POST"))
        .and(path(TASKS))
        .and(body_partial_json(operation))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": task_id })))
        .expect(expected)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{TASKS}/{task_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(finished))
        .mount(server)
        .await;
}

async fn mount_query(server: &MockServer, packages: serde_json::Value) {
    mount_task(
        server,
        json!({ "operation": "QUERY" }),
        "query-1",
        json!({ "id": "query-1", "status": "FINISHED", "queryResponse": packages }),
        1,
    )
    .await;
}

async fn mount_artifact(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/dist/{RPM}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(RPM_BYTES))
        .mount(server)
        .await;
}

// ── Install state ───────────────────────────────────────────────────

#[tokio::test]
async fn test_is_installed_without_matching_package() {
    let (server, device) = setup().await;
    mount_query(
        &server,
        json!([{ "name": "f5-declarative-onboarding", "packageName": "f5-declarative-onboarding-1.13.0-5.noarch" }]),
    )
    .await;

    let status = device
        .extension("as3", None)
        .unwrap()
        .package()
        .is_installed()
        .await
        .unwrap();

    assert!(!status.installed);
    assert_eq!(status.installed_version, "");
    assert_eq!(status.latest_version, "3.20.0");
}

#[tokio::test]
async fn test_is_installed_parses_version_of_single_match() {
    let (server, device) = setup().await;
    mount_query(
        &server,
        json!([
            { "name": "f5-appsvcs", "packageName": "f5-appsvcs-3.19.1-1.noarch" },
            { "name": "f5-telemetry", "packageName": "f5-telemetry-1.12.0-3.noarch" }
        ]),
    )
    .await;

    let status = device
        .extension("as3", None)
        .unwrap()
        .package()
        .is_installed()
        .await
        .unwrap();

    assert!(status.installed);
    assert_eq!(status.installed_version, "3.19.1");
}

#[tokio::test]
async fn test_ambiguous_match_is_reported_as_not_installed() {
    let (server, device) = setup().await;
    mount_query(
        &server,
        json!([
            { "name": "f5-appsvcs", "packageName": "f5-appsvcs-3.19.1-1.noarch" },
            { "name": "f5-appsvcs", "packageName": "f5-appsvcs-3.20.0-3.noarch" }
        ]),
    )
    .await;

    let status = device
        .extension("as3", None)
        .unwrap()
        .package()
        .is_installed()
        .await
        .unwrap();

    assert!(!status.installed);
    assert_eq!(status.installed_version, "");
}

// ── Install / uninstall ─────────────────────────────────────────────

#[tokio::test]
async fn test_install_then_uninstall_reports_same_version() {
    let (server, device) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    mount_artifact(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("/mgmt/shared/file-transfer/uploads/{RPM}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    mount_task(
        &server,
        json!({
            "operation": "INSTALL",
            "packageFilePath": format!("/var/config/rest/downloads/{RPM}")
        }),
        "install-1",
        json!({ "id": "install-1", "status": "FINISHED" }),
        1,
    )
    .await;
    mount_query(
        &server,
        json!([{ "name": "f5-appsvcs", "packageName": "f5-appsvcs-3.20.0-3.noarch" }]),
    )
    .await;
    mount_task(
        &server,
        json!({ "operation": "UNINSTALL", "packageName": "f5-appsvcs-3.20.0-3.noarch" }),
        "uninstall-1",
        json!({ "id": "uninstall-1", "status": "FINISHED" }),
        1,
    )
    .await;

    let ext = device.extension("as3", None).unwrap();
    let installed = ext
        .package()
        .install(InstallOptions::default().with_download_dir(dir.path()))
        .await
        .unwrap();
    let removed = ext.package().uninstall().await.unwrap();

    assert_eq!(installed.component, "as3");
    assert_eq!(installed.version, "3.20.0");
    assert_eq!(removed.version, installed.version);
    // deleted after upload by default
    assert!(!dir.path().join(RPM).exists());
}

#[tokio::test]
async fn test_install_with_wrong_hash_uploads_nothing() {
    let (server, device) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    mount_artifact(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("/mgmt/shared/file-transfer/uploads/{RPM}")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TASKS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "x" })))
        .expect(0)
        .mount(&server)
        .await;

    let err = device
        .extension("as3", None)
        .unwrap()
        .package()
        .install(
            InstallOptions::default()
                .with_hash("0".repeat(64))
                .with_download_dir(dir.path()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::HashMismatch { .. }), "got {err:?}");
    assert!(!dir.path().join(RPM).exists());
}

#[tokio::test]
async fn test_install_with_matching_hash_keeps_file_on_request() {
    let (server, device) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    mount_artifact(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("/mgmt/shared/file-transfer/uploads/{RPM}")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    mount_task(
        &server,
        json!({ "operation": "INSTALL" }),
        "install-1",
        json!({ "id": "install-1", "status": "FINISHED" }),
        1,
    )
    .await;

    let hash = format!("{:X}", Sha256::digest(RPM_BYTES));
    device
        .extension("as3", None)
        .unwrap()
        .package()
        .install(
            InstallOptions::default()
                .with_hash(hash)
                .keep_file()
                .with_download_dir(dir.path()),
        )
        .await
        .unwrap();

    assert_eq!(std::fs::read(dir.path().join(RPM)).unwrap(), RPM_BYTES);
}

#[tokio::test]
async fn test_interrupted_download_leaves_no_partial_file() {
    let server = MockServer::start().await;
    let artifact_host = truncated_artifact_host(b"first half", 20).await;
    let device = device_for(&server, test_catalog(&artifact_host)).await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path(format!("/mgmt/shared/file-transfer/uploads/{RPM}")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = device
        .extension("as3", None)
        .unwrap()
        .package()
        .install(InstallOptions::default().keep_file().with_download_dir(dir.path()))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::ConnectionFailed { .. }), "got {err:?}");
    assert!(!dir.path().join(RPM).exists());
}

#[tokio::test]
async fn test_failed_install_task_surfaces_device_message() {
    let (server, device) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    mount_artifact(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("/mgmt/shared/file-transfer/uploads/{RPM}")))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    mount_task(
        &server,
        json!({ "operation": "INSTALL" }),
        "install-1",
        json!({ "id": "install-1", "status": "FAILED", "errorMessage": "rpm transaction failed" }),
        1,
    )
    .await;

    let err = device
        .extension("as3", None)
        .unwrap()
        .package()
        .install(InstallOptions::default().with_download_dir(dir.path()))
        .await
        .unwrap_err();

    match err {
        CoreError::TaskFailed { task_id, message } => {
            assert_eq!(task_id, "install-1");
            assert_eq!(message, "rpm transaction failed");
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_uninstall_of_absent_package_is_noop() {
    let (server, device) = setup().await;
    mount_query(&server, json!([])).await;
    Mock::given(method("POST"))
        .and(path(TASKS))
        .and(body_partial_json(json!({ "operation": "UNINSTALL" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "x" })))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = device
        .extension("as3", None)
        .unwrap()
        .package()
        .uninstall()
        .await
        .unwrap();

    assert_eq!(outcome.component, "as3");
    assert_eq!(outcome.version, "");
}

#[tokio::test]
async fn test_versions_list_needs_no_network() {
    let (server, device) = setup().await;

    let versions = device
        .extension("as3", Some("3.19.1"))
        .unwrap()
        .package()
        .versions_list();

    assert_eq!(versions, vec!["3.20.0".to_string(), "3.19.1".to_string()]);
    assert!(server.received_requests().await.unwrap().is_empty());
}
