//! Integration tests for endpoint polling and session state.

mod common;

use std::sync::Arc;

use common::*;
use hatch_updater::{HostEvent, InstallOutcome, UpdateError, UpdatePhase, UpdaterConfig};

const A: &str = "https://a.example.com/linux-x86_64/1.0.0";
const B: &str = "https://b.example.com/linux-x86_64/1.0.0";

fn two_endpoints() -> UpdaterConfig {
    UpdaterConfig {
        endpoints: vec![
            "https://a.example.com/{{target}}/{{current_version}}".into(),
            "https://b.example.com/{{target}}/{{current_version}}".into(),
        ],
        ..Default::default()
    }
}

fn installer() -> Arc<FakeInstaller> {
    Arc::new(FakeInstaller::new(InstallOutcome::Completed))
}

#[tokio::test]
async fn test_fallback_to_second_endpoint() {
    let http = Arc::new(
        FakeHttp::new()
            .fail(A)
            .respond(B, 200, simple_manifest("1.1.0", "https://cdn.example.com/app.AppImage", None, 0)),
    );
    let (controller, mut rx) = build(two_endpoints(), http.clone(), installer());

    let info = controller.check().await.unwrap().expect("update from B");

    assert_eq!(info.version, "1.1.0");
    assert_eq!(http.requested(), vec![A.to_string(), B.to_string()]);
    assert_eq!(controller.phase(), UpdatePhase::UpdateAvailable);
    assert_eq!(controller.last_check_result(), Some(info.clone()));
    assert_eq!(drain(&mut rx), vec![HostEvent::UpdateAvailable(info)]);
}

#[tokio::test]
async fn test_no_content_stops_polling() {
    let http = Arc::new(
        FakeHttp::new()
            .respond(A, 204, Vec::new())
            .respond(B, 200, simple_manifest("9.9.9", "https://cdn.example.com/app.AppImage", None, 0)),
    );
    let (controller, mut rx) = build(two_endpoints(), http.clone(), installer());

    assert_eq!(controller.check().await.unwrap(), None);
    assert_eq!(http.requested(), vec![A.to_string()]);
    assert_eq!(controller.phase(), UpdatePhase::UpToDate);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_server_error_status_falls_through() {
    let http = Arc::new(
        FakeHttp::new()
            .respond(A, 503, "busy")
            .respond(B, 200, simple_manifest("1.2.0", "https://cdn.example.com/app.AppImage", None, 0)),
    );
    let (controller, _rx) = build(two_endpoints(), http, installer());

    let info = controller.check().await.unwrap().unwrap();
    assert_eq!(info.version, "1.2.0");
}

#[tokio::test]
async fn test_all_endpoints_unreachable() {
    let http = Arc::new(FakeHttp::new().fail(A).respond(B, 500, "oops"));
    let (controller, mut rx) = build(two_endpoints(), http, installer());

    let err = controller.check().await.unwrap_err();

    assert!(matches!(err, UpdateError::Network(_)));
    assert!(matches!(controller.phase(), UpdatePhase::Error(_)));
    assert_eq!(names(&drain(&mut rx)), vec!["update-error"]);
}

#[tokio::test]
async fn test_unparseable_manifest_is_not_network_failure() {
    let http = Arc::new(FakeHttp::new().fail(A).respond(B, 200, "<html>maintenance</html>"));
    let (controller, _rx) = build(two_endpoints(), http, installer());

    assert_eq!(controller.check().await.unwrap(), None);
    assert_eq!(controller.phase(), UpdatePhase::UpToDate);
}

#[tokio::test]
async fn test_same_or_older_version_is_up_to_date() {
    for version in ["1.0.0", "0.9.0"] {
        let http = Arc::new(FakeHttp::new().respond(
            A,
            200,
            simple_manifest(version, "https://cdn.example.com/app.AppImage", None, 0),
        ));
        let (controller, _rx) = build(two_endpoints(), http, installer());

        assert_eq!(controller.check().await.unwrap(), None);
        assert_eq!(controller.phase(), UpdatePhase::UpToDate);
    }
}

#[tokio::test]
async fn test_target_missing_from_manifest() {
    let manifest = serde_json::json!({
        "version": "1.1.0",
        "platforms": {
            "darwin-aarch64": { "url": "https://cdn.example.com/App.app.tar.gz", "signature": "c2ln" }
        }
    });
    let http = Arc::new(FakeHttp::new().respond(A, 200, manifest.to_string()));
    let (controller, _rx) = build(two_endpoints(), http.clone(), installer());

    assert_eq!(controller.check().await.unwrap(), None);
    assert_eq!(http.requested().len(), 1);
}

#[tokio::test]
async fn test_concurrent_operation_rejected() {
    let gate = Arc::new(Gate::default());
    let http = Arc::new(
        FakeHttp::new()
            .respond(A, 200, simple_manifest("1.1.0", "https://cdn.example.com/app.AppImage", None, 0))
            .with_gate(gate.clone()),
    );
    let (controller, _rx) = build(two_endpoints(), http, installer());

    let first = controller.check();
    let second = async {
        gate.entered.notified().await;
        assert_eq!(controller.phase(), UpdatePhase::Checking);

        let check = controller.check().await;
        let download = controller.download(|_| {}).await;
        let install = controller.install().await;
        assert_eq!(controller.phase(), UpdatePhase::Checking);

        gate.release.notify_one();
        (check, download, install)
    };

    let (first, (check, download, install)) = tokio::join!(first, second);

    assert!(matches!(check, Err(UpdateError::SessionBusy)));
    assert!(matches!(download, Err(UpdateError::SessionBusy)));
    assert!(matches!(install, Err(UpdateError::SessionBusy)));
    assert_eq!(first.unwrap().unwrap().version, "1.1.0");
    assert_eq!(controller.phase(), UpdatePhase::UpdateAvailable);
}

#[tokio::test]
async fn test_check_allowed_again_after_error() {
    let http = Arc::new(FakeHttp::new().fail(A).fail(B));
    let (controller, _rx) = build(two_endpoints(), http.clone(), installer());

    assert!(controller.check().await.is_err());
    assert!(controller.check().await.is_err());
    assert_eq!(http.requested().len(), 4);
}
