//! Integration tests for POST /upload and GET /health
//!
//! The analysis, transcoding and plotting tools are replaced by a fake runner
//! that writes the same artifacts the real workers leave behind.

mod support;

use std::time::Duration;

use axum::http::StatusCode;
use support::{
    entries, extract_json, file_part_head, keys, mode_part, streaming_upload_request,
    upload_request, upload_request_with_field, wait_for_entries, FakeWorker, TestApp,
};
use tokio::io::AsyncWriteExt;
use tower::util::ServiceExt;

const VIDEO: &[u8] = b"\x00\x00\x00\x18ftypmp42 fake video payload";

fn expected_keys(extra: &[&str]) -> Vec<String> {
    let mut keys: Vec<String> = [
        "sessionId",
        "resultDir",
        "mode",
        "video",
        "labeledFramesDir",
        "frameFiles",
        "zip",
    ]
    .iter()
    .chain(extra.iter())
    .map(|k| k.to_string())
    .collect();
    keys.sort();
    keys
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new(FakeWorker::default());

    let response = app
        .router
        .oneshot(support::get_request("/health", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "motility-server");
    assert!(body["version"].is_string());
}

// =============================================================================
// Mode field sets
// =============================================================================

#[tokio::test]
async fn test_detection_manifest_fields() {
    let app = TestApp::new(FakeWorker::default());

    let response = app
        .router
        .clone()
        .oneshot(upload_request(Some(("sample.mp4", VIDEO)), Some("detection")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let manifest = extract_json(response.into_body()).await;
    assert_eq!(keys(&manifest), expected_keys(&[]));

    let id = manifest["sessionId"].as_str().unwrap().to_string();
    assert_eq!(manifest["mode"], "detection");
    assert_eq!(manifest["resultDir"], format!("/sessions/{}", id));
    assert_eq!(manifest["video"], format!("/sessions/{}/labeled_video_ready.mp4", id));
    assert_eq!(manifest["zip"], format!("/sessions/{}/results.zip", id));
    assert_eq!(
        manifest["frameFiles"],
        serde_json::json!(["frame_0001.png", "frame_0002.png"])
    );

    assert!(app.session_dir(&id).join("labeled_video_ready.mp4").is_file());
    assert!(app.session_dir(&id).join("results.zip").is_file());
    assert_eq!(app.worker.labels(), vec!["dispatch", "normalize"]);
}

#[tokio::test]
async fn test_tracking_noise_manifest_fields() {
    let app = TestApp::new(FakeWorker::default());

    let response = app
        .router
        .clone()
        .oneshot(upload_request(Some(("sample.webm", VIDEO)), Some("tracking_noise")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let manifest = extract_json(response.into_body()).await;
    assert_eq!(
        keys(&manifest),
        expected_keys(&["rawTracksCSV", "summaryCSV", "graph"])
    );
    let id = manifest["sessionId"].as_str().unwrap();
    assert_eq!(manifest["video"], format!("/sessions/{}/tracked_video_ready.mp4", id));
    assert_eq!(manifest["rawTracksCSV"], format!("/sessions/{}/simple_tracks.csv", id));
}

#[tokio::test]
async fn test_tracking_filtered_manifest_fields() {
    let app = TestApp::new(FakeWorker::default());

    let response = app
        .router
        .clone()
        .oneshot(upload_request(Some(("sample.lsm", VIDEO)), Some("tracking_filtered")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let manifest = extract_json(response.into_body()).await;
    assert_eq!(
        keys(&manifest),
        expected_keys(&["rawTracksCSV", "filteredTracksCSV", "summaryCSV", "graph"])
    );
    let id = manifest["sessionId"].as_str().unwrap();
    assert_eq!(
        manifest["filteredTracksCSV"],
        format!("/sessions/{}/filtered_tracks.csv", id)
    );
}

#[tokio::test]
async fn test_file_field_alias_is_accepted() {
    let app = TestApp::new(FakeWorker::default());

    let response = app
        .router
        .clone()
        .oneshot(upload_request_with_field(
            "file",
            Some(("clip.ogg", VIDEO)),
            Some("detection"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Session isolation
// =============================================================================

#[tokio::test]
async fn test_sequential_uploads_get_distinct_sessions() {
    let app = TestApp::new(FakeWorker::default());

    let mut ids = Vec::new();
    for mode in ["detection", "tracking_noise"] {
        let response = app
            .router
            .clone()
            .oneshot(upload_request(Some(("same name.mp4", VIDEO)), Some(mode)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let manifest = extract_json(response.into_body()).await;
        ids.push(manifest["sessionId"].as_str().unwrap().to_string());
    }

    assert_ne!(ids[0], ids[1]);

    // Detection session holds no tracking outputs from the second run
    let first = app.session_dir(&ids[0]);
    assert!(!first.join("simple_tracks.csv").exists());
    assert!(!first.join("tracked_video.mp4").exists());
    let second = app.session_dir(&ids[1]);
    assert!(!second.join("labeled_video.mp4").exists());

    // Both uploads kept, under distinct names
    let uploads: Vec<_> = std::fs::read_dir(app.uploads_root())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(uploads.len(), 2);
    assert!(uploads.iter().all(|name| name.ends_with("-same_name.mp4")));
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_missing_file_is_bad_request() {
    let app = TestApp::new(FakeWorker::default());

    let response = app
        .router
        .clone()
        .oneshot(upload_request(None, Some("detection")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(app.worker.labels().is_empty());
}

#[tokio::test]
async fn test_missing_mode_discards_upload() {
    let app = TestApp::new(FakeWorker::default());

    let response = app
        .router
        .clone()
        .oneshot(upload_request(Some(("sample.mp4", VIDEO)), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(std::fs::read_dir(app.uploads_root()).unwrap().count(), 0);
    assert_eq!(std::fs::read_dir(app.sessions_root()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_unknown_mode_is_rejected_before_dispatch() {
    let app = TestApp::new(FakeWorker::default());

    let response = app
        .router
        .clone()
        .oneshot(upload_request(Some(("sample.mp4", VIDEO)), Some("segmentation")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.worker.labels().is_empty());
    assert_eq!(std::fs::read_dir(app.uploads_root()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_disallowed_extension_is_rejected() {
    let app = TestApp::new(FakeWorker::default());

    let response = app
        .router
        .clone()
        .oneshot(upload_request(Some(("notes.txt", b"hello")), Some("detection")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(std::fs::read_dir(app.uploads_root()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_mode_sent_first_is_checked_before_file_streams() {
    let app = TestApp::new(FakeWorker::default());
    let (mut client, request) = streaming_upload_request();

    // The file part never ends; only an early mode check can answer
    client.write_all(&mode_part("segmentation")).await.unwrap();
    client.write_all(&file_part_head("video", "sample.mp4")).await.unwrap();
    client.write_all(&[0u8; 4096]).await.unwrap();

    let response = tokio::time::timeout(Duration::from_secs(5), app.router.clone().oneshot(request))
        .await
        .expect("invalid mode should be rejected without reading the file")
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(body["error"]["message"].as_str().unwrap().contains("segmentation"));
    assert!(entries(&app.uploads_root()).is_empty());
    assert!(app.worker.labels().is_empty());
    drop(client);
}

#[tokio::test]
async fn test_disconnected_client_leaves_no_partial_upload() {
    let app = TestApp::new(FakeWorker::default());
    let uploads = app.uploads_root();
    let (mut client, request) = streaming_upload_request();

    client.write_all(&mode_part("tracking_noise")).await.unwrap();
    client.write_all(&file_part_head("video", "a.mp4")).await.unwrap();
    client.write_all(&[0u8; 1024]).await.unwrap();

    let mut response = Box::pin(app.router.clone().oneshot(request));
    tokio::select! {
        _ = &mut response => panic!("upload completed with the body still open"),
        _ = wait_for_entries(&uploads, 1) => {}
    }
    assert!(entries(&uploads)[0].ends_with("-a.mp4.part"));

    // Server drops the request future when the connection goes away
    drop(response);
    drop(client);

    assert!(entries(&uploads).is_empty(), "left behind: {:?}", entries(&uploads));
    assert!(entries(&app.sessions_root()).is_empty());
    assert!(app.worker.labels().is_empty());
}

// =============================================================================
// Stage failures
// =============================================================================

#[tokio::test]
async fn test_worker_failure_returns_500_with_stderr() {
    let app = TestApp::new(FakeWorker {
        dispatch_stderr: Some("RuntimeError: model weights missing".to_string()),
        ..FakeWorker::default()
    });

    let response = app
        .router
        .clone()
        .oneshot(upload_request(Some(("sample.mp4", VIDEO)), Some("tracking_noise")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "WORKER_FAILED");
    assert_eq!(body["error"]["detail"], "RuntimeError: model weights missing");
    assert!(body.get("sessionId").is_none());
    assert_eq!(app.worker.labels(), vec!["dispatch"]);
}

#[tokio::test]
async fn test_normalization_failure_aborts_request() {
    let app = TestApp::new(FakeWorker {
        fail_normalize: true,
        ..FakeWorker::default()
    });

    let response = app
        .router
        .clone()
        .oneshot(upload_request(Some(("sample.mp4", VIDEO)), Some("detection")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "TRANSCODE_FAILED");
}

#[tokio::test]
async fn test_archive_failure_still_returns_manifest() {
    let app = TestApp::new(FakeWorker {
        block_archive: true,
        ..FakeWorker::default()
    });

    let response = app
        .router
        .clone()
        .oneshot(upload_request(Some(("sample.mp4", VIDEO)), Some("tracking_filtered")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let manifest = extract_json(response.into_body()).await;
    assert!(manifest.get("zip").is_none());

    let mut expected = expected_keys(&["rawTracksCSV", "filteredTracksCSV", "summaryCSV", "graph"]);
    expected.retain(|k| k != "zip");
    assert_eq!(keys(&manifest), expected);

    let id = manifest["sessionId"].as_str().unwrap();
    assert!(!app.session_dir(id).join("results.zip").exists());
}
