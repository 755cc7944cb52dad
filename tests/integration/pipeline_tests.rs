//! End-to-end runs against the mock layout server.
//!
//! Tests verify:
//! - A full run uploads every tile of every level and finalizes once
//! - A rejected tile stops the run without finalizing
//! - Cancellation mid-upload stops dispatch without finalizing

use std::collections::HashSet;
use std::time::Duration;

use axum::http::StatusCode;

use layout_uploader::{
    HttpLayoutServer, RetryPolicy, RunError, RunStatus, UploadClient, UploadSession,
};

use super::test_utils::{is_valid_jpeg, process_config, MockLayoutServer, LAYOUT_KEY, SECRET};

fn http_session() -> UploadSession<HttpLayoutServer> {
    let server = HttpLayoutServer::new().unwrap();
    UploadSession::new(UploadClient::with_policy(server, RetryPolicy::no_delay(3)))
}

// =============================================================================
// Successful Runs
// =============================================================================

#[tokio::test]
async fn test_reference_image_completes() {
    let server = MockLayoutServer::start().await;
    let session = http_session();

    let message = session
        .start(process_config(&server, 1000, 700, 256))
        .await
        .unwrap();
    assert_eq!(message, "Processing completed successfully! Max zoom level: 2");

    let tiles = server.tiles();
    assert_eq!(tiles.len(), 17);

    // Finest level: 1024x768 canvas, 4x3 grid
    let finest: HashSet<(u32, u32)> = tiles
        .iter()
        .filter(|t| t.zoom == 2)
        .map(|t| (t.x, t.y))
        .collect();
    assert_eq!(finest.len(), 12);
    for x in [0, 256, 512, 768] {
        for y in [0, 256, 512] {
            assert!(finest.contains(&(x, y)), "missing tile at ({}, {})", x, y);
        }
    }
    assert_eq!(tiles.iter().filter(|t| t.zoom == 1).count(), 4);
    assert_eq!(tiles.iter().filter(|t| t.zoom == 0).count(), 1);

    // One layout path for the whole run
    let paths: HashSet<&str> = tiles.iter().map(|t| t.layout_path.as_str()).collect();
    assert_eq!(paths.len(), 1);

    for tile in &tiles {
        assert!(is_valid_jpeg(&tile.file));
        let decoded = image::load_from_memory(&tile.file).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (256, 256));
    }

    let finalizes = server.finalizes();
    assert_eq!(finalizes.len(), 1);
    let finalize = &finalizes[0];
    assert_eq!(finalize.query["LayoutKey"], LAYOUT_KEY);
    assert_eq!(finalize.query["apikey"], SECRET);
    assert_eq!(finalize.query["MaxZoom"], "2");
    assert!(paths.contains(finalize.query["LayoutPath"].as_str()));
    assert_eq!(finalize.body["levelCount"], 3);
    assert_eq!(finalize.body["levels"][0]["width"], 1024);
    assert_eq!(finalize.body["levels"][0]["height"], 768);

    let progress = session.progress().unwrap();
    assert_eq!(progress.status, RunStatus::Completed);
    assert_eq!(progress.current, 17);
    assert_eq!(progress.total, 17);
    assert_eq!(progress.percentage, 100.0);
}

#[tokio::test]
async fn test_transient_errors_do_not_fail_run() {
    let server = MockLayoutServer::start().await;
    server.reply_on(1, StatusCode::SERVICE_UNAVAILABLE);
    server.reply_on(7, StatusCode::TOO_MANY_REQUESTS);
    server.finalize_replies(vec![StatusCode::BAD_GATEWAY]);

    let session = http_session();
    let result = session.start(process_config(&server, 250, 175, 64)).await;

    assert!(result.is_ok(), "run failed: {:?}", result);
    assert_eq!(server.tiles().len(), 17);
    assert_eq!(server.tile_calls(), 19);
    assert_eq!(server.finalizes().len(), 2);
}

// =============================================================================
// Failed and Cancelled Runs
// =============================================================================

#[tokio::test]
async fn test_forbidden_fifth_upload_errors() {
    let server = MockLayoutServer::start().await;
    server.reply_on(5, StatusCode::FORBIDDEN);

    let session = http_session();
    let err = session
        .start(process_config(&server, 1000, 700, 256))
        .await
        .unwrap_err();

    match &err {
        RunError::Upload { source, .. } => assert_eq!(source.status(), Some(403)),
        other => panic!("expected upload error, got {:?}", other),
    }
    assert!(server.finalizes().is_empty());
    assert!(server.tiles().iter().all(|t| t.zoom == 2));

    let progress = session.progress().unwrap();
    assert_eq!(progress.status, RunStatus::Error);
    assert_eq!(progress.message.as_deref(), Some(err.to_string().as_str()));
}

#[tokio::test]
async fn test_cancel_after_three_uploads() {
    let server = MockLayoutServer::start().await;
    let session = http_session();

    let canceller = session.clone();
    server.on_tile(move |call| {
        if call == 3 {
            canceller.cancel();
        }
    });

    let err = session
        .start(process_config(&server, 1000, 700, 256))
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(server.finalizes().is_empty());
    // Up to three other requests may already be in flight
    assert!(server.tile_calls() <= 6);

    // Nothing else arrives once the run has returned
    let calls = server.tile_calls();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.tile_calls(), calls);

    let progress = session.progress().unwrap();
    assert_eq!(progress.status, RunStatus::Cancelled);
    assert_eq!(progress.message.as_deref(), Some("Processing cancelled"));
    assert!(progress.current < progress.total);
}

#[tokio::test]
async fn test_unreachable_server_exhausts_retries() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let server = MockLayoutServer::start().await;
    let mut config = process_config(&server, 64, 64, 64);
    config.server_address = format!("http://{}", addr);

    let session = http_session();
    let err = session.start(config).await.unwrap_err();

    match err {
        RunError::Upload { source, .. } => {
            assert!(matches!(
                source,
                layout_uploader::UploadError::Exhausted { attempts: 3, .. }
            ));
        }
        other => panic!("expected upload error, got {:?}", other),
    }
}
