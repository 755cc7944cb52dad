//! Wire format and retry behavior of the HTTP transport.

use axum::http::StatusCode;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use url::Url;

use layout_uploader::pyramid::{plan_pyramid, TileKey};
use layout_uploader::upload::USER_AGENT;
use layout_uploader::{
    BackgroundColor, HttpLayoutServer, LayoutMetadata, LayoutServer, LayoutTarget, RetryPolicy,
    UploadClient, UploadError,
};

use super::test_utils::{MockLayoutServer, LAYOUT_KEY, SECRET};

fn target(server: &MockLayoutServer) -> LayoutTarget {
    LayoutTarget::new(Url::parse(&server.base_url()).unwrap(), LAYOUT_KEY, SECRET)
        .with_layout_path("2b7e1516-28ae-4d2a-abf7-158809cf4f3c")
}

fn client() -> UploadClient<HttpLayoutServer> {
    UploadClient::with_policy(HttpLayoutServer::new().unwrap(), RetryPolicy::no_delay(3))
}

const PAYLOAD: &[u8] = &[0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9];

// =============================================================================
// Tile Upload
// =============================================================================

#[tokio::test]
async fn test_tile_request_format() {
    let server = MockLayoutServer::start().await;
    let transport = HttpLayoutServer::new().unwrap();

    transport
        .send_tile(
            &target(&server),
            &TileKey::new(3, 2, 1, 256),
            Bytes::from_static(PAYLOAD),
        )
        .await
        .unwrap();

    let tiles = server.tiles();
    assert_eq!(tiles.len(), 1);
    let tile = &tiles[0];

    assert_eq!(tile.path_layout_key, LAYOUT_KEY);
    assert_eq!(tile.layout_path, "2b7e1516-28ae-4d2a-abf7-158809cf4f3c");
    assert_eq!((tile.zoom, tile.x, tile.y), (3, 512, 256));
    assert_eq!(tile.query["__sc__"], SECRET);
    assert_eq!(tile.user_agent.as_deref(), Some(USER_AGENT));

    assert_eq!(tile.fields["layoutKey"], LAYOUT_KEY);
    assert_eq!(tile.fields["zoom"], "3");
    assert_eq!(tile.fields["column"], "2");
    assert_eq!(tile.fields["row"], "1");
    assert_eq!(tile.file_name.as_deref(), Some("tile.jpg"));
    assert_eq!(tile.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(tile.file, PAYLOAD);
}

#[tokio::test]
async fn test_status_classification() {
    let server = MockLayoutServer::start().await;
    server.reply_on(1, StatusCode::INTERNAL_SERVER_ERROR);
    server.reply_on(2, StatusCode::TOO_MANY_REQUESTS);
    server.reply_on(3, StatusCode::NOT_FOUND);

    let transport = HttpLayoutServer::new().unwrap();
    let key = TileKey::new(0, 0, 0, 256);
    let t = target(&server);

    let first = transport.send_tile(&t, &key, Bytes::from_static(PAYLOAD)).await;
    let second = transport.send_tile(&t, &key, Bytes::from_static(PAYLOAD)).await;
    let third = transport.send_tile(&t, &key, Bytes::from_static(PAYLOAD)).await;

    assert!(first.unwrap_err().is_retryable());
    assert!(second.unwrap_err().is_retryable());
    let third = third.unwrap_err();
    assert!(!third.is_retryable());
    assert_eq!(third.status(), Some(404));
}

#[tokio::test]
async fn test_server_error_retried_then_succeeds() {
    let server = MockLayoutServer::start().await;
    server.reply_on(1, StatusCode::SERVICE_UNAVAILABLE);
    server.reply_on(2, StatusCode::BAD_GATEWAY);

    client()
        .upload_tile(
            &target(&server),
            &TileKey::new(0, 0, 0, 256),
            Bytes::from_static(PAYLOAD),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(server.tile_calls(), 3);
    assert_eq!(server.tiles().len(), 1);
}

#[tokio::test]
async fn test_retry_exhaustion_is_fatal() {
    let server = MockLayoutServer::start().await;
    for call in 1..=3 {
        server.reply_on(call, StatusCode::SERVICE_UNAVAILABLE);
    }

    let err = client()
        .upload_tile(
            &target(&server),
            &TileKey::new(0, 0, 0, 256),
            Bytes::from_static(PAYLOAD),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Exhausted { attempts: 3, .. }));
    assert!(!err.is_retryable());
    assert_eq!(server.tile_calls(), 3);
}

#[tokio::test]
async fn test_client_error_not_retried() {
    let server = MockLayoutServer::start().await;
    server.reply_on(1, StatusCode::UNAUTHORIZED);

    let err = client()
        .upload_tile(
            &target(&server),
            &TileKey::new(0, 0, 0, 256),
            Bytes::from_static(PAYLOAD),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert_eq!(server.tile_calls(), 1);
}

// =============================================================================
// Finalize
// =============================================================================

#[tokio::test]
async fn test_finalize_request_format() {
    let server = MockLayoutServer::start().await;
    let t = target(&server);
    let plan = plan_pyramid(1000, 700, 256).unwrap();
    let metadata = LayoutMetadata::from_plan(&plan, &t, BackgroundColor::new(255, 255, 255));

    client()
        .finalize(&t, &metadata, &CancellationToken::new())
        .await
        .unwrap();

    let finalizes = server.finalizes();
    assert_eq!(finalizes.len(), 1);
    let finalize = &finalizes[0];

    assert_eq!(finalize.query["LayoutKey"], LAYOUT_KEY);
    assert_eq!(
        finalize.query["LayoutPath"],
        "2b7e1516-28ae-4d2a-abf7-158809cf4f3c"
    );
    assert_eq!(finalize.query["apikey"], SECRET);
    assert_eq!(finalize.query["MaxZoom"], "2");

    assert_eq!(finalize.body["layoutKey"], LAYOUT_KEY);
    assert_eq!(finalize.body["sourceWidth"], 1000);
    assert_eq!(finalize.body["sourceHeight"], 700);
    assert_eq!(finalize.body["tileSize"], 256);
    assert_eq!(finalize.body["backgroundColor"], "#ffffff");
    assert_eq!(finalize.body["levels"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_finalize_rejection() {
    let server = MockLayoutServer::start().await;
    server.finalize_replies(vec![StatusCode::FORBIDDEN]);

    let t = target(&server);
    let plan = plan_pyramid(64, 64, 64).unwrap();
    let metadata = LayoutMetadata::from_plan(&plan, &t, BackgroundColor::BLACK);

    let err = client()
        .finalize(&t, &metadata, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(403));
    assert_eq!(server.finalizes().len(), 1);
}
