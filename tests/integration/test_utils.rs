//! Test utilities for integration tests.
//!
//! This module provides an in-process mock layout server (axum on a random
//! local port) that records every tile and finalize request, plus helpers for
//! building source images and run configurations.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use image::{DynamicImage, Rgba, RgbaImage};
use tokio::net::TcpListener;

use layout_uploader::{BackgroundColor, ImageSource, ProcessConfig, ServerTarget};

pub const LAYOUT_KEY: &str = "lobby";
pub const SECRET: &str = "s3cret";

// =============================================================================
// Recorded Requests
// =============================================================================

/// One tile upload as seen by the server.
#[derive(Debug, Clone, Default)]
pub struct RecordedTile {
    pub path_layout_key: String,
    pub layout_path: String,
    pub zoom: u32,
    pub x: u32,
    pub y: u32,
    pub query: HashMap<String, String>,
    pub user_agent: Option<String>,
    pub fields: HashMap<String, String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub file: Vec<u8>,
}

/// One finalize call as seen by the server.
#[derive(Debug, Clone)]
pub struct RecordedFinalize {
    pub query: HashMap<String, String>,
    pub body: serde_json::Value,
}

type TileHook = Box<dyn Fn(u32) + Send + Sync>;

#[derive(Default)]
struct ServerState {
    tile_calls: AtomicU32,
    tiles: Mutex<Vec<RecordedTile>>,
    finalizes: Mutex<Vec<RecordedFinalize>>,
    tile_replies: Mutex<HashMap<u32, StatusCode>>,
    finalize_replies: Mutex<Vec<StatusCode>>,
    on_tile: Mutex<Option<TileHook>>,
}

// =============================================================================
// Mock Layout Server
// =============================================================================

/// A layout server listening on 127.0.0.1 with a random port.
pub struct MockLayoutServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
}

impl MockLayoutServer {
    pub async fn start() -> Self {
        let state = Arc::new(ServerState::default());

        let app = Router::new()
            .route(
                "/LayoutUtil/UploadTile/{layout_key}/{layout_path}/{zoom}/{x}/{y}",
                post(upload_tile),
            )
            .route("/api/Location/LocationLayout/UpdatePath", post(update_path))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Answer the n-th tile request (1-based, counting retries) with `status`.
    pub fn reply_on(&self, call: u32, status: StatusCode) {
        self.state.tile_replies.lock().unwrap().insert(call, status);
    }

    /// Answer the next finalize calls with these statuses, in order.
    pub fn finalize_replies(&self, statuses: Vec<StatusCode>) {
        *self.state.finalize_replies.lock().unwrap() = statuses;
    }

    /// Run `hook` with the call number on every tile request.
    pub fn on_tile(&self, hook: impl Fn(u32) + Send + Sync + 'static) {
        *self.state.on_tile.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn tile_calls(&self) -> u32 {
        self.state.tile_calls.load(Ordering::SeqCst)
    }

    /// Tiles accepted with 200.
    pub fn tiles(&self) -> Vec<RecordedTile> {
        self.state.tiles.lock().unwrap().clone()
    }

    pub fn finalizes(&self) -> Vec<RecordedFinalize> {
        self.state.finalizes.lock().unwrap().clone()
    }

    pub fn target(&self) -> ServerTarget {
        ServerTarget::new(self.base_url(), LAYOUT_KEY, SECRET)
    }
}

async fn upload_tile(
    State(state): State<Arc<ServerState>>,
    Path((layout_key, layout_path, zoom, x, y)): Path<(String, String, u32, u32, u32)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> StatusCode {
    let mut tile = RecordedTile {
        path_layout_key: layout_key,
        layout_path,
        zoom,
        x,
        y,
        query,
        user_agent: headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        ..Default::default()
    };

    // Always drain the body before answering
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            tile.file_name = field.file_name().map(str::to_string);
            tile.content_type = field.content_type().map(str::to_string);
            tile.file = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        } else {
            let value = field.text().await.unwrap_or_default();
            tile.fields.insert(name, value);
        }
    }

    let call = state.tile_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if let Some(hook) = state.on_tile.lock().unwrap().as_ref() {
        hook(call);
    }

    if let Some(status) = state.tile_replies.lock().unwrap().get(&call) {
        return *status;
    }

    state.tiles.lock().unwrap().push(tile);
    StatusCode::OK
}

async fn update_path(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    state
        .finalizes
        .lock()
        .unwrap()
        .push(RecordedFinalize { query, body });

    let mut replies = state.finalize_replies.lock().unwrap();
    if replies.is_empty() {
        StatusCode::OK
    } else {
        replies.remove(0)
    }
}

// =============================================================================
// Image and Config Helpers
// =============================================================================

/// A gradient image so tiles are not trivially uniform.
pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
            255,
        ])
    });
    DynamicImage::ImageRgba8(image)
}

/// Run configuration pointing at the mock server.
pub fn process_config(
    server: &MockLayoutServer,
    width: u32,
    height: u32,
    tile_size: u32,
) -> ProcessConfig {
    ProcessConfig::new(
        ImageSource::from_image(gradient_image(width, height)),
        server.target(),
    )
    .with_tile_size(tile_size)
    .with_background(BackgroundColor::BLACK)
}

/// Check for JPEG SOI and EOI markers.
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() >= 4
        && data[0] == 0xFF
        && data[1] == 0xD8
        && data[data.len() - 2] == 0xFF
        && data[data.len() - 1] == 0xD9
}
