//! HTTP transport to the layout server.
//!
//! # Endpoints
//!
//! - `POST {server}/LayoutUtil/UploadTile/{layout_key}/{layout_path}/{zoom}/{x}/{y}?__sc__={secret}`
//!   multipart form with `layoutKey`, `zoom`, `column`, `row` and the `file` part
//! - `POST {server}/api/Location/LocationLayout/UpdatePath?LayoutKey=..&LayoutPath=..&apikey=..&MaxZoom=..`
//!   JSON [`LayoutMetadata`] body
//!
//! `x` and `y` are the pixel offsets of the tile's top-left corner in the level
//! canvas.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::server::{LayoutMetadata, LayoutServer, LayoutTarget};
use crate::error::UploadError;
use crate::pyramid::TileKey;
use crate::tile::{TILE_CONTENT_TYPE, TILE_FILE_NAME};

/// Per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// User-Agent sent with every request.
pub const USER_AGENT: &str = concat!("layout-uploader/", env!("CARGO_PKG_VERSION"));

/// Longest server error body kept in an error message.
const MAX_ERROR_BODY: usize = 200;

// =============================================================================
// HTTP Layout Server
// =============================================================================

/// [`LayoutServer`] over HTTP using a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct HttpLayoutServer {
    client: Client,
}

impl HttpLayoutServer {
    /// Create a transport with the default timeout.
    pub fn new() -> Result<Self, UploadError> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a transport with a custom per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| UploadError::Fatal {
                status: None,
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl LayoutServer for HttpLayoutServer {
    async fn send_tile(
        &self,
        target: &LayoutTarget,
        key: &TileKey,
        payload: Bytes,
    ) -> Result<(), UploadError> {
        let url = tile_url(target, key)?;

        let part = Part::bytes(payload.to_vec())
            .file_name(TILE_FILE_NAME)
            .mime_str(TILE_CONTENT_TYPE)
            .map_err(|e| UploadError::Fatal {
                status: None,
                message: e.to_string(),
            })?;

        let form = Form::new()
            .text("layoutKey", target.layout_key.clone())
            .text("zoom", key.zoom.to_string())
            .text("column", key.column.to_string())
            .text("row", key.row.to_string())
            .part("file", part);

        debug!(tile = %key, bytes = payload.len(), "Uploading tile");

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(classify_transport)?;

        check_response(response).await
    }

    async fn register_layout(
        &self,
        target: &LayoutTarget,
        metadata: &LayoutMetadata,
    ) -> Result<(), UploadError> {
        let url = finalize_url(target, metadata.max_zoom)?;

        debug!(
            layout_path = %target.layout_path,
            levels = metadata.level_count,
            "Registering layout"
        );

        let response = self
            .client
            .post(url)
            .json(metadata)
            .send()
            .await
            .map_err(classify_transport)?;

        check_response(response).await
    }
}

// =============================================================================
// URL Construction
// =============================================================================

/// Build the upload URL for one tile.
pub fn tile_url(target: &LayoutTarget, key: &TileKey) -> Result<Url, UploadError> {
    let raw = format!(
        "{}/LayoutUtil/UploadTile/{}/{}/{}/{}/{}",
        base(target),
        urlencoding::encode(&target.layout_key),
        urlencoding::encode(&target.layout_path),
        key.zoom,
        key.x(),
        key.y()
    );

    let mut url = parse(&raw)?;
    url.query_pairs_mut().append_pair("__sc__", &target.secret);
    Ok(url)
}

/// Build the layout registration URL.
pub fn finalize_url(target: &LayoutTarget, max_zoom: u32) -> Result<Url, UploadError> {
    let raw = format!("{}/api/Location/LocationLayout/UpdatePath", base(target));

    let mut url = parse(&raw)?;
    url.query_pairs_mut()
        .append_pair("LayoutKey", &target.layout_key)
        .append_pair("LayoutPath", &target.layout_path)
        .append_pair("apikey", &target.secret)
        .append_pair("MaxZoom", &max_zoom.to_string());
    Ok(url)
}

fn base(target: &LayoutTarget) -> &str {
    target.server.as_str().trim_end_matches('/')
}

fn parse(raw: &str) -> Result<Url, UploadError> {
    Url::parse(raw).map_err(|e| UploadError::Fatal {
        status: None,
        message: format!("Invalid upload URL: {}", e),
    })
}

// =============================================================================
// Error Classification
// =============================================================================

/// Map an HTTP status to an upload error.
///
/// 5xx and 429 (throttling) are retryable; every other failure status is fatal.
pub fn classify_status(status: StatusCode, message: impl Into<String>) -> UploadError {
    let message = message.into();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        UploadError::Retryable {
            status: Some(status.as_u16()),
            message,
        }
    } else {
        UploadError::Fatal {
            status: Some(status.as_u16()),
            message,
        }
    }
}

fn classify_transport(err: reqwest::Error) -> UploadError {
    if let Some(status) = err.status() {
        return classify_status(status, err.to_string());
    }
    if err.is_builder() {
        return UploadError::Fatal {
            status: None,
            message: err.to_string(),
        };
    }
    UploadError::Retryable {
        status: None,
        message: err.to_string(),
    }
}

async fn check_response(response: reqwest::Response) -> Result<(), UploadError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    let detail = match status.canonical_reason() {
        Some(reason) if body.trim().is_empty() => reason.to_string(),
        Some(reason) => format!("{}: {}", reason, truncate(body.trim(), MAX_ERROR_BODY)),
        None => truncate(body.trim(), MAX_ERROR_BODY).to_string(),
    };
    Err(classify_status(status, detail))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
