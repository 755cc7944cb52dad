//! Upload of tiles and layout registration.
//!
//! # Layers
//!
//! - [`LayoutServer`]: single-attempt transport (one request per call)
//! - [`HttpLayoutServer`]: the reqwest implementation used in production
//! - [`UploadClient`]: retry with exponential backoff and cancellation on top
//!   of any `LayoutServer`
//!
//! Tests substitute their own `LayoutServer` to script failures without a
//! network.

mod transport;
mod retry;
mod server;

pub use transport::{
    classify_status, finalize_url, tile_url, HttpLayoutServer, DEFAULT_REQUEST_TIMEOUT, USER_AGENT,
};
pub use retry::{
    RetryPolicy, UploadClient, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
};
pub use server::{LayoutMetadata, LayoutServer, LayoutTarget, LevelMetadata};
