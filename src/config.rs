//! Configuration for layout uploads.
//!
//! This module holds two layers of configuration:
//! - [`ProcessConfig`], the validated input of a single pipeline run
//! - the command-line interface ([`Cli`]), which builds a `ProcessConfig`
//!   from arguments and environment variables
//!
//! # Environment Variables
//!
//! All upload options can be set via environment variables with the `LAYOUT_` prefix:
//!
//! - `LAYOUT_SERVER` - Pipe-delimited `server_url|layout_key|secret`
//! - `LAYOUT_SERVER_URL` - Server base address
//! - `LAYOUT_KEY` - Layout key
//! - `LAYOUT_SECRET` - Layout secret
//! - `LAYOUT_BACKGROUND` - Padding color (default: #000000)
//! - `LAYOUT_TILE_SIZE` - Tile edge length in pixels (default: 256)
//! - `LAYOUT_JPEG_QUALITY` - JPEG quality (default: 80)
//! - `LAYOUT_POLL_INTERVAL_MS` - Progress polling interval (default: 500)

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use image::{DynamicImage, Rgba};
use serde::{Serialize, Serializer};
use url::Url;

use crate::error::ConfigError;
use crate::tile::{is_valid_quality, DEFAULT_JPEG_QUALITY};

// =============================================================================
// Default Values
// =============================================================================

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Smallest accepted tile edge length.
pub const MIN_TILE_SIZE: u32 = 64;

/// Largest accepted tile edge length.
pub const MAX_TILE_SIZE: u32 = 1024;

/// Default progress polling interval for the CLI (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

// =============================================================================
// Background Color
// =============================================================================

/// Color used to fill the padding around the image on each level canvas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BackgroundColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl BackgroundColor {
    pub const BLACK: BackgroundColor = BackgroundColor::new(0, 0, 0);
    pub const WHITE: BackgroundColor = BackgroundColor::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Opaque RGBA pixel for this color.
    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, 255])
    }
}

impl From<(u8, u8, u8)> for BackgroundColor {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self::new(r, g, b)
    }
}

impl fmt::Display for BackgroundColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Parses `#RRGGBB`, `RRGGBB` or `r,g,b`.
impl FromStr for BackgroundColor {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidColor(s.to_string());
        let trimmed = s.trim();

        if trimmed.contains(',') {
            let parts: Vec<&str> = trimmed.split(',').map(str::trim).collect();
            if parts.len() != 3 {
                return Err(invalid());
            }
            let channel = |p: &str| p.parse::<u8>().map_err(|_| invalid());
            return Ok(Self::new(
                channel(parts[0])?,
                channel(parts[1])?,
                channel(parts[2])?,
            ));
        }

        let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| invalid())
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl Serialize for BackgroundColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// =============================================================================
// Server Target
// =============================================================================

/// The three server fields of a run.
///
/// The UI transmits them as a single `server_url|layout_key|secret` string.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerTarget {
    pub server_address: String,
    pub layout_key: String,
    pub secret: String,
}

impl ServerTarget {
    pub fn new(
        server_address: impl Into<String>,
        layout_key: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            server_address: server_address.into(),
            layout_key: layout_key.into(),
            secret: secret.into(),
        }
    }

    /// Format back into the pipe-delimited form.
    pub fn to_pipe_string(&self) -> String {
        format!("{}|{}|{}", self.server_address, self.layout_key, self.secret)
    }
}

impl FromStr for ServerTarget {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('|').map(str::trim).collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(ConfigError::InvalidServerTarget(
                parts.iter().filter(|p| !p.is_empty()).count(),
            ));
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Debug for ServerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerTarget")
            .field("server_address", &self.server_address)
            .field("layout_key", &self.layout_key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Image Source
// =============================================================================

/// Where the pipeline reads its source image from.
#[derive(Clone)]
pub enum ImageSource {
    /// Decode from a file on disk
    Path(PathBuf),

    /// Already decoded by the caller
    Memory(Arc<DynamicImage>),
}

impl ImageSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        ImageSource::Path(path.into())
    }

    pub fn from_image(image: impl Into<DynamicImage>) -> Self {
        ImageSource::Memory(Arc::new(image.into()))
    }
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            ImageSource::Memory(img) => {
                write!(f, "Memory({}x{})", img.width(), img.height())
            }
        }
    }
}

// =============================================================================
// Process Configuration
// =============================================================================

/// Immutable input of one pipeline run.
#[derive(Clone)]
pub struct ProcessConfig {
    pub image: ImageSource,
    pub server_address: String,
    pub layout_key: String,
    pub secret: String,
    pub background_color: BackgroundColor,
    pub tile_size: u32,
    pub jpeg_quality: u8,
}

impl ProcessConfig {
    /// Create a configuration with default color, tile size and quality.
    pub fn new(image: ImageSource, target: ServerTarget) -> Self {
        Self {
            image,
            server_address: target.server_address,
            layout_key: target.layout_key,
            secret: target.secret,
            background_color: BackgroundColor::BLACK,
            tile_size: DEFAULT_TILE_SIZE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_background(mut self, color: impl Into<BackgroundColor>) -> Self {
        self.background_color = color.into();
        self
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Check every field before a run starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let ImageSource::Path(path) = &self.image {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::MissingField("image"));
            }
        }
        if self.server_address.trim().is_empty() {
            return Err(ConfigError::MissingField("server_address"));
        }
        if self.layout_key.trim().is_empty() {
            return Err(ConfigError::MissingField("layout_key"));
        }
        if self.secret.trim().is_empty() {
            return Err(ConfigError::MissingField("secret"));
        }
        if !(MIN_TILE_SIZE..=MAX_TILE_SIZE).contains(&self.tile_size) {
            return Err(ConfigError::TileSizeOutOfRange {
                tile_size: self.tile_size,
                min: MIN_TILE_SIZE,
                max: MAX_TILE_SIZE,
            });
        }
        if !is_valid_quality(self.jpeg_quality) {
            return Err(ConfigError::InvalidQuality(self.jpeg_quality));
        }
        self.server_url()?;
        Ok(())
    }

    /// Parse the server address as an absolute http(s) URL.
    pub fn server_url(&self) -> Result<Url, ConfigError> {
        parse_server_url(&self.server_address)
    }
}

impl fmt::Debug for ProcessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessConfig")
            .field("image", &self.image)
            .field("server_address", &self.server_address)
            .field("layout_key", &self.layout_key)
            .field("secret", &"<redacted>")
            .field("background_color", &self.background_color)
            .field("tile_size", &self.tile_size)
            .field("jpeg_quality", &self.jpeg_quality)
            .finish()
    }
}

/// Parse and check a server base address.
pub fn parse_server_url(address: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidServerAddress {
        address: address.to_string(),
        reason,
    };

    let url = Url::parse(address.trim()).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{}'", other))),
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// Layout Uploader - turns an image into a deep zoom layout on a server.
#[derive(Parser, Debug, Clone)]
#[command(name = "layout-uploader")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Tile an image and upload it as a layout
    Upload(UploadConfig),

    /// Print the zoom levels an image would produce, without uploading
    Plan(PlanConfig),
}

/// Arguments of the `upload` command.
#[derive(Args, Debug, Clone)]
pub struct UploadConfig {
    /// Image file to tile and upload.
    pub image: PathBuf,

    /// Server, layout key and secret as `server_url|layout_key|secret`.
    ///
    /// Takes precedence over the separate server flags.
    #[arg(long, env = "LAYOUT_SERVER")]
    pub server: Option<ServerTarget>,

    /// Server base address (e.g. https://layouts.example.com).
    #[arg(long, env = "LAYOUT_SERVER_URL")]
    pub server_url: Option<String>,

    /// Layout key identifying the server-side layout.
    #[arg(long, env = "LAYOUT_KEY")]
    pub layout_key: Option<String>,

    /// Secret authorizing uploads for the layout.
    #[arg(long, env = "LAYOUT_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Padding color (#RRGGBB or r,g,b).
    #[arg(long, default_value = "#000000", env = "LAYOUT_BACKGROUND")]
    pub background: BackgroundColor,

    /// Tile edge length in pixels (64-1024).
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "LAYOUT_TILE_SIZE")]
    pub tile_size: u32,

    /// JPEG quality for tiles (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "LAYOUT_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// How often progress is polled and logged, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS, env = "LAYOUT_POLL_INTERVAL_MS")]
    pub poll_interval_ms: u64,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl UploadConfig {
    /// Resolve the server fields from `--server` or the separate flags.
    pub fn resolve_target(&self) -> Result<ServerTarget, ConfigError> {
        if let Some(target) = &self.server {
            return Ok(target.clone());
        }

        let server_address = self
            .server_url
            .clone()
            .ok_or(ConfigError::MissingField("server_address"))?;
        let layout_key = self
            .layout_key
            .clone()
            .ok_or(ConfigError::MissingField("layout_key"))?;
        let secret = self
            .secret
            .clone()
            .ok_or(ConfigError::MissingField("secret"))?;

        Ok(ServerTarget::new(server_address, layout_key, secret))
    }

    /// Build and validate the run configuration.
    pub fn to_process_config(&self) -> Result<ProcessConfig, ConfigError> {
        let config = ProcessConfig::new(
            ImageSource::from_path(self.image.clone()),
            self.resolve_target()?,
        )
        .with_background(self.background)
        .with_tile_size(self.tile_size)
        .with_jpeg_quality(self.jpeg_quality);

        config.validate()?;
        Ok(config)
    }
}

/// Arguments of the `plan` command.
#[derive(Args, Debug, Clone)]
pub struct PlanConfig {
    /// Image file to plan for (only its header is read).
    pub image: PathBuf,

    /// Tile edge length in pixels (64-1024).
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "LAYOUT_TILE_SIZE")]
    pub tile_size: u32,

    /// Coarsest zoom level to include.
    #[arg(long)]
    pub min_zoom: Option<u32>,

    /// Finest zoom level to include.
    #[arg(long)]
    pub max_zoom: Option<u32>,

    /// Print the plan as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl PlanConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_TILE_SIZE..=MAX_TILE_SIZE).contains(&self.tile_size) {
            return Err(ConfigError::TileSizeOutOfRange {
                tile_size: self.tile_size,
                min: MIN_TILE_SIZE,
                max: MAX_TILE_SIZE,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
