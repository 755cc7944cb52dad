use thiserror::Error;

/// Errors raised while validating a run configuration.
///
/// These are surfaced before any work starts; no tile is rendered or uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required field is empty
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Tile size outside the supported range
    #[error("Tile size {tile_size} is out of range (must be {min}-{max})")]
    TileSizeOutOfRange { tile_size: u32, min: u32, max: u32 },

    /// JPEG quality outside 1-100
    #[error("Invalid JPEG quality: {0} (must be 1-100)")]
    InvalidQuality(u8),

    /// Server address is not an absolute http(s) URL
    #[error("Invalid server address '{address}': {reason}")]
    InvalidServerAddress { address: String, reason: String },

    /// Pipe-delimited server string could not be split into its three fields
    #[error("Invalid server target: expected 'server_url|layout_key|secret', got {0} field(s)")]
    InvalidServerTarget(usize),

    /// Background color could not be parsed
    #[error("Invalid background color '{0}': expected #RRGGBB or r,g,b")]
    InvalidColor(String),
}

/// Errors produced by the pyramid planner for degenerate inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    /// Source width or height is zero
    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// Tile size is zero
    #[error("Invalid tile size: {0}")]
    InvalidTileSize(u32),

    /// Minimum zoom is above maximum zoom
    #[error("Invalid zoom bounds: min {min_zoom} is greater than max {max_zoom}")]
    InvalidZoomBounds { min_zoom: u32, max_zoom: u32 },
}

/// Errors raised while decoding, resizing, slicing or encoding image data.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// The source image could not be opened or decoded
    #[error("Failed to open image: {message}")]
    Decode { message: String },

    /// The level canvas could not be produced
    #[error("Failed to render zoom level {zoom}: {message}")]
    Canvas { zoom: u32, message: String },

    /// A tile could not be encoded
    #[error("Failed to encode JPEG: {message}")]
    Encode { message: String },

    /// A blocking render or encode task panicked or was aborted
    #[error("Render task failed: {0}")]
    Task(String),
}

/// Errors from a tile upload or layout registration call.
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    /// Transient failure (network error, 5xx, throttling); safe to retry
    #[error("Transient upload failure{}: {message}", status_suffix(.status))]
    Retryable { status: Option<u16>, message: String },

    /// Permanent failure (4xx other than throttling); never retried
    #[error("Upload rejected{}: {message}", status_suffix(.status))]
    Fatal { status: Option<u16>, message: String },

    /// Transient failures persisted past the retry budget
    #[error("Upload failed after {attempts} attempt(s): {message}")]
    Exhausted { attempts: u32, message: String },

    /// The run was cancelled while waiting to retry
    #[error("Upload cancelled")]
    Cancelled,
}

impl UploadError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadError::Retryable { .. })
    }

    /// HTTP status reported by the server, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::Retryable { status, .. } | UploadError::Fatal { status, .. } => *status,
            _ => None,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {})", code),
        None => String::new(),
    }
}

/// Terminal outcome of a failed, cancelled or rejected run.
///
/// The `Display` text of this error is the single message reported to the caller.
#[derive(Debug, Clone, Error)]
pub enum RunError {
    /// Configuration rejected before the run started
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Image dimensions or tile size unusable for planning
    #[error("Planning failed: {0}")]
    Planning(#[from] PlanningError),

    /// Decode, resize or encode failure
    #[error("{0}")]
    Render(#[from] RenderError),

    /// A tile upload failed permanently
    #[error("Upload failed for tile {tile}: {source}")]
    Upload {
        tile: String,
        #[source]
        source: UploadError,
    },

    /// All tiles uploaded but the layout could not be registered
    #[error("Failed to finalize upload: {0}")]
    Finalize(UploadError),

    /// The caller cancelled the run
    #[error("Processing cancelled")]
    Cancelled,

    /// `start` was called while another run is active
    #[error("A run is already in progress")]
    AlreadyRunning,

    /// An orchestrator was asked to run twice
    #[error("This run has already been started")]
    AlreadyStarted,
}

impl RunError {
    /// Whether this outcome is a user cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunError::Cancelled)
    }
}
