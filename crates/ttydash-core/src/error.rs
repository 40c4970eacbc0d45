use thiserror::Error;

/// Engine-wide error types for ttydash.
#[derive(Error, Debug)]
pub enum AppError {
    /// The browser process could not be started.
    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    /// Navigation, readiness wait, timeout or extractor failure for one page.
    #[error("Extraction failed for {url}: {cause}")]
    ExtractionFailed { url: String, cause: String },

    /// An external media tool (clip downloader or transcoder) failed or
    /// timed out.
    #[error("Transcode failed: {0}")]
    TranscodeFailed(String),

    /// A still image could not be decoded into pixels.
    #[error("Decode failed for {path}: {cause}")]
    DecodeFailed { path: String, cause: String },

    /// The session was released and cannot be reused.
    #[error("Browser session is closed")]
    SessionClosed,

    /// The browser did not start in time.
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// The clip cache directory could not be allocated.
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Shorthand for an [`AppError::ExtractionFailed`].
    pub fn extraction(url: impl Into<String>, cause: impl ToString) -> Self {
        AppError::ExtractionFailed {
            url: url.into(),
            cause: cause.to_string(),
        }
    }

    /// Returns true if the error means the browser process itself is gone,
    /// rather than a single page having failed.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, AppError::LaunchFailed(_) | AppError::SessionClosed)
    }

    /// Returns true if this error should extend the launch backoff.
    pub fn should_back_off(&self) -> bool {
        matches!(self, AppError::LaunchFailed(_) | AppError::Timeout(_))
    }

    /// Returns true when an external tool or a still image failed, as
    /// opposed to the cache directory or the host.
    pub fn is_pipeline_failure(&self) -> bool {
        matches!(
            self,
            AppError::TranscodeFailed(_) | AppError::DecodeFailed { .. } | AppError::Io(_)
        )
    }
}
