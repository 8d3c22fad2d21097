use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Duplex channel errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection to {url} failed: {message}")]
    Connect { url: String, message: String },

    #[error("Channel is not open")]
    NotOpen,

    #[error("Analysis request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Connection dropped: {message}")]
    Dropped { message: String },

    #[error("Reconnection gave up after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Backend reported failure: {message}")]
    Remote { message: String },

    #[error("Malformed frame: {message}")]
    Protocol { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Analysis backend HTTP errors
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Extension-side relay errors
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Tab creation failed: {message}")]
    TabCreation { message: String },

    #[error("Delivery to tab {tab_id} failed: {message}")]
    Delivery { tab_id: i64, message: String },

    #[error("Message bus unavailable: {message}")]
    Bus { message: String },

    #[error("Relay rejected the request: {message}")]
    Rejected { message: String },
}

/// Local, user-facing validation failures
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Could not extract a video id from {url}")]
    VideoId { url: String },

    #[error("An analysis is already in progress")]
    AlreadyAnalyzing,

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type alias for relay operations
pub type RelayResult<T> = Result<T, RelayError>;
