use thiserror::Error;

/// Failure of a single remote GET.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The request never produced a response (DNS, connect, timeout, body read).
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

impl FetchError {
    /// True when the server explicitly reported the resource as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::Status { status: 404, .. })
    }
}

#[derive(Debug, Error)]
pub enum AeronavError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}

impl AeronavError {
    /// Short error code string for callers that translate errors into responses.
    pub fn code(&self) -> &'static str {
        match self {
            AeronavError::Config(_) => "CONFIG_ERROR",
            AeronavError::Io(_) => "IO_ERROR",
            AeronavError::Fetch(_) => "FETCH_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, AeronavError>;
