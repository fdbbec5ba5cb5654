use aeronav_core::FetchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DtppError {
    /// Resolution exhausted its attempts without a version valid right now.
    #[error("No valid version found (last tried {last_tried})")]
    NoValidVersion { last_tried: String },

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid version code: {0}")]
    InvalidVersion(String),
}

impl DtppError {
    pub fn code(&self) -> &'static str {
        match self {
            DtppError::NoValidVersion { .. } => "NO_VALID_VERSION",
            DtppError::Fetch(_) => "FETCH_ERROR",
            DtppError::Io(_) => "IO_ERROR",
            DtppError::InvalidVersion(_) => "INVALID_VERSION",
        }
    }
}

pub type Result<T> = std::result::Result<T, DtppError>;
