use std::path::PathBuf;

use aeronav_core::FetchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DcsError {
    /// The airport has no entry in the current edition's index.
    #[error("Chart supplement not found: {icao}")]
    NotFound { icao: String },

    /// The index references a document that is not on disk.
    #[error("Chart supplement document missing from cache: {}", path.display())]
    MissingDocument { path: PathBuf },

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DcsError {
    pub fn code(&self) -> &'static str {
        match self {
            DcsError::NotFound { .. } => "NOT_FOUND",
            DcsError::MissingDocument { .. } => "MISSING_DOCUMENT",
            DcsError::Fetch(_) => "FETCH_ERROR",
            DcsError::Archive(_) => "ARCHIVE_ERROR",
            DcsError::Index(_) => "INDEX_ERROR",
            DcsError::Pdf(_) => "PDF_ERROR",
            DcsError::Io(_) => "IO_ERROR",
        }
    }

    /// Expected lookup miss, as opposed to a cache or network failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DcsError::NotFound { .. })
    }
}

impl From<zip::result::ZipError> for DcsError {
    fn from(e: zip::result::ZipError) -> Self {
        DcsError::Archive(e.to_string())
    }
}

impl From<lopdf::Error> for DcsError {
    fn from(e: lopdf::Error) -> Self {
        DcsError::Pdf(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DcsError>;
