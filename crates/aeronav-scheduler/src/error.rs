use aeronav_core::FetchError;
use thiserror::Error;

/// Errors that can occur within a poll cycle.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The listing page could not be fetched.
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// The listing page was fetched but is not a directory index.
    #[error("Invalid listing: {0}")]
    Listing(String),

    /// A watch callback reported a failure; its timestamp was not advanced.
    #[error("Callback for {filename} failed: {reason}")]
    Callback { filename: String, reason: String },
}

impl SchedulerError {
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::Fetch(_) => "FETCH_ERROR",
            SchedulerError::Listing(_) => "LISTING_ERROR",
            SchedulerError::Callback { .. } => "CALLBACK_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
