use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;

/// One row of a remote directory listing. Produced per poll cycle, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    pub filename: String,
    /// Server-local modification time as printed by the index page.
    pub modified: NaiveDateTime,
    /// Approximate size in bytes; `None` when the listing shows `-`.
    pub size: Option<u64>,
    pub description: String,
}

/// Invoked by the poller each time a watched file's timestamp advances.
#[async_trait]
pub trait WatchCallback: Send + Sync {
    async fn on_change(&self, watch: &PollWatch) -> Result<(), String>;
}

/// A file registered with the poller.
#[derive(Clone)]
pub struct PollWatch {
    /// Listing directory, ending in `/`.
    pub directory: String,
    pub filename: String,
    /// Modification time seen at the last successful callback.
    pub last_observed: Option<NaiveDateTime>,
    pub(crate) callback: Arc<dyn WatchCallback>,
}

impl PollWatch {
    pub fn new(
        directory: impl Into<String>,
        filename: impl Into<String>,
        callback: Arc<dyn WatchCallback>,
    ) -> Self {
        let mut directory = directory.into();
        if !directory.ends_with('/') {
            directory.push('/');
        }
        Self {
            directory,
            filename: filename.into(),
            last_observed: None,
            callback,
        }
    }

    /// Full remote URL of the watched file.
    pub fn url(&self) -> String {
        format!("{}{}", self.directory, self.filename)
    }

    /// True when `entry` is newer than anything seen (or nothing was seen yet).
    pub fn is_stale(&self, entry: &ListingEntry) -> bool {
        match self.last_observed {
            None => true,
            Some(seen) => entry.modified > seen,
        }
    }
}

impl fmt::Debug for PollWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollWatch")
            .field("directory", &self.directory)
            .field("filename", &self.filename)
            .field("last_observed", &self.last_observed)
            .finish_non_exhaustive()
    }
}
