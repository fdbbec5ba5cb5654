//! `aeronav-dtpp`: terminal procedures (DTPP) metadata freshness.
//!
//! # Overview
//!
//! The metadata file is republished under a `YYMM` code whose calendar month
//! does not always match the revision in force. [`resolver::VersionResolver`]
//! fetches candidates into `<cache>/dtpp/DTPP_<YYMM>.xml` and trusts only the
//! validity window each file declares about itself.
//! [`watcher::PublicationWatcher`] re-resolves once per window and notifies
//! [`watcher::VersionSubscriber`]s when the version changes.

pub mod error;
pub mod header;
pub mod resolver;
pub mod version;
pub mod watcher;

pub use error::{DtppError, Result};
pub use header::ValidityHeader;
pub use resolver::{ResolvedVersion, VersionResolver};
pub use version::{VersionFile, VersionId};
pub use watcher::{PublicationWatcher, PublicationWatcherBuilder, VersionSubscriber};
