//! `aeronav-scheduler`: publication calendars and remote listing polling.
//!
//! # Overview
//!
//! [`cycle::EditionCycle`] maps any date onto a fixed-length publication
//! calendar and reports which editions are missing locally.
//! [`poller::RemoteListingPoller`] fetches an Apache directory index on a
//! fixed interval and fires a [`types::WatchCallback`] whenever a watched
//! file's modification time advances.
//!
//! | Poll outcome       | Next attempt after        |
//! |--------------------|---------------------------|
//! | Success            | `poll_interval_secs`      |
//! | Callback failure   | `poll_interval_secs`      |
//! | Listing failure    | `failure_cooldown_secs`   |

pub mod cycle;
pub mod error;
pub mod listing;
pub mod poller;
pub mod types;

pub use cycle::{edition_dir_name, edition_path, parse_edition_dir_name, EditionCycle};
pub use error::{Result, SchedulerError};
pub use listing::{index_listing, parse_listing};
pub use poller::{PollStatus, PollerHandle, RemoteListingPoller};
pub use types::{ListingEntry, PollWatch, WatchCallback};
