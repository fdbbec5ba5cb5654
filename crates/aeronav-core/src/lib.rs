//! `aeronav-core`: configuration, errors and the capabilities (HTTP fetch,
//! clock) that the publication services consume.

pub mod clock;
pub mod config;
pub mod error;
pub mod fetch;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AeronavConfig;
pub use error::{AeronavError, FetchError, Result};
pub use fetch::{Fetcher, HttpFetcher, MemoryFetcher};
