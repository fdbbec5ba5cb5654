//! `aeronav-dcs`: chart supplement (DCS) edition cache.
//!
//! # Overview
//!
//! [`store::ChartSupplementStore`] downloads each 56-day edition's zip bundle
//! into `<cache>/dcs/DCS_<YYYYMMDD>/`, loads the edition's airport index and
//! serves every page of an airport's documents as standalone PDFs, optionally
//! bundled into one zip.

pub mod archive;
pub mod catalogue;
pub mod error;
pub mod index;
pub mod pdf;
pub mod store;

pub use archive::{build_zip, ARCHIVE_MEDIA_TYPE};
pub use error::{DcsError, Result};
pub use index::{ingest_index, AirportChartEntry};
pub use pdf::split_pages;
pub use store::{ChartSupplementStore, RefreshReport};
