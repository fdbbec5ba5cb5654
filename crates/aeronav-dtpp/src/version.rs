use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::error::{DtppError, Result};
use crate::header::{read_header, ValidityHeader};

/// One revision of the procedures metadata file, named `YYMM` upstream.
///
/// Some years carry an extra `YY13` revision published between December and
/// the following January. It navigates like December: its predecessor is
/// November and its successor is January of the next year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VersionId {
    Monthly { year: i32, month: u32 },
    ThirteenthPeriod { year: i32 },
}

impl VersionId {
    /// Version implied by the calendar month of `date`.
    pub fn for_date(date: NaiveDate) -> Self {
        VersionId::Monthly {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn thirteenth(year: i32) -> Self {
        VersionId::ThirteenthPeriod { year }
    }

    /// Parse a `YYMM` code; `13` as the month selects the thirteenth period.
    pub fn parse(code: &str) -> Result<Self> {
        let invalid = || DtppError::InvalidVersion(code.to_string());
        if code.len() != 4 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let yy: i32 = code[..2].parse().map_err(|_| invalid())?;
        let mm: u32 = code[2..].parse().map_err(|_| invalid())?;
        let year = 2000 + yy;
        match mm {
            1..=12 => Ok(VersionId::Monthly { year, month: mm }),
            13 => Ok(VersionId::ThirteenthPeriod { year }),
            _ => Err(invalid()),
        }
    }

    pub fn year(&self) -> i32 {
        match *self {
            VersionId::Monthly { year, .. } | VersionId::ThirteenthPeriod { year } => year,
        }
    }

    /// Calendar month, or 13 for the thirteenth period.
    pub fn month(&self) -> u32 {
        match *self {
            VersionId::Monthly { month, .. } => month,
            VersionId::ThirteenthPeriod { .. } => 13,
        }
    }

    /// Upstream code, e.g. `2505` or `2513`.
    pub fn code(&self) -> String {
        format!("{:02}{:02}", self.year().rem_euclid(100), self.month())
    }

    pub fn next(&self) -> Self {
        match *self {
            VersionId::Monthly { year, month: 12 } | VersionId::ThirteenthPeriod { year } => {
                VersionId::Monthly {
                    year: year + 1,
                    month: 1,
                }
            }
            VersionId::Monthly { year, month } => VersionId::Monthly {
                year,
                month: month + 1,
            },
        }
    }

    pub fn previous(&self) -> Self {
        match *self {
            VersionId::Monthly { year, month: 1 } => VersionId::Monthly {
                year: year - 1,
                month: 12,
            },
            VersionId::Monthly { year, month } => VersionId::Monthly {
                year,
                month: month - 1,
            },
            VersionId::ThirteenthPeriod { year } => VersionId::Monthly { year, month: 11 },
        }
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

/// A version together with its slot in the cache directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionFile {
    pub id: VersionId,
    pub path: PathBuf,
}

impl VersionFile {
    pub fn new(cache_dir: &Path, id: VersionId) -> Self {
        Self {
            id,
            path: cache_dir.join(Self::file_name(id)),
        }
    }

    /// `DTPP_<code>.xml`
    pub fn file_name(id: VersionId) -> String {
        format!("DTPP_{}.xml", id.code())
    }

    /// Inverse of [`file_name`](Self::file_name); `None` for unrelated files.
    pub fn id_from_file_name(name: &str) -> Option<VersionId> {
        let code = name.strip_prefix("DTPP_")?.strip_suffix(".xml")?;
        VersionId::parse(code).ok()
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Header of the cached file; `None` when absent or unparsable.
    pub fn read_header(&self) -> Option<ValidityHeader> {
        read_header(&self.path)
    }

    /// Remove the cached file. A file that is already gone is not an error.
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
