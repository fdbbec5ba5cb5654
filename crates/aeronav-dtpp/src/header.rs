//! Validity header embedded in the procedures metadata file.
//!
//! The root `digital_tpp` element carries the cycle id and the effective window:
//!
//! ```xml
//! <digital_tpp cycle="2506" from_edate="0901Z  06/12/25" to_edate="0901Z  07/10/25">
//! ```

use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

const ROOT_ELEMENT: &[u8] = b"digital_tpp";

/// Self-declared validity window of one metadata revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidityHeader {
    pub cycle: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
}

impl ValidityHeader {
    /// True while `now` lies within `[valid_from, valid_to]`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && now <= self.valid_to
    }
}

fn edate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4})Z\s+(\d+/\d+/\d+)").expect("edate pattern is valid"))
}

/// Parse an effective-date attribute such as `0901Z 06/12/25` (UTC).
pub fn parse_edate(raw: &str) -> Option<DateTime<Utc>> {
    let caps = edate_re().captures(raw)?;
    let joined = format!("{} {}", caps.get(1)?.as_str(), caps.get(2)?.as_str());
    NaiveDateTime::parse_from_str(&joined, "%H%M %m/%d/%y")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Read the header of the file at `path`, stopping at the root element.
///
/// Returns `None` for a missing file, malformed XML, a missing root element
/// or unparsable attributes; all of these mean "not valid".
pub fn read_header(path: &Path) -> Option<ValidityHeader> {
    let mut reader = match Reader::from_file(path) {
        Ok(reader) => reader,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no readable metadata file");
            return None;
        }
    };

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == ROOT_ELEMENT => {
                let header = header_from_element(&e);
                if header.is_none() {
                    debug!(path = %path.display(), "metadata root element lacks a usable header");
                }
                return header;
            }
            Ok(Event::Eof) => {
                debug!(path = %path.display(), "metadata file has no root element");
                return None;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(path = %path.display(), error = %e, "malformed metadata file");
                return None;
            }
        }
        buf.clear();
    }
}

/// Parse a header from an in-memory document.
pub fn parse_header(xml: &str) -> Option<ValidityHeader> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().ok()? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == ROOT_ELEMENT => {
                return header_from_element(&e);
            }
            Event::Eof => return None,
            _ => {}
        }
    }
}

fn header_from_element(e: &BytesStart<'_>) -> Option<ValidityHeader> {
    let attr = |name: &str| -> Option<String> {
        e.try_get_attribute(name)
            .ok()
            .flatten()
            .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
    };
    Some(ValidityHeader {
        cycle: attr("cycle")?,
        valid_from: parse_edate(&attr("from_edate")?)?,
        valid_to: parse_edate(&attr("to_edate")?)?,
    })
}
