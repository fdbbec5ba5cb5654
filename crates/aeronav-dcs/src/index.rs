//! Airport index (`afd_<date>.xml`) shipped inside each chart supplement edition.

use std::collections::HashMap;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use tracing::debug;

use crate::error::{DcsError, Result};

/// One airport's entry in an edition index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AirportChartEntry {
    pub name: String,
    pub city: String,
    /// `None` when the index leaves the element empty.
    pub navaid_name: Option<String>,
    /// Document filenames, in index order.
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Name,
    City,
    Id,
    Navaid,
    Pdf,
}

impl Field {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"aptname" => Some(Field::Name),
            b"aptcity" => Some(Field::City),
            b"aptid" => Some(Field::Id),
            b"navidname" => Some(Field::Navaid),
            b"pdf" => Some(Field::Pdf),
            _ => None,
        }
    }
}

#[derive(Default)]
struct AirportBuilder {
    id: String,
    name: String,
    city: String,
    navaid: String,
    files: Vec<String>,
}

impl AirportBuilder {
    fn push_text(&mut self, field: Field, text: &str) {
        match field {
            Field::Name => self.name.push_str(text),
            Field::City => self.city.push_str(text),
            Field::Id => self.id.push_str(text),
            Field::Navaid => self.navaid.push_str(text),
            Field::Pdf => {
                if let Some(last) = self.files.last_mut() {
                    last.push_str(text);
                }
            }
        }
    }

    fn finish(self) -> Option<(String, AirportChartEntry)> {
        let id = self.id.trim().to_ascii_uppercase();
        if id.is_empty() {
            return None;
        }
        let navaid = self.navaid.trim();
        Some((
            id,
            AirportChartEntry {
                name: self.name.trim().to_string(),
                city: self.city.trim().to_string(),
                navaid_name: (!navaid.is_empty()).then(|| navaid.to_string()),
                files: self
                    .files
                    .into_iter()
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect(),
            },
        ))
    }
}

/// Parse an index document into `{ident → entry}`.
///
/// Identifiers are upper-cased. A repeated identifier replaces the earlier
/// entry. Airports without an identifier are skipped.
pub fn ingest_index(xml: &str) -> Result<HashMap<String, AirportChartEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut airports = HashMap::new();
    let mut current: Option<AirportBuilder> = None;
    let mut field: Option<Field> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            DcsError::Index(format!(
                "malformed index at byte {}: {e}",
                reader.buffer_position()
            ))
        })?;

        match event {
            Event::Start(e) => {
                let tag = e.name();
                if tag.as_ref() == b"airport" {
                    current = Some(AirportBuilder::default());
                } else if let Some(builder) = current.as_mut() {
                    field = Field::from_tag(tag.as_ref());
                    if field == Some(Field::Pdf) {
                        builder.files.push(String::new());
                    }
                }
            }
            Event::End(e) => {
                if e.name().as_ref() == b"airport" {
                    if let Some((id, entry)) = current.take().and_then(AirportBuilder::finish) {
                        airports.insert(id, entry);
                    }
                }
                field = None;
            }
            Event::Text(t) => {
                if let (Some(builder), Some(f)) = (current.as_mut(), field) {
                    let text = t
                        .unescape()
                        .map_err(|e| DcsError::Index(format!("bad text in index: {e}")))?;
                    builder.push_text(f, &text);
                }
            }
            Event::CData(c) => {
                if let (Some(builder), Some(f)) = (current.as_mut(), field) {
                    builder.push_text(f, &String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(airports)
}

/// Read and parse an index file. A missing file is an empty index.
///
/// Upstream declares ISO-8859-1; bytes that are not valid UTF-8 are decoded as
/// Latin-1.
pub fn load_index(path: &Path) -> Result<HashMap<String, AirportChartEntry>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no index for edition yet");
            return Ok(HashMap::new());
        }
        Err(e) => return Err(e.into()),
    };
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    };
    ingest_index(&text)
}
