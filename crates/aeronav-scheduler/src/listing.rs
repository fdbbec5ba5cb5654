//! Parser for Apache `mod_autoindex` directory pages.
//!
//! Handles both the `<pre>` layout and the `<table>` layout (`FancyIndexing`
//! with `HTMLTable`). Parent-directory links, sort-order links and absolute
//! links are ignored; rows without a timestamp are skipped.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;
use tracing::trace;

use crate::error::{Result, SchedulerError};
use crate::types::ListingEntry;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%d-%b-%Y %H:%M",
    "%d-%b-%Y %H:%M:%S",
];

fn anchor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<a\s+href="([^"]+)"[^>]*>.*?</a>"#).expect("anchor pattern is valid")
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"))
}

fn row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(\d{4}-\d{2}-\d{2} \d{2}:\d{2}(?::\d{2})?|\d{2}-[A-Za-z]{3}-\d{4} \d{2}:\d{2}(?::\d{2})?)\s*(\S+)?\s*(.*?)\s*$",
        )
        .expect("row pattern is valid")
    })
}

/// Parse an autoindex page into its file entries, in page order.
pub fn parse_listing(html: &str) -> Result<Vec<ListingEntry>> {
    let mut saw_anchor = false;
    let mut entries = Vec::new();

    for line in html.lines() {
        let anchors: Vec<_> = anchor_re().captures_iter(line).collect();
        for (i, caps) in anchors.iter().enumerate() {
            saw_anchor = true;
            let (Some(whole), Some(href)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let href = href.as_str();
            if !is_entry_link(href) {
                continue;
            }

            let tail_end = anchors
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(line.len());
            let tail = tag_re()
                .replace_all(&line[whole.end()..tail_end], " ")
                .replace("&nbsp;", " ");

            match parse_row(href, &tail) {
                Some(entry) => entries.push(entry),
                None => trace!(%href, "listing row without timestamp skipped"),
            }
        }
    }

    if !saw_anchor {
        return Err(SchedulerError::Listing(
            "page contains no links; not a directory index".to_string(),
        ));
    }
    Ok(entries)
}

/// Parse a listing and key it by filename. Later duplicates win.
pub fn index_listing(entries: Vec<ListingEntry>) -> HashMap<String, ListingEntry> {
    entries
        .into_iter()
        .map(|entry| (entry.filename.clone(), entry))
        .collect()
}

fn is_entry_link(href: &str) -> bool {
    !(href.starts_with('?')
        || href.starts_with('/')
        || href.starts_with("..")
        || href.contains("://"))
}

fn parse_row(href: &str, tail: &str) -> Option<ListingEntry> {
    let caps = row_re().captures(tail)?;
    let stamp = caps.get(1)?.as_str();
    let modified = TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(stamp, fmt).ok())?;
    let size = caps.get(2).and_then(|m| parse_size(m.as_str()));
    let description = caps
        .get(3)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    Some(ListingEntry {
        filename: href.trim_end_matches('/').to_string(),
        modified,
        size,
        description,
    })
}

/// `"-"` → `None`; `"512"`, `"1.2K"`, `"3M"`, `"1G"` → bytes (binary multiples).
fn parse_size(raw: &str) -> Option<u64> {
    if raw == "-" {
        return None;
    }
    let (number, multiplier) = match raw.chars().last()?.to_ascii_uppercase() {
        'K' => (&raw[..raw.len() - 1], 1024f64),
        'M' => (&raw[..raw.len() - 1], 1024f64 * 1024.0),
        'G' => (&raw[..raw.len() - 1], 1024f64 * 1024.0 * 1024.0),
        'T' => (&raw[..raw.len() - 1], 1024f64 * 1024.0 * 1024.0 * 1024.0),
        _ => (raw, 1f64),
    };
    let value: f64 = number.parse().ok()?;
    Some((value * multiplier).round() as u64)
}
