use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate};

use aeronav_core::config::DcsConfig;

/// Fixed-length publication calendar.
///
/// Every edition starts at `anchor + k * length` for some integer `k`
/// (negative `k` covers dates before the anchor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditionCycle {
    anchor: NaiveDate,
    length_days: i64,
    lead_days: i64,
}

impl EditionCycle {
    /// `length_days` must be positive; `AeronavConfig::validate` enforces it for
    /// configured calendars.
    pub fn new(anchor: NaiveDate, length_days: i64, lead_days: i64) -> Self {
        Self {
            anchor,
            length_days: length_days.max(1),
            lead_days,
        }
    }

    pub fn from_config(config: &DcsConfig) -> Self {
        Self::new(config.anchor, config.cycle_days, config.lead_days)
    }

    pub fn anchor(&self) -> NaiveDate {
        self.anchor
    }

    pub fn length_days(&self) -> i64 {
        self.length_days
    }

    /// Start date of the edition enclosing `date`, shifted by `offset` cycles.
    pub fn schedule_for(&self, date: NaiveDate, offset: i64) -> NaiveDate {
        let days = (date - self.anchor).num_days();
        let cycle = days.div_euclid(self.length_days) + offset;
        self.anchor + Duration::days(cycle * self.length_days)
    }

    pub fn current(&self, date: NaiveDate) -> NaiveDate {
        self.schedule_for(date, 0)
    }

    pub fn next(&self, date: NaiveDate) -> NaiveDate {
        self.schedule_for(date, 1)
    }

    pub fn previous(&self, date: NaiveDate) -> NaiveDate {
        self.schedule_for(date, -1)
    }

    /// Editions that should be downloaded into `base` as of `query`.
    ///
    /// Yields the current edition when its directory is absent, then the next
    /// edition when its directory is absent and it is within the pre-publication
    /// lead window. Directory checks happen lazily as the iterator is consumed.
    pub fn editions_available<'a>(
        &self,
        base: &'a Path,
        query: NaiveDate,
    ) -> impl Iterator<Item = NaiveDate> + 'a {
        let current = self.current(query);
        let next = self.next(query);
        let lead = Duration::days(self.lead_days);

        std::iter::once(current)
            .filter(move |edition| !edition_path(base, *edition).exists())
            .chain(
                std::iter::once(next)
                    .filter(move |edition| *edition - lead <= query)
                    .filter(move |edition| !edition_path(base, *edition).exists()),
            )
    }
}

/// Directory name for an edition: `DCS_<YYYYMMDD>`.
pub fn edition_dir_name(edition: NaiveDate) -> String {
    format!("DCS_{}", edition.format("%Y%m%d"))
}

pub fn edition_path(base: &Path, edition: NaiveDate) -> PathBuf {
    base.join(edition_dir_name(edition))
}

/// Inverse of [`edition_dir_name`]. Staging directories and anything else
/// that is not exactly `DCS_<YYYYMMDD>` yield `None`.
pub fn parse_edition_dir_name(name: &str) -> Option<NaiveDate> {
    let stamp = name.strip_prefix("DCS_")?;
    if stamp.len() != 8 || !stamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(stamp, "%Y%m%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn calendar() -> EditionCycle {
        EditionCycle::new(date(2025, 2, 20), 56, 20)
    }

    #[test]
    fn schedule_for_current_next_and_previous() {
        let cycle = calendar();
        let query = date(2025, 4, 19);
        assert_eq!(cycle.schedule_for(query, 0), date(2025, 4, 17));
        assert_eq!(cycle.schedule_for(query, 1), date(2025, 6, 12));
        assert_eq!(cycle.schedule_for(query, -1), date(2025, 2, 20));
    }

    #[test]
    fn edition_start_date_maps_to_itself() {
        let cycle = calendar();
        assert_eq!(cycle.current(date(2025, 4, 17)), date(2025, 4, 17));
        assert_eq!(cycle.current(date(2025, 6, 11)), date(2025, 4, 17));
    }

    #[test]
    fn dates_before_anchor_floor_backwards() {
        let cycle = calendar();
        // 2025-02-19 is one day before the anchor: the enclosing cycle began 56 days earlier.
        assert_eq!(cycle.current(date(2025, 2, 19)), date(2024, 12, 26));
        assert_eq!(cycle.next(date(2025, 2, 19)), date(2025, 2, 20));
    }

    #[test]
    fn edition_path_format() {
        assert_eq!(
            edition_path(Path::new("/foo"), date(2025, 2, 20)),
            PathBuf::from("/foo/DCS_20250220")
        );
    }

    #[test]
    fn edition_dir_names_parse_back() {
        assert_eq!(parse_edition_dir_name("DCS_20250220"), Some(date(2025, 2, 20)));
        assert_eq!(parse_edition_dir_name("DCS_20250220.partial"), None);
        assert_eq!(parse_edition_dir_name("DCS_20251340"), None);
        assert_eq!(parse_edition_dir_name("DTPP_2506.xml"), None);
    }

    #[test]
    fn only_current_missing_outside_lead_window() {
        let cycle = calendar();
        let editions: Vec<_> = cycle
            .editions_available(Path::new("/foo"), date(2025, 2, 21))
            .collect();
        assert_eq!(editions, vec![date(2025, 2, 20)]);
    }

    #[test]
    fn current_and_next_missing_inside_lead_window() {
        let cycle = calendar();
        let editions: Vec<_> = cycle
            .editions_available(Path::new("/foo"), date(2025, 5, 30))
            .collect();
        assert_eq!(editions, vec![date(2025, 4, 17), date(2025, 6, 12)]);
    }

    #[test]
    fn lead_window_boundary_is_inclusive() {
        let cycle = calendar();
        // 2025-06-12 minus 20 days.
        let editions: Vec<_> = cycle
            .editions_available(Path::new("/foo"), date(2025, 5, 23))
            .collect();
        assert_eq!(editions, vec![date(2025, 4, 17), date(2025, 6, 12)]);

        let editions: Vec<_> = cycle
            .editions_available(Path::new("/foo"), date(2025, 5, 22))
            .collect();
        assert_eq!(editions, vec![date(2025, 4, 17)]);
    }

    #[test]
    fn present_editions_are_skipped() {
        let cycle = calendar();
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(edition_path(dir.path(), date(2025, 4, 17))).unwrap();

        let editions: Vec<_> = cycle.editions_available(dir.path(), date(2025, 5, 30)).collect();
        assert_eq!(editions, vec![date(2025, 6, 12)]);

        std::fs::create_dir(edition_path(dir.path(), date(2025, 6, 12))).unwrap();
        assert_eq!(cycle.editions_available(dir.path(), date(2025, 5, 30)).count(), 0);
    }
}
