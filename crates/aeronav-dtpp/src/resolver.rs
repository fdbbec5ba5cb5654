use std::path::{Path, PathBuf};
use std::sync::Arc;

use aeronav_core::{AeronavConfig, Clock, Fetcher};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{DtppError, Result};
use crate::header::ValidityHeader;
use crate::version::{VersionFile, VersionId};

/// Attempts made by [`VersionResolver::seek_valid_version`] before giving up.
const SEEK_ATTEMPTS: usize = 2;

/// A version whose header was valid when it was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedVersion {
    pub header: ValidityHeader,
    pub version: VersionFile,
}

/// State of one cached version as seen by the resolver.
#[derive(Debug)]
enum Probe {
    Valid(ValidityHeader),
    /// Present but outside its window, or without a readable header.
    Invalid(Option<ValidityHeader>),
    /// Not cached and could not be fetched.
    Missing,
}

/// Locates, fetches and validates revisions of the procedures metadata file.
///
/// The resolver is the only writer of `DTPP_*.xml` files in its cache
/// directory.
pub struct VersionResolver {
    cache_dir: PathBuf,
    remote_base_url: String,
    index_name: String,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
}

impl VersionResolver {
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        remote_base_url: impl Into<String>,
        index_name: impl Into<String>,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            remote_base_url: remote_base_url.into().trim_end_matches('/').to_string(),
            index_name: index_name.into(),
            fetcher,
            clock,
        }
    }

    pub fn from_config(
        config: &AeronavConfig,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            config.cache.dtpp_dir(),
            config.dtpp.remote_base_url.clone(),
            config.dtpp.index_name.clone(),
            fetcher,
            clock,
        )
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn version_file(&self, id: VersionId) -> VersionFile {
        VersionFile::new(&self.cache_dir, id)
    }

    /// Version implied by today's calendar month.
    pub fn implied_version(&self) -> VersionFile {
        self.version_file(VersionId::for_date(self.clock.today()))
    }

    /// `<base>/<YYMM>/xml_data/<index>.xml`
    pub fn remote_url(&self, id: VersionId) -> String {
        format!(
            "{}/{}/xml_data/{}.xml",
            self.remote_base_url,
            id.code(),
            self.index_name
        )
    }

    /// Download `version` and write it to its cache slot, replacing any
    /// previous copy. The body lands in a sibling temp file first and is
    /// renamed into place.
    pub async fn fetch_and_save(&self, version: &VersionFile) -> Result<usize> {
        let url = self.remote_url(version.id);
        debug!(version = %version.id, %url, "fetching metadata");
        let body = self.fetcher.get(&url).await?;

        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let tmp = version.path.with_extension("xml.partial");
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &version.path).await?;
        info!(version = %version.id, bytes = body.len(), "metadata cached");
        Ok(body.len())
    }

    /// Whether `version` is cached with a header valid right now.
    pub fn is_valid(&self, version: &VersionFile) -> bool {
        self.valid_header(version).is_some()
    }

    fn valid_header(&self, version: &VersionFile) -> Option<ValidityHeader> {
        let now = self.clock.now();
        version.read_header().filter(|h| h.is_valid_at(now))
    }

    fn probe_cached(&self, version: &VersionFile, now: DateTime<Utc>) -> Probe {
        if !version.exists() {
            return Probe::Missing;
        }
        match version.read_header() {
            Some(h) if h.is_valid_at(now) => Probe::Valid(h),
            header => Probe::Invalid(header),
        }
    }

    /// Probe `version`, fetching it first when it is not cached.
    async fn probe(&self, version: &VersionFile, now: DateTime<Utc>) -> Probe {
        if !version.exists() {
            if let Err(e) = self.fetch_and_save(version).await {
                warn!(version = %version.id, error = %e, "metadata fetch failed");
                return Probe::Missing;
            }
        }
        self.probe_cached(version, now)
    }

    /// Resolve the version whose header is valid now.
    ///
    /// Starts from the month implied by the clock and, for at most two rounds,
    /// steps forward (now past the window) or back (otherwise, including when
    /// the header is unreadable). When a step lands just after December, the
    /// thirteenth-period revision of that year is tried as well. Never returns
    /// a version whose header is not valid.
    pub async fn seek_valid_version(&self) -> Result<ResolvedVersion> {
        let now = self.clock.now();
        let mut version = self.implied_version();

        for attempt in 1..=SEEK_ATTEMPTS {
            let header = match self.probe(&version, now).await {
                Probe::Valid(header) => return Ok(resolved(header, version)),
                Probe::Invalid(header) => header,
                Probe::Missing => None,
            };

            let stepped = match &header {
                Some(h) if now > h.valid_to => version.id.next(),
                _ => version.id.previous(),
            };
            debug!(attempt, from = %version.id, to = %stepped, "stepping to adjacent version");
            version = self.version_file(stepped);

            if let Probe::Valid(header) = self.probe_cached(&version, now) {
                return Ok(resolved(header, version));
            }

            let predecessor = stepped.previous();
            if predecessor.month() == 12 {
                let thirteenth = self.version_file(VersionId::thirteenth(predecessor.year()));
                debug!(version = %thirteenth.id, "trying thirteenth period");
                match self.fetch_and_save(&thirteenth).await {
                    Ok(_) => {
                        if let Probe::Valid(header) = self.probe_cached(&thirteenth, now) {
                            return Ok(resolved(header, thirteenth));
                        }
                    }
                    Err(e) => {
                        debug!(version = %thirteenth.id, error = %e, "no thirteenth period published");
                    }
                }
            }
        }

        warn!(last_tried = %version.id, "no valid metadata version");
        Err(DtppError::NoValidVersion {
            last_tried: version.id.code(),
        })
    }

    /// Every `DTPP_<code>.xml` in the cache, oldest first.
    pub fn cached_versions(&self) -> Result<Vec<VersionFile>> {
        let entries = match std::fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(VersionFile::id_from_file_name) {
                versions.push(self.version_file(id));
            }
        }
        versions.sort_by_key(|v| (v.id.year(), v.id.month()));
        Ok(versions)
    }

    /// Delete every cached version whose header is not valid now. Returns the
    /// number of files removed.
    pub fn clean_cache(&self) -> Result<usize> {
        let mut removed = 0;
        for version in self.cached_versions()? {
            if !self.is_valid(&version) {
                version.remove()?;
                info!(version = %version.id, "removed stale metadata");
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Delete cached versions whose window closed before now. Versions not yet
    /// in force are kept, as are files without a readable header (those are
    /// left to [`clean_cache`](Self::clean_cache)).
    pub fn prune_expired(&self) -> Result<Vec<VersionId>> {
        let now = self.clock.now();
        let mut removed = Vec::new();
        for version in self.cached_versions()? {
            if version.read_header().is_some_and(|h| h.valid_to < now) {
                version.remove()?;
                info!(version = %version.id, "removed superseded metadata");
                removed.push(version.id);
            }
        }
        Ok(removed)
    }

    /// First cached version valid now, without network access.
    pub fn valid_cached_version(&self) -> Result<Option<ResolvedVersion>> {
        Ok(self
            .cached_versions()?
            .into_iter()
            .find_map(|v| self.valid_header(&v).map(|h| resolved(h, v))))
    }
}

fn resolved(header: ValidityHeader, version: VersionFile) -> ResolvedVersion {
    info!(version = %version.id, cycle = %header.cycle, valid_to = %header.valid_to, "metadata version resolved");
    ResolvedVersion { header, version }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeronav_core::{ManualClock, MemoryFetcher};
    use chrono::TimeZone;

    const BASE: &str = "https://aeronav.example/d-tpp";

    fn metafile(cycle: &str, from: &str, to: &str) -> String {
        format!(
            "<?xml version=\"1.0\"?>\n<digital_tpp cycle=\"{cycle}\" from_edate=\"0901Z  {from}\" to_edate=\"0901Z  {to}\">\n</digital_tpp>"
        )
    }

    fn resolver(dir: &Path, fetcher: Arc<MemoryFetcher>, y: i32, m: u32, d: u32) -> VersionResolver {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()));
        VersionResolver::new(dir, BASE, "d-tpp_Metafile", fetcher, clock)
    }

    #[test]
    fn remote_url_template() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path(), Arc::new(MemoryFetcher::new()), 2025, 6, 20);
        assert_eq!(
            r.remote_url(VersionId::Monthly { year: 2025, month: 6 }),
            "https://aeronav.example/d-tpp/2506/xml_data/d-tpp_Metafile.xml"
        );
        assert_eq!(
            r.remote_url(VersionId::thirteenth(2025)),
            "https://aeronav.example/d-tpp/2513/xml_data/d-tpp_Metafile.xml"
        );
    }

    #[tokio::test]
    async fn fetch_overwrites_cached_copy() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MemoryFetcher::new());
        let url = format!("{BASE}/2506/xml_data/d-tpp_Metafile.xml");
        let r = resolver(dir.path(), fetcher.clone(), 2025, 6, 20);
        let version = r.implied_version();

        fetcher.insert(url.clone(), metafile("2506", "06/12/25", "07/10/25"));
        r.fetch_and_save(&version).await.unwrap();
        fetcher.insert(url, metafile("2506", "06/12/25", "07/11/25"));
        r.fetch_and_save(&version).await.unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(
            version.read_header().unwrap().valid_to,
            Utc.with_ymd_and_hms(2025, 7, 11, 9, 1, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn failed_fetch_leaves_cache_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path(), Arc::new(MemoryFetcher::new()), 2025, 6, 20);
        let err = r.fetch_and_save(&r.implied_version()).await.unwrap_err();
        assert_eq!(err.code(), "FETCH_ERROR");
        assert!(r.cached_versions().unwrap().is_empty());
    }

    #[test]
    fn clean_cache_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path(), Arc::new(MemoryFetcher::new()), 2025, 6, 20);
        std::fs::write(dir.path().join("DTPP_2505.xml"), metafile("2505", "05/15/25", "06/12/25")).unwrap();
        std::fs::write(dir.path().join("DTPP_2506.xml"), metafile("2506", "06/12/25", "07/10/25")).unwrap();
        std::fs::write(dir.path().join("DTPP_2507.xml"), "<html>maintenance</html>").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "not metadata").unwrap();

        assert_eq!(r.clean_cache().unwrap(), 2);
        assert_eq!(r.clean_cache().unwrap(), 0);

        let left: Vec<_> = r.cached_versions().unwrap().into_iter().map(|v| v.id.code()).collect();
        assert_eq!(left, vec!["2506"]);
        assert!(dir.path().join("readme.txt").exists());
    }

    #[test]
    fn valid_cached_version_reads_disk_only() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MemoryFetcher::new());
        let r = resolver(dir.path(), fetcher.clone(), 2025, 6, 20);
        assert_eq!(r.valid_cached_version().unwrap(), None);

        std::fs::write(dir.path().join("DTPP_2505.xml"), metafile("2505", "05/15/25", "06/12/25")).unwrap();
        std::fs::write(dir.path().join("DTPP_2506.xml"), metafile("2506", "06/12/25", "07/10/25")).unwrap();
        let found = r.valid_cached_version().unwrap().unwrap();
        assert_eq!(found.header.cycle, "2506");
        assert!(fetcher.requests().is_empty());
    }

    #[test]
    fn cached_versions_sort_thirteenth_after_december() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(dir.path(), Arc::new(MemoryFetcher::new()), 2026, 1, 3);
        for code in ["2601", "2513", "2512"] {
            std::fs::write(dir.path().join(format!("DTPP_{code}.xml")), "").unwrap();
        }
        let codes: Vec<_> = r.cached_versions().unwrap().into_iter().map(|v| v.id.code()).collect();
        assert_eq!(codes, vec!["2512", "2513", "2601"]);
    }
}
