use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aeronav_core::{AeronavConfig, Clock, Fetcher};
use aeronav_scheduler::{edition_dir_name, edition_path, parse_edition_dir_name, EditionCycle};
use chrono::NaiveDate;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::archive::build_zip;
use crate::catalogue::catalogue_bundle;
use crate::error::{DcsError, Result};
use crate::index::{load_index, AirportChartEntry};
use crate::pdf::split_pages;

pub type AirportIndex = HashMap<String, AirportChartEntry>;

/// What one refresh changed on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub downloaded: Vec<NaiveDate>,
    pub retired: Vec<NaiveDate>,
}

struct LoadedEdition {
    edition: NaiveDate,
    airports: Arc<AirportIndex>,
}

/// Local cache of chart supplement editions and per-airport page extracts.
///
/// The store is the only writer below its root directory. Lookups read the
/// index of the edition that is current for the clock's date, reloading it
/// when the calendar rolls over.
pub struct ChartSupplementStore {
    root: PathBuf,
    cycle: EditionCycle,
    payload_base_url: String,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    loaded: Mutex<Option<LoadedEdition>>,
}

impl ChartSupplementStore {
    pub fn new(
        root: impl Into<PathBuf>,
        cycle: EditionCycle,
        payload_base_url: impl Into<String>,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            root: root.into(),
            cycle,
            payload_base_url: payload_base_url.into().trim_end_matches('/').to_string(),
            fetcher,
            clock,
            loaded: Mutex::new(None),
        }
    }

    pub fn from_config(
        config: &AeronavConfig,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            config.cache.dcs_dir(),
            EditionCycle::from_config(&config.dcs),
            config.dcs.payload_base_url.clone(),
            fetcher,
            clock,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cycle(&self) -> &EditionCycle {
        &self.cycle
    }

    /// Edition in force today.
    pub fn current_edition(&self) -> NaiveDate {
        self.cycle.current(self.clock.today())
    }

    pub fn edition_path(&self, edition: NaiveDate) -> PathBuf {
        edition_path(&self.root, edition)
    }

    /// `<payload base>/DCS_<YYYYMMDD>.zip`
    pub fn bundle_url(&self, edition: NaiveDate) -> String {
        format!("{}/{}.zip", self.payload_base_url, edition_dir_name(edition))
    }

    /// `<edition dir>/afd_<ddmonyyyy>.xml`, e.g. `afd_17apr2025.xml`.
    pub fn index_path(&self, edition: NaiveDate) -> PathBuf {
        let stamp = edition.format("%d%b%Y").to_string().to_lowercase();
        self.edition_path(edition).join(format!("afd_{stamp}.xml"))
    }

    /// Download missing editions, then retire every edition older than the
    /// current one.
    ///
    /// Stops at the first failed download; editions already catalogued stay.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let today = self.clock.today();
        let mut report = RefreshReport::default();
        tokio::fs::create_dir_all(&self.root).await?;

        for edition in self.cycle.editions_available(&self.root, today) {
            let url = self.bundle_url(edition);
            info!(edition = %edition, %url, "downloading chart supplement edition");
            let bundle = self.fetcher.get(&url).await?;

            let dest = self.edition_path(edition);
            let files = tokio::task::spawn_blocking(move || catalogue_bundle(&bundle, &dest))
                .await
                .map_err(|e| DcsError::Archive(format!("extraction task failed: {e}")))??;
            info!(edition = %edition, files, "chart supplement edition catalogued");
            report.downloaded.push(edition);
        }

        report.retired = self.retire_stale(today).await?;
        Ok(report)
    }

    /// Remove every edition older than today's, once today's edition is on
    /// disk. Editions missed while the service was down are caught up here.
    async fn retire_stale(&self, today: NaiveDate) -> Result<Vec<NaiveDate>> {
        let current = self.cycle.current(today);
        let current_path = self.edition_path(current);
        if !current_path.exists() {
            debug!(path = %current_path.display(), "current edition absent; keeping older editions");
            return Ok(Vec::new());
        }

        let mut stale = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(edition) = name.to_str().and_then(parse_edition_dir_name) else {
                continue;
            };
            if edition < current && entry.file_type().await?.is_dir() {
                stale.push(edition);
            }
        }
        stale.sort();

        for edition in &stale {
            tokio::fs::remove_dir_all(self.edition_path(*edition)).await?;
            info!(edition = %edition, "retired chart supplement edition");
        }
        Ok(stale)
    }

    /// Run one refresh in the background. Failures are logged, never raised.
    pub fn spawn_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            store.refresh_logged().await;
        })
    }

    /// Refresh now and then every `interval` until `shutdown` broadcasts `true`.
    /// A zero interval refreshes once.
    pub async fn run_refresh_loop(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.refresh_logged().await;
            if interval.is_zero() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("chart supplement refresh loop stopped");
    }

    async fn refresh_logged(&self) {
        match self.refresh().await {
            Ok(report) => info!(
                downloaded = report.downloaded.len(),
                retired = ?report.retired,
                "chart supplement refresh complete"
            ),
            Err(e) => error!(error = %e, code = e.code(), "chart supplement refresh failed"),
        }
    }

    /// Index of the current edition, reloaded when the edition changes or the
    /// loaded index is empty (e.g. loaded before the edition landed).
    pub fn airports(&self) -> Result<Arc<AirportIndex>> {
        self.loaded_index().map(|(_, airports)| airports)
    }

    fn loaded_index(&self) -> Result<(NaiveDate, Arc<AirportIndex>)> {
        let current = self.current_edition();
        let mut loaded = self.loaded.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(l) = loaded.as_ref() {
            if l.edition == current && !l.airports.is_empty() {
                return Ok((l.edition, Arc::clone(&l.airports)));
            }
        }

        let airports = Arc::new(load_index(&self.index_path(current))?);
        if loaded.as_ref().map(|l| l.edition) != Some(current) {
            info!(edition = %current, airports = airports.len(), "chart supplement index loaded");
        }
        *loaded = Some(LoadedEdition {
            edition: current,
            airports: Arc::clone(&airports),
        });
        Ok((current, airports))
    }

    /// Index entry for `icao` (case-insensitive) in the current edition.
    pub fn entry(&self, icao: &str) -> Result<AirportChartEntry> {
        let (_, airports) = self.loaded_index()?;
        lookup(&airports, icao).cloned()
    }

    /// Every page of every document for `icao`, in document then page order.
    pub fn get(&self, icao: &str) -> Result<Vec<Vec<u8>>> {
        let (edition, airports) = self.loaded_index()?;
        let entry = lookup(&airports, icao)?;
        let dir = self.edition_path(edition);

        let mut pages = Vec::new();
        for file in &entry.files {
            let path = dir.join(file.to_lowercase());
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    error!(icao, path = %path.display(), "indexed document missing from cache");
                    return Err(DcsError::MissingDocument { path });
                }
                Err(e) => return Err(e.into()),
            };
            let split = split_pages(&bytes).inspect_err(|e| {
                warn!(icao, path = %path.display(), error = %e, "failed to split document");
            })?;
            pages.extend(split);
        }
        debug!(icao, pages = pages.len(), "chart supplement extracted");
        Ok(pages)
    }

    /// [`get`](Self::get) bundled as a zip of `file_<n>.pdf` entries.
    pub fn get_as_zip(&self, icao: &str) -> Result<Vec<u8>> {
        build_zip(&self.get(icao)?)
    }
}

fn lookup<'a>(airports: &'a AirportIndex, icao: &str) -> Result<&'a AirportChartEntry> {
    let key = icao.trim().to_ascii_uppercase();
    airports.get(&key).ok_or(DcsError::NotFound { icao: key })
}
