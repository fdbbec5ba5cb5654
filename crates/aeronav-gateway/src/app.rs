use std::sync::Arc;
use std::time::Duration;

use aeronav_core::{AeronavConfig, Clock, Fetcher, HttpFetcher, SystemClock};
use aeronav_dcs::ChartSupplementStore;
use aeronav_dtpp::{PublicationWatcher, VersionResolver, VersionSubscriber};
use aeronav_scheduler::RemoteListingPoller;

use crate::adds::BulletinMirror;
use crate::subscribers::CurrentVersionPointer;

/// Every long-lived service, built once and shared by reference.
pub struct AppContext {
    pub config: AeronavConfig,
    pub fetcher: Arc<dyn Fetcher>,
    pub clock: Arc<dyn Clock>,
    pub dcs: Arc<ChartSupplementStore>,
}

impl AppContext {
    pub fn new(config: AeronavConfig) -> anyhow::Result<Self> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&config.http)?);
        Ok(Self::with_capabilities(config, fetcher, Arc::new(SystemClock)))
    }

    pub fn with_capabilities(
        config: AeronavConfig,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let dcs = Arc::new(ChartSupplementStore::from_config(
            &config,
            Arc::clone(&fetcher),
            Arc::clone(&clock),
        ));
        Self {
            config,
            fetcher,
            clock,
            dcs,
        }
    }

    pub fn dtpp_resolver(&self) -> VersionResolver {
        VersionResolver::from_config(&self.config, Arc::clone(&self.fetcher), Arc::clone(&self.clock))
    }

    /// Watcher with the gateway's own subscribers registered.
    pub fn dtpp_watcher(&self) -> PublicationWatcher {
        let pointer: Arc<dyn VersionSubscriber> = Arc::new(CurrentVersionPointer::new(
            self.config.cache.dtpp_dir().join("current.json"),
        ));
        PublicationWatcher::builder(self.dtpp_resolver())
            .with_config(&self.config.dtpp)
            .subscribe(pointer)
            .build()
    }

    /// Poller with one mirroring watch per configured ADDS file.
    pub fn adds_poller(&self) -> RemoteListingPoller {
        let mirror = Arc::new(BulletinMirror::new(
            self.config.cache.adds_dir(),
            Arc::clone(&self.fetcher),
        ));
        let mut poller = RemoteListingPoller::from_config(&self.config.adds, Arc::clone(&self.fetcher));
        for file in &self.config.adds.files {
            poller.add_watch(file.clone(), mirror.clone());
        }
        poller
    }

    pub fn dcs_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.config.dcs.refresh_interval_hours * 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeronav_core::{ManualClock, MemoryFetcher};
    use chrono::{TimeZone, Utc};

    fn context(root: &std::path::Path) -> AppContext {
        let mut config = AeronavConfig::default();
        config.cache.root = root.to_path_buf();
        AppContext::with_capabilities(
            config,
            Arc::new(MemoryFetcher::new()),
            Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 20, 0, 0, 0).unwrap())),
        )
    }

    #[test]
    fn services_share_cache_root() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        assert_eq!(ctx.dcs.root(), dir.path().join("dcs"));
        assert_eq!(ctx.dtpp_resolver().cache_dir(), dir.path().join("dtpp"));
        assert_eq!(ctx.dcs_refresh_interval(), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn poller_watches_configured_files() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let poller = ctx.adds_poller();
        let files: Vec<_> = poller.watches().iter().map(|w| w.filename.as_str()).collect();
        assert_eq!(files, vec!["metars.cache.xml.gz", "tafs.cache.xml.gz"]);
        assert!(poller.watches()[0].url().starts_with("https://aviationweather.gov/"));
    }
}
