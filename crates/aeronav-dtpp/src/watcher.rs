use std::sync::{Arc, Mutex};
use std::time::Duration;

use aeronav_core::config::DtppConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::header::ValidityHeader;
use crate::resolver::{ResolvedVersion, VersionResolver};
use crate::version::VersionFile;

pub const DEFAULT_WAKE_MARGIN: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(15 * 60);

/// Notified, in registration order, whenever the resolved version changes.
#[async_trait]
pub trait VersionSubscriber: Send + Sync {
    async fn on_version_changed(
        &self,
        header: &ValidityHeader,
        version: &VersionFile,
    ) -> std::result::Result<(), String>;
}

struct Shared {
    resolver: VersionResolver,
    subscribers: Vec<Arc<dyn VersionSubscriber>>,
    current: Mutex<Option<ResolvedVersion>>,
    wake_margin: Duration,
    retry_after: Duration,
}

struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Background loop that keeps the procedures metadata current.
///
/// Each cycle pre-fetches the month implied by the clock, resolves the valid
/// version and notifies subscribers when its header differs from the last one
/// seen. The loop then sleeps until the resolved window closes (plus a small
/// margin), or for `retry_after` when resolution failed.
pub struct PublicationWatcher {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

/// Collects subscribers before the watcher exists; the list is fixed once
/// [`build`](Self::build) is called.
pub struct PublicationWatcherBuilder {
    resolver: VersionResolver,
    subscribers: Vec<Arc<dyn VersionSubscriber>>,
    wake_margin: Duration,
    retry_after: Duration,
}

impl PublicationWatcherBuilder {
    pub fn subscribe(mut self, subscriber: Arc<dyn VersionSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn wake_margin(mut self, margin: Duration) -> Self {
        self.wake_margin = margin;
        self
    }

    pub fn retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = delay;
        self
    }

    pub fn with_config(self, config: &DtppConfig) -> Self {
        self.wake_margin(Duration::from_secs(config.wake_margin_secs))
            .retry_after(Duration::from_secs(config.retry_after_secs))
    }

    pub fn build(self) -> PublicationWatcher {
        PublicationWatcher {
            shared: Arc::new(Shared {
                resolver: self.resolver,
                subscribers: self.subscribers,
                current: Mutex::new(None),
                wake_margin: self.wake_margin,
                retry_after: self.retry_after,
            }),
            running: Mutex::new(None),
        }
    }
}

impl PublicationWatcher {
    pub fn builder(resolver: VersionResolver) -> PublicationWatcherBuilder {
        PublicationWatcherBuilder {
            resolver,
            subscribers: Vec::new(),
            wake_margin: DEFAULT_WAKE_MARGIN,
            retry_after: DEFAULT_RETRY_AFTER,
        }
    }

    pub fn resolver(&self) -> &VersionResolver {
        &self.shared.resolver
    }

    /// Last version resolved by the loop (or by [`poll_once`](Self::poll_once)).
    pub fn current(&self) -> Option<ResolvedVersion> {
        self.shared
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Run a single cycle without scheduling the next one.
    pub async fn poll_once(&self) -> Result<ResolvedVersion> {
        self.shared.cycle().await
    }

    /// Clean the cache and spawn the loop. Does nothing if already running;
    /// after [`stop`](Self::stop) it spawns a fresh loop.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running
            .as_ref()
            .is_some_and(|r| !r.task.is_finished() && !*r.shutdown.borrow())
        {
            debug!("publication watcher already running");
            return;
        }
        // A loop that was told to stop may still be finishing its cycle; it
        // exits on its own once its sender is dropped below.

        match self.shared.resolver.clean_cache() {
            Ok(removed) => debug!(removed, "metadata cache cleaned"),
            Err(e) => warn!(error = %e, "metadata cache clean failed"),
        }

        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(Arc::clone(&self.shared).run(rx));
        *running = Some(Running { shutdown, task });
        info!("publication watcher started");
    }

    /// Signal the loop to exit after its current step. Safe to call when not
    /// running.
    pub fn stop(&self) {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(r) = running.as_ref() {
            let _ = r.shutdown.send(true);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Stop and wait for the loop to exit.
    pub async fn shutdown(&self) {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(r) = running {
            let _ = r.shutdown.send(true);
            if let Err(e) = r.task.await {
                warn!("publication watcher task ended abnormally: {e}");
            }
            info!("publication watcher stopped");
        }
    }
}

impl Shared {
    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.cycle().await {
                Ok(resolved) => {
                    let delay = next_wake(&resolved.header, self.resolver.clock().now(), self.wake_margin);
                    debug!(
                        version = %resolved.version.id,
                        sleep_secs = delay.as_secs(),
                        "next metadata check scheduled"
                    );
                    delay
                }
                Err(e) => {
                    error!(
                        error = %e,
                        code = e.code(),
                        retry_secs = self.retry_after.as_secs(),
                        "metadata resolution failed"
                    );
                    self.retry_after
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn cycle(&self) -> Result<ResolvedVersion> {
        let implied = self.resolver.implied_version();
        if !implied.exists() {
            if let Err(e) = self.resolver.fetch_and_save(&implied).await {
                debug!(version = %implied.id, error = %e, "pre-fetch of implied version failed");
            }
        }

        let resolved = self.resolver.seek_valid_version().await?;

        match self.resolver.prune_expired() {
            Ok(removed) if !removed.is_empty() => {
                debug!(removed = removed.len(), "superseded metadata pruned")
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to prune superseded metadata"),
        }

        let changed = {
            let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
            let changed = current.as_ref().map(|c| &c.header) != Some(&resolved.header);
            if changed {
                *current = Some(resolved.clone());
            }
            changed
        };

        if changed {
            info!(
                version = %resolved.version.id,
                cycle = %resolved.header.cycle,
                subscribers = self.subscribers.len(),
                "metadata version changed; notifying subscribers"
            );
            for subscriber in &self.subscribers {
                if let Err(reason) = subscriber
                    .on_version_changed(&resolved.header, &resolved.version)
                    .await
                {
                    warn!(version = %resolved.version.id, %reason, "subscriber failed");
                }
            }
        }

        Ok(resolved)
    }
}

/// Time until `header` expires plus `margin`; just `margin` once it has.
pub fn next_wake(header: &ValidityHeader, now: DateTime<Utc>, margin: Duration) -> Duration {
    (header.valid_to - now).to_std().unwrap_or(Duration::ZERO) + margin
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeronav_core::{ManualClock, MemoryFetcher};
    use chrono::TimeZone;

    const BASE: &str = "https://aeronav.example/d-tpp";

    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl VersionSubscriber for Recorder {
        async fn on_version_changed(
            &self,
            header: &ValidityHeader,
            version: &VersionFile,
        ) -> std::result::Result<(), String> {
            self.0
                .lock()
                .unwrap()
                .push(format!("{}:{}", header.cycle, version.id));
            Ok(())
        }
    }

    fn metafile(cycle: &str, from: &str, to: &str) -> String {
        format!("<digital_tpp cycle=\"{cycle}\" from_edate=\"0901Z {from}\" to_edate=\"0901Z {to}\"/>")
    }

    fn url(code: &str) -> String {
        format!("{BASE}/{code}/xml_data/d-tpp_Metafile.xml")
    }

    #[test]
    fn wake_after_window_closes() {
        let header = ValidityHeader {
            cycle: "2506".to_string(),
            valid_from: Utc.with_ymd_and_hms(2025, 6, 12, 9, 1, 0).unwrap(),
            valid_to: Utc.with_ymd_and_hms(2025, 7, 10, 9, 1, 0).unwrap(),
        };
        let margin = Duration::from_secs(10);
        let now = Utc.with_ymd_and_hms(2025, 7, 10, 8, 1, 0).unwrap();
        assert_eq!(next_wake(&header, now, margin), Duration::from_secs(3610));

        let late = Utc.with_ymd_and_hms(2025, 7, 11, 0, 0, 0).unwrap();
        assert_eq!(next_wake(&header, late, margin), margin);
    }

    #[tokio::test]
    async fn notifies_only_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert(url("2506"), metafile("2506", "06/12/25", "07/10/25"));
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 20, 0, 0, 0).unwrap()));
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));

        let watcher = PublicationWatcher::builder(VersionResolver::new(
            dir.path(),
            BASE,
            "d-tpp_Metafile",
            fetcher.clone(),
            clock.clone(),
        ))
        .subscribe(recorder.clone())
        .build();

        assert!(watcher.current().is_none());
        watcher.poll_once().await.unwrap();
        watcher.poll_once().await.unwrap();
        assert_eq!(*recorder.0.lock().unwrap(), vec!["2506:2506"]);
        assert_eq!(watcher.current().unwrap().header.cycle, "2506");
        // The implied file was cached by the first cycle only.
        assert_eq!(fetcher.request_count(&url("2506")), 1);
    }

    #[tokio::test]
    async fn stop_without_start_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 20, 0, 0, 0).unwrap()));
        let watcher = PublicationWatcher::builder(VersionResolver::new(
            dir.path(),
            BASE,
            "d-tpp_Metafile",
            Arc::new(MemoryFetcher::new()),
            clock,
        ))
        .build();
        watcher.stop();
        watcher.shutdown().await;
        assert!(!watcher.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn start_right_after_stop_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert(url("2506"), metafile("2506", "06/12/25", "07/10/25"));
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 20, 0, 0, 0).unwrap()));
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let watcher = PublicationWatcher::builder(VersionResolver::new(
            dir.path(),
            BASE,
            "d-tpp_Metafile",
            fetcher,
            clock,
        ))
        .subscribe(recorder.clone())
        .build();

        watcher.start();
        watcher.stop();
        watcher.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(watcher.is_running());
        assert!(watcher.current().is_some());

        watcher.shutdown().await;
        assert!(!watcher.is_running());
    }
}
