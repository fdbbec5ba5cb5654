use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aeronav_core::config::AddsConfig;
use aeronav_core::Fetcher;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    error::{Result, SchedulerError},
    listing::{index_listing, parse_listing},
    types::{PollWatch, WatchCallback},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_FAILURE_COOLDOWN: Duration = Duration::from_secs(60);

/// Outcome of the most recent poll cycles, readable while the loop runs.
///
/// Consumers use `last_poll_succeeded() == false` to flag data derived from
/// watched files as possibly stale.
#[derive(Debug)]
pub struct PollStatus {
    last_succeeded: AtomicBool,
    consecutive_failures: AtomicU32,
}

impl Default for PollStatus {
    fn default() -> Self {
        Self {
            last_succeeded: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
        }
    }
}

impl PollStatus {
    pub fn last_poll_succeeded(&self) -> bool {
        self.last_succeeded.load(Ordering::Acquire)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.last_succeeded.store(true, Ordering::Release);
    }

    /// Returns the failure streak including this one.
    fn record_failure(&self) -> u32 {
        self.last_succeeded.store(false, Ordering::Release);
        self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Watches files in a remote directory listing and fires a callback whenever a
/// file's modification time advances.
pub struct RemoteListingPoller {
    listing_url: String,
    fetcher: Arc<dyn Fetcher>,
    watches: Vec<PollWatch>,
    interval: Duration,
    cooldown: Duration,
    status: Arc<PollStatus>,
}

impl RemoteListingPoller {
    pub fn new(listing_url: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
        let mut listing_url = listing_url.into();
        if !listing_url.ends_with('/') {
            listing_url.push('/');
        }
        Self {
            listing_url,
            fetcher,
            watches: Vec::new(),
            interval: DEFAULT_POLL_INTERVAL,
            cooldown: DEFAULT_FAILURE_COOLDOWN,
            status: Arc::new(PollStatus::default()),
        }
    }

    pub fn from_config(config: &AddsConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self::new(config.listing_url.clone(), fetcher)
            .with_interval(Duration::from_secs(config.poll_interval_secs))
            .with_cooldown(Duration::from_secs(config.failure_cooldown_secs))
    }

    /// Delay between successful cycles.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Delay before retrying after a failed cycle.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn listing_url(&self) -> &str {
        &self.listing_url
    }

    /// Register interest in `filename`. Watches fire in registration order.
    pub fn add_watch(&mut self, filename: impl Into<String>, callback: Arc<dyn WatchCallback>) {
        let watch = PollWatch::new(self.listing_url.clone(), filename, callback);
        debug!(filename = %watch.filename, "watch registered");
        self.watches.push(watch);
    }

    pub fn watches(&self) -> &[PollWatch] {
        &self.watches
    }

    pub fn status(&self) -> Arc<PollStatus> {
        Arc::clone(&self.status)
    }

    /// Run one cycle: fetch the listing and fire every stale watch.
    ///
    /// Returns how many callbacks completed. A failing callback does not stop
    /// later watches, but its timestamp is left alone so it fires again next
    /// cycle, and the cycle as a whole reports the first such failure.
    pub async fn poll_once(&mut self) -> Result<usize> {
        debug!(url = %self.listing_url, "fetching listing");
        let body = self.fetcher.get(&self.listing_url).await?;
        let html = String::from_utf8_lossy(&body);
        let listing = index_listing(parse_listing(&html)?);

        let mut fired = 0;
        let mut first_err: Option<SchedulerError> = None;

        for watch in &mut self.watches {
            let Some(entry) = listing.get(&watch.filename) else {
                debug!(filename = %watch.filename, "watched file absent from listing");
                continue;
            };
            if !watch.is_stale(entry) {
                continue;
            }

            info!(
                filename = %watch.filename,
                modified = %entry.modified,
                previous = ?watch.last_observed,
                "watched file changed"
            );
            let callback = Arc::clone(&watch.callback);
            match callback.on_change(watch).await {
                Ok(()) => {
                    watch.last_observed = Some(entry.modified);
                    fired += 1;
                }
                Err(reason) => {
                    warn!(filename = %watch.filename, %reason, "watch callback failed");
                    first_err.get_or_insert(SchedulerError::Callback {
                        filename: watch.filename.clone(),
                        reason,
                    });
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(fired),
        }
    }

    /// Poll until `shutdown` broadcasts `true`.
    ///
    /// Failures never end the loop and always clear the status flag. A listing
    /// that could not be fetched or parsed is retried after the cooldown; a
    /// failed callback waits the regular interval, since re-listing sooner
    /// would not change its outcome. Retries are unbounded; the failure streak
    /// is only reported.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let files: Vec<&str> = self.watches.iter().map(|w| w.filename.as_str()).collect();
        info!(url = %self.listing_url, files = ?files, "listing poller started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.poll_once().await {
                Ok(fired) => {
                    self.status.record_success();
                    debug!(fired, "listing poll complete");
                    self.interval
                }
                Err(e @ SchedulerError::Callback { .. }) => {
                    let streak = self.status.record_failure();
                    warn!(
                        error = %e,
                        consecutive_failures = streak,
                        "listing poll completed with callback failures"
                    );
                    self.interval
                }
                Err(e) => {
                    let streak = self.status.record_failure();
                    warn!(
                        error = %e,
                        consecutive_failures = streak,
                        cooldown_secs = self.cooldown.as_secs(),
                        "listing poll failed; retrying after cooldown"
                    );
                    self.cooldown
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

        info!(url = %self.listing_url, "listing poller stopped");
    }

    /// Spawn the loop on the current runtime.
    pub fn start(self) -> PollerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let status = self.status();
        let task = tokio::spawn(self.run(shutdown_rx));
        PollerHandle {
            shutdown_tx,
            task: Mutex::new(Some(task)),
            status,
        }
    }
}

/// Control handle for a running poller.
pub struct PollerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    status: Arc<PollStatus>,
}

impl PollerHandle {
    pub fn last_poll_succeeded(&self) -> bool {
        self.status.last_poll_succeeded()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.status.consecutive_failures()
    }

    pub fn status(&self) -> Arc<PollStatus> {
        Arc::clone(&self.status)
    }

    /// Ask the loop to stop after its current step. Safe to call repeatedly.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Stop and wait for the loop to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("listing poller task ended abnormally: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeronav_core::{FetchError, MemoryFetcher};
    use async_trait::async_trait;

    const URL: &str = "https://weather.example/current/";

    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail: AtomicBool,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WatchCallback for Recorder {
        async fn on_change(&self, watch: &PollWatch) -> std::result::Result<(), String> {
            self.calls.lock().unwrap().push(watch.url());
            if self.fail.load(Ordering::SeqCst) {
                return Err("parse failed".to_string());
            }
            Ok(())
        }
    }

    fn listing(metars: &str) -> String {
        format!(
            "<pre><a href=\"/\">Parent Directory</a>\n\
             <a href=\"metars.cache.xml.gz\">metars.cache.xml.gz</a>  {metars}  1.2M\n</pre>"
        )
    }

    #[tokio::test]
    async fn unchanged_timestamp_fires_once() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert(URL, listing("2025-05-30 14:36"));
        let recorder = Recorder::new();

        let mut poller = RemoteListingPoller::new(URL, fetcher.clone());
        poller.add_watch("metars.cache.xml.gz", recorder.clone());

        assert_eq!(poller.poll_once().await.unwrap(), 1);
        assert_eq!(poller.poll_once().await.unwrap(), 0);
        assert_eq!(recorder.calls(), vec![format!("{URL}metars.cache.xml.gz")]);
        assert!(poller.watches()[0].last_observed.is_some());
    }

    #[tokio::test]
    async fn failed_callback_retries_next_cycle() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert(URL, listing("2025-05-30 14:36"));
        let recorder = Recorder::new();
        recorder.fail.store(true, Ordering::SeqCst);

        let mut poller = RemoteListingPoller::new(URL, fetcher.clone());
        poller.add_watch("metars.cache.xml.gz", recorder.clone());

        let err = poller.poll_once().await.unwrap_err();
        assert_eq!(err.code(), "CALLBACK_ERROR");
        assert!(poller.watches()[0].last_observed.is_none());

        recorder.fail.store(false, Ordering::SeqCst);
        assert_eq!(poller.poll_once().await.unwrap(), 1);
        assert_eq!(recorder.calls().len(), 2);
    }

    #[tokio::test]
    async fn listing_fetch_failure_is_reported() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.fail(
            URL,
            FetchError::Status {
                url: URL.to_string(),
                status: 503,
            },
        );
        let mut poller = RemoteListingPoller::new(URL, fetcher);
        poller.add_watch("metars.cache.xml.gz", Recorder::new());
        let err = poller.poll_once().await.unwrap_err();
        assert_eq!(err.code(), "FETCH_ERROR");
    }

    #[tokio::test(start_paused = true)]
    async fn loop_recovers_after_cooldown() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.fail(
            URL,
            FetchError::Request {
                url: URL.to_string(),
                reason: "connection reset".to_string(),
            },
        );
        let recorder = Recorder::new();
        let mut poller = RemoteListingPoller::new(URL, fetcher.clone())
            .with_interval(Duration::from_secs(300))
            .with_cooldown(Duration::from_secs(60));
        poller.add_watch("metars.cache.xml.gz", recorder.clone());
        let handle = poller.start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!handle.last_poll_succeeded());
        assert_eq!(handle.consecutive_failures(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(handle.consecutive_failures(), 2);

        fetcher.insert(URL, listing("2025-05-30 14:36"));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(handle.last_poll_succeeded());
        assert_eq!(handle.consecutive_failures(), 0);
        assert_eq!(recorder.calls().len(), 1);

        handle.shutdown().await;
        assert!(!handle.is_running());
        // Stopping again is a no-op.
        handle.stop();
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failing_callback_keeps_regular_interval() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert(URL, listing("2025-05-30 14:36"));
        let recorder = Recorder::new();
        recorder.fail.store(true, Ordering::SeqCst);
        let mut poller = RemoteListingPoller::new(URL, fetcher.clone())
            .with_interval(Duration::from_secs(300))
            .with_cooldown(Duration::from_secs(60));
        poller.add_watch("metars.cache.xml.gz", recorder.clone());
        let handle = poller.start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!handle.last_poll_succeeded());
        assert_eq!(handle.consecutive_failures(), 1);

        // Past the cooldown but inside the interval: no extra listing request.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(recorder.calls().len(), 1);
        assert_eq!(fetcher.request_count(URL), 1);

        tokio::time::sleep(Duration::from_secs(180)).await;
        assert_eq!(recorder.calls().len(), 2);
        assert_eq!(handle.consecutive_failures(), 2);

        handle.shutdown().await;
    }
}
