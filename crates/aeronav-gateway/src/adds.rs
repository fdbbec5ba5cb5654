//! Local mirror of ADDS weather bulletin files.

use std::path::PathBuf;
use std::sync::Arc;

use aeronav_core::Fetcher;
use aeronav_scheduler::{PollWatch, WatchCallback};
use async_trait::async_trait;
use tracing::info;

/// Downloads a watched file to `<dir>/<filename>` each time it changes upstream.
pub struct BulletinMirror {
    dir: PathBuf,
    fetcher: Arc<dyn Fetcher>,
}

impl BulletinMirror {
    pub fn new(dir: impl Into<PathBuf>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            dir: dir.into(),
            fetcher,
        }
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }
}

#[async_trait]
impl WatchCallback for BulletinMirror {
    async fn on_change(&self, watch: &PollWatch) -> Result<(), String> {
        let body = self
            .fetcher
            .get(&watch.url())
            .await
            .map_err(|e| e.to_string())?;

        let target = self.path_for(&watch.filename);
        let tmp = self.dir.join(format!("{}.partial", watch.filename));
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| format!("create {}: {e}", self.dir.display()))?;
        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| format!("write {}: {e}", tmp.display()))?;
        tokio::fs::rename(&tmp, &target)
            .await
            .map_err(|e| format!("rename into {}: {e}", target.display()))?;

        info!(filename = %watch.filename, bytes = body.len(), "bulletin mirrored");
        Ok(())
    }
}
