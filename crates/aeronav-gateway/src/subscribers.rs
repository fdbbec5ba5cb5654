//! DTPP version subscribers owned by the gateway.

use std::path::{Path, PathBuf};

use aeronav_dtpp::{ValidityHeader, VersionFile, VersionSubscriber};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

#[derive(Serialize)]
struct CurrentPointer<'a> {
    cycle: &'a str,
    code: String,
    path: &'a Path,
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
}

/// Publishes the resolved version as `current.json` so the plate index (and
/// anything else outside this process) can find the file to load.
pub struct CurrentVersionPointer {
    path: PathBuf,
}

impl CurrentVersionPointer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl VersionSubscriber for CurrentVersionPointer {
    async fn on_version_changed(
        &self,
        header: &ValidityHeader,
        version: &VersionFile,
    ) -> Result<(), String> {
        let pointer = CurrentPointer {
            cycle: &header.cycle,
            code: version.id.code(),
            path: &version.path,
            valid_from: header.valid_from,
            valid_to: header.valid_to,
        };
        let json = serde_json::to_vec_pretty(&pointer).map_err(|e| e.to_string())?;

        let tmp = self.path.with_extension("json.partial");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| format!("write {}: {e}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| format!("rename into {}: {e}", self.path.display()))?;

        info!(cycle = %header.cycle, valid_to = %header.valid_to, "plate index pointer updated");
        Ok(())
    }
}
