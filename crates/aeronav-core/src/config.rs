use std::path::PathBuf;

use chrono::NaiveDate;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{AeronavError, Result};

pub const DEFAULT_DCS_PAYLOAD_URL: &str = "https://aeronav.faa.gov/Upload_313-d/supplements";
pub const DEFAULT_DTPP_REMOTE_URL: &str = "https://aeronav.faa.gov/d-tpp";
pub const DEFAULT_DTPP_INDEX: &str = "d-tpp_Metafile";
pub const DEFAULT_ADDS_LISTING_URL: &str =
    "https://aviationweather.gov/adds/dataserver_current/current/";

/// Chart supplements are republished every 56 days from this date.
pub const DCS_ANCHOR: (i32, u32, u32) = (2025, 2, 20);
pub const DCS_CYCLE_DAYS: i64 = 56;
/// Bundles appear upstream roughly this many days before their cycle starts.
pub const DCS_LEAD_DAYS: i64 = 20;

/// Top-level config (aeronav.toml + AERONAV_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AeronavConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub dcs: DcsConfig,
    #[serde(default)]
    pub dtpp: DtppConfig,
    #[serde(default)]
    pub adds: AddsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory; each component owns one subdirectory below it.
    #[serde(default = "default_cache_root")]
    pub root: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: default_cache_root(),
        }
    }
}

impl CacheConfig {
    pub fn dcs_dir(&self) -> PathBuf {
        self.root.join("dcs")
    }

    pub fn dtpp_dir(&self) -> PathBuf {
        self.root.join("dtpp")
    }

    pub fn adds_dir(&self) -> PathBuf {
        self.root.join("adds")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Chart supplement (DCS) publication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcsConfig {
    #[serde(default = "default_dcs_payload_url")]
    pub payload_base_url: String,
    #[serde(default = "default_dcs_anchor")]
    pub anchor: NaiveDate,
    #[serde(default = "default_dcs_cycle_days")]
    pub cycle_days: i64,
    #[serde(default = "default_dcs_lead_days")]
    pub lead_days: i64,
    /// Hours between background refreshes. 0 runs the refresh once at start-up.
    #[serde(default = "default_refresh_hours")]
    pub refresh_interval_hours: u64,
}

impl Default for DcsConfig {
    fn default() -> Self {
        Self {
            payload_base_url: default_dcs_payload_url(),
            anchor: default_dcs_anchor(),
            cycle_days: DCS_CYCLE_DAYS,
            lead_days: DCS_LEAD_DAYS,
            refresh_interval_hours: default_refresh_hours(),
        }
    }
}

/// Terminal procedures (DTPP) metadata settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DtppConfig {
    #[serde(default = "default_dtpp_remote_url")]
    pub remote_base_url: String,
    /// File stem of the metadata document under `<version>/xml_data/`.
    #[serde(default = "default_dtpp_index")]
    pub index_name: String,
    /// Added to the time left in the current validity window before waking.
    #[serde(default = "default_wake_margin_secs")]
    pub wake_margin_secs: u64,
    /// Wake delay after a cycle that could not resolve a valid version.
    #[serde(default = "default_retry_after_secs")]
    pub retry_after_secs: u64,
}

impl Default for DtppConfig {
    fn default() -> Self {
        Self {
            remote_base_url: default_dtpp_remote_url(),
            index_name: default_dtpp_index(),
            wake_margin_secs: default_wake_margin_secs(),
            retry_after_secs: default_retry_after_secs(),
        }
    }
}

/// Weather bulletin (ADDS) listing poller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddsConfig {
    #[serde(default = "default_adds_listing_url")]
    pub listing_url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_failure_cooldown_secs")]
    pub failure_cooldown_secs: u64,
    /// Filenames (no directory) watched in the listing.
    #[serde(default = "default_adds_files")]
    pub files: Vec<String>,
}

impl Default for AddsConfig {
    fn default() -> Self {
        Self {
            listing_url: default_adds_listing_url(),
            poll_interval_secs: default_poll_interval_secs(),
            failure_cooldown_secs: default_failure_cooldown_secs(),
            files: default_adds_files(),
        }
    }
}

fn default_cache_root() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(format!("{}/.aeronav/cache", home))
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_user_agent() -> String {
    format!("aeronav/{}", env!("CARGO_PKG_VERSION"))
}
fn default_dcs_payload_url() -> String {
    DEFAULT_DCS_PAYLOAD_URL.to_string()
}
fn default_dcs_anchor() -> NaiveDate {
    let (y, m, d) = DCS_ANCHOR;
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
}
fn default_dcs_cycle_days() -> i64 {
    DCS_CYCLE_DAYS
}
fn default_dcs_lead_days() -> i64 {
    DCS_LEAD_DAYS
}
fn default_refresh_hours() -> u64 {
    24
}
fn default_dtpp_remote_url() -> String {
    DEFAULT_DTPP_REMOTE_URL.to_string()
}
fn default_dtpp_index() -> String {
    DEFAULT_DTPP_INDEX.to_string()
}
fn default_wake_margin_secs() -> u64 {
    10
}
fn default_retry_after_secs() -> u64 {
    15 * 60
}
fn default_adds_listing_url() -> String {
    DEFAULT_ADDS_LISTING_URL.to_string()
}
fn default_poll_interval_secs() -> u64 {
    5 * 60
}
fn default_failure_cooldown_secs() -> u64 {
    60
}
fn default_adds_files() -> Vec<String> {
    vec![
        "metars.cache.xml.gz".to_string(),
        "tafs.cache.xml.gz".to_string(),
    ]
}

impl AeronavConfig {
    /// Load config from a TOML file with AERONAV_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g. `AERONAV_DTPP__RETRY_AFTER_SECS`,
    /// because single underscores already appear inside key names.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. AERONAV_CONFIG env var
    ///   3. ~/.aeronav/aeronav.toml
    ///
    /// A missing file is not an error; every section falls back to its defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("AERONAV_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        let config: AeronavConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("AERONAV_").split("__"))
            .extract()
            .map_err(|e| AeronavError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the calendar or the loops degenerate.
    pub fn validate(&self) -> Result<()> {
        if self.dcs.cycle_days <= 0 {
            return Err(AeronavError::Config(format!(
                "dcs.cycle_days must be positive, got {}",
                self.dcs.cycle_days
            )));
        }
        if self.dcs.lead_days < 0 || self.dcs.lead_days >= self.dcs.cycle_days {
            return Err(AeronavError::Config(format!(
                "dcs.lead_days must be in [0, {}), got {}",
                self.dcs.cycle_days, self.dcs.lead_days
            )));
        }
        if self.adds.poll_interval_secs == 0 {
            return Err(AeronavError::Config(
                "adds.poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.dtpp.retry_after_secs == 0 {
            return Err(AeronavError::Config(
                "dtpp.retry_after_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.aeronav/aeronav.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_publication_calendar() {
        let config = AeronavConfig::default();
        assert_eq!(
            config.dcs.anchor,
            NaiveDate::from_ymd_opt(2025, 2, 20).unwrap()
        );
        assert_eq!(config.dcs.cycle_days, 56);
        assert_eq!(config.dcs.lead_days, 20);
        assert_eq!(config.adds.failure_cooldown_secs, 60);
        assert_eq!(config.dtpp.wake_margin_secs, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = AeronavConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.dtpp.index_name, DEFAULT_DTPP_INDEX);
        assert_eq!(config.adds.files.len(), 2);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aeronav.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[cache]\nroot = \"/srv/aeronav\"\n\n[adds]\nfiles = [\"aircraftreports.cache.xml.gz\"]\npoll_interval_secs = 120"
        )
        .unwrap();

        let config = AeronavConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.cache.dcs_dir(), PathBuf::from("/srv/aeronav/dcs"));
        assert_eq!(config.adds.files, vec!["aircraftreports.cache.xml.gz"]);
        assert_eq!(config.adds.poll_interval_secs, 120);
        assert_eq!(config.adds.failure_cooldown_secs, 60);
    }

    #[test]
    fn zero_cycle_length_is_rejected() {
        let mut config = AeronavConfig::default();
        config.dcs.cycle_days = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}
