//! Unpacking a downloaded edition bundle into the cache.

use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::{DcsError, Result};

const STAGING_SUFFIX: &str = "partial";

/// Extract every member of `bundle` under `dest`, lower-casing member paths.
///
/// Upstream filename casing varies between editions, so the cache only ever
/// holds lower-case paths. Members are extracted into a sibling staging
/// directory that is renamed to `dest` once complete; `dest` therefore either
/// does not exist or holds a whole edition. Returns the number of files written.
pub fn catalogue_bundle(bundle: &[u8], dest: &Path) -> Result<usize> {
    let staging = staging_path(dest);
    if staging.exists() {
        debug!(path = %staging.display(), "removing stale staging directory");
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let written = match extract_into(bundle, &staging) {
        Ok(n) => n,
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                warn!(path = %staging.display(), error = %cleanup, "failed to remove staging directory");
            }
            return Err(e);
        }
    };

    fs::rename(&staging, dest)?;
    Ok(written)
}

fn extract_into(bundle: &[u8], root: &Path) -> Result<usize> {
    let mut archive = ZipArchive::new(Cursor::new(bundle))?;
    let mut written = 0;

    for i in 0..archive.len() {
        let mut member = archive.by_index(i)?;
        if member.is_dir() {
            continue;
        }
        let Some(relative) = member.enclosed_name().map(lowercase_path) else {
            return Err(DcsError::Archive(format!(
                "bundle member escapes the edition directory: {}",
                member.name()
            )));
        };

        let target = root.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&target)?;
        io::copy(&mut member, &mut out)?;
        written += 1;
    }
    Ok(written)
}

fn lowercase_path(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().to_lowercase())
}

fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(STAGING_SUFFIX);
    dest.with_file_name(name)
}
