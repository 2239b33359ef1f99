//! On-disk model blobs
//!
//! Every persisted artifact is a JSON envelope around a strategy payload:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "model_type": "ARIMA",
//!   "fit_id": "5f0c2a91d3e47b18",
//!   "fitted_at": "2026-03-02T14:00:00Z",
//!   "fingerprint": { "digest": "…", "len": 250 },
//!   "payload": { … }
//! }
//! ```
//!
//! Writes go through a temporary file in the destination directory that is
//! renamed over the target, so readers never observe a half-written blob.

use crate::error::{ForecastError, Result};
use crate::models::ModelKind;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Version written into every envelope
pub const FORMAT_VERSION: u32 = 1;

/// Identity of a training series
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesFingerprint {
    /// SHA-256 of the little-endian bytes of every value, hex encoded
    pub digest: String,
    /// Number of values
    pub len: usize,
}

impl SeriesFingerprint {
    pub fn of(series: &[f64]) -> Self {
        let mut hasher = Sha256::new();
        for value in series {
            hasher.update(value.to_le_bytes());
        }
        Self {
            digest: hex::encode(hasher.finalize()),
            len: series.len(),
        }
    }

    /// Whether `series` is the series this fingerprint was taken of
    pub fn matches(&self, series: &[f64]) -> bool {
        self.len == series.len() && *self == Self::of(series)
    }
}

/// Provenance of a fit, shared by every artifact written for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitMeta {
    pub fit_id: String,
    pub fitted_at: DateTime<Utc>,
    pub fingerprint: SeriesFingerprint,
}

impl FitMeta {
    /// Provenance for a fit on `series` made now
    pub fn new(series: &[f64]) -> Self {
        Self {
            fit_id: format!("{:016x}", rand::random::<u64>()),
            fitted_at: Utc::now(),
            fingerprint: SeriesFingerprint::of(series),
        }
    }
}

/// Versioned envelope around a persisted payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBlob<T> {
    pub format_version: u32,
    pub model_type: ModelKind,
    pub fit_id: String,
    pub fitted_at: DateTime<Utc>,
    pub fingerprint: SeriesFingerprint,
    pub payload: T,
}

impl<T> ModelBlob<T> {
    pub fn new(model_type: ModelKind, meta: &FitMeta, payload: T) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            model_type,
            fit_id: meta.fit_id.clone(),
            fitted_at: meta.fitted_at,
            fingerprint: meta.fingerprint.clone(),
            payload,
        }
    }

    /// Provenance recorded in the envelope
    pub fn meta(&self) -> FitMeta {
        FitMeta {
            fit_id: self.fit_id.clone(),
            fitted_at: self.fitted_at,
            fingerprint: self.fingerprint.clone(),
        }
    }
}

/// Write `bytes` to a synced temporary file next to `path`
fn stage(path: &Path, bytes: &[u8]) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

/// Replace `path` with `bytes` in a single rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    write_atomic_all(&[(path, bytes)])
}

/// Replace several files, renaming only once every one of them is staged
///
/// A failure while writing leaves every target untouched. Staged files that
/// are never renamed are removed when they drop.
pub fn write_atomic_all(files: &[(&Path, &[u8])]) -> Result<()> {
    let staged = files
        .iter()
        .map(|&(path, bytes)| stage(path, bytes).map(|tmp| (tmp, path)))
        .collect::<Result<Vec<_>>>()?;

    for (tmp, path) in staged {
        tmp.persist(path).map_err(|e| ForecastError::IoError(e.error))?;
    }
    Ok(())
}

/// Serialize and atomically write an envelope
pub fn write_blob<T: Serialize>(path: &Path, blob: &ModelBlob<T>) -> Result<()> {
    let bytes = serde_json::to_vec(blob)?;
    write_atomic(path, &bytes)
}

/// Read an envelope and check it belongs to `expected`
///
/// A missing file is `PersistenceNotFound`. Anything unreadable, of another
/// format version or of another strategy is `PersistenceCorrupt`.
pub fn read_blob<T: DeserializeOwned>(path: &Path, expected: ModelKind) -> Result<ModelBlob<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ForecastError::PersistenceNotFound(path.to_path_buf()))
        }
        Err(e) => return Err(ForecastError::corrupt(path, e)),
    };

    let blob: ModelBlob<T> =
        serde_json::from_slice(&bytes).map_err(|e| ForecastError::corrupt(path, e))?;

    if blob.format_version != FORMAT_VERSION {
        return Err(ForecastError::corrupt(
            path,
            format!(
                "format version {} is not supported (expected {})",
                blob.format_version, FORMAT_VERSION
            ),
        ));
    }
    if blob.model_type != expected {
        return Err(ForecastError::corrupt(
            path,
            format!("blob holds a {} model, expected {}", blob.model_type, expected),
        ));
    }

    Ok(blob)
}
