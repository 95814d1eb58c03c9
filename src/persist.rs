//! Best-effort JSON state files.
//!
//! Writes go to a sibling temp file that is then renamed over the target, so a
//! crash mid-write leaves the previous document intact. A missing file is not
//! an error: `load_json` returns `Ok(None)` and the caller falls back to defaults.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{PersistError, PersistResult};

/// Read and parse a JSON document. `Ok(None)` when the file does not exist.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> PersistResult<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(PersistError::Io {
                path: path.display().to_string(),
                source: e,
            });
        }
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| PersistError::Json {
            path: path.display().to_string(),
            source: e,
        })
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> PersistResult<()> {
    let io_err = |source| PersistError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    let data = serde_json::to_vec_pretty(value).map_err(|e| PersistError::Json {
        path: path.display().to_string(),
        source: e,
    })?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, data).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)
}

/// Load a document, logging and discarding any failure.
pub fn load_or_warn<T: DeserializeOwned>(path: &Path, what: &str) -> Option<T> {
    match load_json(path) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, what, "persist: load failed, using defaults");
            None
        }
    }
}

/// Save a document, logging and discarding any failure.
pub fn save_or_warn<T: Serialize>(path: &Path, value: &T, what: &str) {
    if let Err(e) = save_json(path, value) {
        tracing::warn!(error = %e, what, "persist: save failed");
    }
}
