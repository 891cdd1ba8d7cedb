//! Durable file primitives shared by the checkpoint and result stores.
//!
//! Every record is JSON. Writes go to a hidden sibling file that is synced and
//! then renamed over the target, so readers see either the old or the new
//! bytes and never a torn write.

use crate::error::{EvalError, Result};
use fs4::fs_std::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Name of the advisory lock file held for the duration of a run.
pub const LOCK_FILENAME: &str = ".lock";

/// Ensure a directory exists.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| EvalError::io(path, e))?;
    }
    Ok(())
}

/// Atomically replace `path` with `bytes`.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("record");
    let tmp = path.with_file_name(format!(".{}.tmp.{}", name, std::process::id()));

    let mut file = File::create(&tmp).map_err(|e| EvalError::io(&tmp, e))?;
    file.write_all(bytes).map_err(|e| EvalError::io(&tmp, e))?;
    file.sync_all().map_err(|e| EvalError::io(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, path).map_err(|e| EvalError::io(path, e))?;

    // Best effort: make the rename itself durable.
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

/// Atomically write a value as pretty JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &data)
}

/// Read raw bytes, returning `None` when the file does not exist.
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(EvalError::io(path, e)),
    }
}

/// Read and parse a JSON file, returning `None` when it does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match read_optional(path)? {
        Some(data) => {
            let value = serde_json::from_slice(&data)
                .map_err(|e| EvalError::Serialization(format!("{}: {}", path.display(), e)))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Append a line to a human-readable log, flushing before returning.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| EvalError::io(path, e))?;
    writeln!(file, "{}", line).map_err(|e| EvalError::io(path, e))?;
    file.flush().map_err(|e| EvalError::io(path, e))?;

    Ok(())
}

/// Exclusive claim on an output directory.
///
/// Held as an OS advisory lock on `.lock`, so it is released when the handle
/// is dropped or the process dies. The file itself is left in place.
#[derive(Debug)]
pub struct DirLock {
    path: PathBuf,
    _file: File,
}

impl DirLock {
    /// Claim `dir`, failing if another run already holds it.
    pub fn acquire(dir: &Path) -> Result<Self> {
        ensure_dir(dir)?;
        let path = dir.join(LOCK_FILENAME);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| EvalError::io(&path, e))?;

        file.try_lock_exclusive().map_err(|e| {
            EvalError::io(
                &path,
                io::Error::new(
                    e.kind(),
                    format!("output directory is in use by another run: {}", e),
                ),
            )
        })?;

        file.set_len(0).map_err(|e| EvalError::io(&path, e))?;
        writeln!(file, "{}", std::process::id()).map_err(|e| EvalError::io(&path, e))?;

        Ok(Self { path, _file: file })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
