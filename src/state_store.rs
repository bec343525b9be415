//! Flat binary persistence of the validation window.
//!
//! The file holds exactly `capacity` little-endian floats at the configured
//! precision: no header, no length prefix, no checksum. Slots after the last
//! non-zero value are padding. The file is the only channel between a
//! validation-side process that writes it and a training-side process that
//! polls it.
//!
//! A second file next to it, `<path>.best`, holds a single little-endian f64:
//! the lowest validation epoch mean seen so far, which outlives window
//! eviction and feeds the legacy trend rule.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::config::Precision;
use crate::error::Result;
use crate::window::ValidationWindow;

/// Reader and writer for the persisted validation window.
///
/// Holds no file handle; every call opens the file afresh so concurrent
/// processes always observe the latest renamed-in version.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    capacity: usize,
    precision: Precision,
}

impl StateStore {
    /// Creates a store for a window file.
    ///
    /// # Arguments
    /// * `path` - Location of the window file
    /// * `capacity` - Number of slots in the file
    /// * `precision` - Width of each slot
    ///
    /// # Returns
    /// A `StateStore`; nothing is touched on disk until `save` or `load`
    pub fn new(path: impl Into<PathBuf>, capacity: usize, precision: Precision) -> Self {
        Self {
            path: path.into(),
            capacity,
            precision,
        }
    }

    /// Location of the window file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location of the best-validation file (`<path>.best`).
    pub fn best_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".best");
        PathBuf::from(name)
    }

    /// Number of window slots in the file.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size in bytes of a complete state file.
    pub fn file_len(&self) -> usize {
        self.capacity * self.precision.width()
    }

    /// Save the full zero-padded window.
    ///
    /// The bytes go to a temporary file in the target directory which is then
    /// renamed over `path`, so a concurrent reader sees either the old or the
    /// new window.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created or the file cannot be
    /// written or renamed
    pub fn save(&self, window: &ValidationWindow) -> Result<()> {
        write_atomic(&self.path, &self.encode(window))
    }

    /// Save the lowest validation mean seen so far.
    ///
    /// # Errors
    /// Same failure modes as [`StateStore::save`]
    pub fn save_best(&self, best: f64) -> Result<()> {
        write_atomic(&self.best_path(), &best.to_le_bytes())
    }

    /// Load the lowest validation mean seen so far.
    ///
    /// A missing or short file yields `None`.
    ///
    /// # Errors
    /// Returns error for any I/O failure other than the file being absent
    pub fn load_best(&self) -> Result<Option<f64>> {
        let bytes = match fs::read(self.best_path()) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let Some(chunk) = bytes.get(..8) else {
            return Ok(None);
        };
        let mut raw = [0u8; 8];
        raw.copy_from_slice(chunk);
        Ok(Some(f64::from_le_bytes(raw)).filter(|best| best.is_finite()))
    }

    /// Load the persisted window.
    ///
    /// A missing or short file means no validation epoch has been written yet
    /// and yields an empty window.
    ///
    /// # Errors
    /// Returns error for any I/O failure other than the file being absent
    pub fn load(&self) -> Result<ValidationWindow> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(ValidationWindow::new(self.capacity));
            }
            Err(err) => return Err(err.into()),
        };

        if bytes.len() < self.file_len() {
            tracing::debug!(
                "state file {} is short ({} of {} bytes), treating as empty",
                self.path.display(),
                bytes.len(),
                self.file_len()
            );
            return Ok(ValidationWindow::new(self.capacity));
        }

        Ok(self.decode(&bytes[..self.file_len()]))
    }

    fn encode(&self, window: &ValidationWindow) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.file_len());
        for value in window.padded().into_iter().take(self.capacity) {
            match self.precision {
                Precision::F32 => out.extend_from_slice(&(value as f32).to_le_bytes()),
                Precision::F64 => out.extend_from_slice(&value.to_le_bytes()),
            }
        }
        out
    }

    fn decode(&self, bytes: &[u8]) -> ValidationWindow {
        let width = self.precision.width();
        let values: Vec<f64> = bytes
            .chunks_exact(width)
            .map(|chunk| match self.precision {
                Precision::F32 => {
                    let mut raw = [0u8; 4];
                    raw.copy_from_slice(chunk);
                    f32::from_le_bytes(raw) as f64
                }
                Precision::F64 => {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(chunk);
                    f64::from_le_bytes(raw)
                }
            })
            .collect();

        // Trailing zeros are padding, not zero-loss epochs
        let len = values
            .iter()
            .rposition(|v| *v != 0.0)
            .map_or(0, |last| last + 1);
        ValidationWindow::from_values(self.capacity, values.into_iter().take(len))
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}
