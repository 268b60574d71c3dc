use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::TelemetryError;

pub const ERROR_LOG: &str = "error.log";
pub const COMBINED_LOG: &str = "combined.log";

/// Append-only file handles shared by the JSON layers.
///
/// Each formatted event reaches the file in a single `write` on an
/// `O_APPEND` handle, so concurrent handlers never interleave lines.
#[derive(Clone, Debug)]
pub struct LogFiles {
    pub(crate) error: Arc<File>,
    pub(crate) combined: Arc<File>,
    dir: PathBuf,
}

impl LogFiles {
    pub fn open(dir: &Path) -> Result<Self, TelemetryError> {
        std::fs::create_dir_all(dir).map_err(|source| TelemetryError::OpenSink {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            error: Arc::new(open_append(&dir.join(ERROR_LOG))?),
            combined: Arc::new(open_append(&dir.join(COMBINED_LOG))?),
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn sync(&self) -> std::io::Result<()> {
        self.error.sync_all()?;
        self.combined.sync_all()
    }
}

fn open_append(path: &Path) -> Result<File, TelemetryError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| TelemetryError::OpenSink {
            path: path.to_path_buf(),
            source,
        })
}
