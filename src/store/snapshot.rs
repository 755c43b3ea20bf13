use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use super::StoreState;
use crate::error::Result;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    state: StoreState,
}

/// Durable copy of the store on local disk
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<StoreState>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot = serde_json::from_str(&raw)?;
        if snapshot.version != SNAPSHOT_VERSION {
            debug!("Discarding snapshot version {}", snapshot.version);
            return Ok(None);
        }
        Ok(Some(snapshot.state))
    }

    /// Write to a uniquely named sibling temp file, then rename over the
    /// old snapshot
    pub fn save(&self, state: &StoreState) -> Result<()> {
        #[derive(Serialize)]
        struct SnapshotRef<'a> {
            version: u32,
            state: &'a StoreState,
        }

        let json = serde_json::to_vec(&SnapshotRef {
            version: SNAPSHOT_VERSION,
            state,
        })?;
        let parent = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent)?;
                parent
            }
            None => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Serializes snapshot writes so the file only ever moves forward.
///
/// Copies are staged in version order while the state lock is held.
/// Whoever flushes next writes the newest staged copy; older ones are
/// skipped.
#[derive(Debug)]
pub(crate) struct SnapshotWriter {
    file: SnapshotFile,
    staged: Mutex<Option<(u64, StoreState)>>,
    written: Mutex<u64>,
}

impl SnapshotWriter {
    pub(crate) fn new(file: SnapshotFile) -> Self {
        Self {
            file,
            staged: Mutex::new(None),
            written: Mutex::new(0),
        }
    }

    pub(crate) fn file(&self) -> &SnapshotFile {
        &self.file
    }

    pub(crate) fn stage(&self, version: u64, state: StoreState) {
        let mut staged = self.staged.lock().unwrap_or_else(PoisonError::into_inner);
        if staged.as_ref().map_or(true, |(v, _)| *v < version) {
            *staged = Some((version, state));
        }
    }

    /// Write the newest staged copy, if it is newer than what is on disk
    pub(crate) fn flush(&self) -> Result<()> {
        let mut written = self.written.lock().unwrap_or_else(PoisonError::into_inner);
        let staged = self
            .staged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some((version, state)) = staged else {
            return Ok(());
        };
        if version <= *written {
            return Ok(());
        }
        self.file.save(&state)?;
        *written = version;
        debug!("Snapshot v{} written to {}", version, self.file.path().display());
        Ok(())
    }
}
