//! Herd state persistence with file locking.
//!
//! The state document is the full entity graph in the backup schema:
//! `protocols`, `cattleProtocols`, the inventory and notes sections the
//! engine carries opaquely, `backupDate` and `version`. Writes are atomic
//! and serialized through an exclusive lock on a sidecar lock file.

use crate::assignment::AssignmentEngine;
use crate::calendar::JalaliDate;
use crate::clock::Clock;
use crate::protocol::ProtocolStore;
use crate::{Error, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Backup schema version written by this crate
pub const SCHEMA_VERSION: &str = "2.1.0";

fn empty_object() -> Value {
    Value::Object(Default::default())
}

fn empty_array() -> Value {
    Value::Array(Vec::new())
}

fn schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// Everything persisted between runs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HerdState {
    /// Section id to animal numbers; carried through untouched
    #[serde(default = "empty_object")]
    pub cattle_data: Value,

    /// Section id to display name; carried through untouched
    #[serde(default = "empty_object")]
    pub section_names: Value,

    /// Removed animals log; carried through untouched
    #[serde(default = "empty_array")]
    pub deleted_cattle: Value,

    /// Date to note text; carried through untouched
    #[serde(default = "empty_object")]
    pub daily_notes: Value,

    #[serde(default)]
    pub protocols: ProtocolStore,

    #[serde(default)]
    pub cattle_protocols: AssignmentEngine,

    /// Date of the last save
    #[serde(default)]
    pub backup_date: Option<JalaliDate>,

    #[serde(default = "schema_version")]
    pub version: String,
}

impl Default for HerdState {
    fn default() -> Self {
        Self {
            cattle_data: empty_object(),
            section_names: empty_object(),
            deleted_cattle: empty_array(),
            daily_notes: empty_object(),
            protocols: ProtocolStore::default(),
            cattle_protocols: AssignmentEngine::default(),
            backup_date: None,
            version: schema_version(),
        }
    }
}

impl HerdState {
    /// Load state from a file with shared locking
    ///
    /// Returns default state if the file doesn't exist. A document that fails
    /// to parse or violates a model invariant is an `Error::State`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No state file at {:?}, starting empty", path);
            return Ok(Self::default());
        }

        let file = File::open(path)?;
        file.lock_shared()?;

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        file.unlock()?;
        read?;

        let state: HerdState = serde_json::from_str(&contents).map_err(|e| {
            Error::State(format!("{:?} is not a valid herd document: {}", path, e))
        })?;
        tracing::info!("Loaded herd state from {:?}", path);
        Ok(state)
    }

    /// Save state to a file
    ///
    /// Atomically writes state by:
    /// 1. Writing to a temp file in the same directory
    /// 2. Syncing to disk
    /// 3. Renaming over the original
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::State(format!("state path {:?} has no parent", path)))?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::info!("Saved herd state to {:?}", path);
        Ok(())
    }

    /// Record the save date and schema version
    pub fn stamp(&mut self, today: JalaliDate) {
        self.backup_date = Some(today);
        self.version = schema_version();
    }

    /// Load, modify and save under one exclusive lock
    ///
    /// Concurrent updaters queue on `<path>.lock`, so no update is lost and
    /// readers only ever see a complete document. Nothing is written when
    /// `f` fails.
    pub fn update<F, T>(path: &Path, clock: &dyn Clock, f: F) -> Result<T>
    where
        F: FnOnce(&mut HerdState) -> Result<T>,
    {
        let _guard = UpdateLock::acquire(path)?;
        let mut state = Self::load(path)?;
        let outcome = f(&mut state)?;
        state.stamp(clock.today()?);
        state.save(path)?;
        Ok(outcome)
    }
}

/// Exclusive lock on the sidecar file, released on drop
struct UpdateLock {
    file: File,
}

impl UpdateLock {
    fn acquire(state_path: &Path) -> Result<Self> {
        let lock_path = lock_path_for(state_path);
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        file.lock_exclusive()?;
        tracing::debug!("Acquired update lock {:?}", lock_path);
        Ok(Self { file })
    }
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!("Failed to release update lock: {}", e);
        }
    }
}

fn lock_path_for(state_path: &Path) -> PathBuf {
    let mut name = state_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}
