//! Profile persistence across reconnects.
//!
//! The controllers only need two operations, [`ProfileStore::find`] and
//! [`ProfileStore::upsert`], keyed by serial number. Two stores ship with the
//! crate:
//! - [`MemoryProfileStore`]: lives as long as the process.
//! - [`JsonProfileStore`]: one JSON file per serial under a directory, written
//!   atomically (temp file + rename).

use crate::error::StoreError;
use crate::profile::Profile;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Keyed storage of profile snapshots.
pub trait ProfileStore: Send + Sync {
    fn find(&self, serial: &str) -> Result<Option<Profile>, StoreError>;

    /// Insert or overwrite the snapshot stored under `serial`.
    fn upsert(&self, serial: &str, profile: Profile) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<String, Profile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn find(&self, serial: &str) -> Result<Option<Profile>, StoreError> {
        Ok(self.profiles.read().get(serial).cloned())
    }

    fn upsert(&self, serial: &str, profile: Profile) -> Result<(), StoreError> {
        self.profiles.write().insert(serial.to_string(), profile);
        Ok(())
    }
}

#[derive(Debug)]
pub struct JsonProfileStore {
    base_dir: PathBuf,
}

impl JsonProfileStore {
    /// Open a store rooted at `base_dir`, creating the directory if needed.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, serial: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", file_stem(serial)))
    }
}

/// Map a serial onto a safe file name.
///
/// ASCII letters, digits and `-` pass through; every other byte becomes `_XX`
/// (upper-case hex). `_` always starts an escape, so distinct serials never
/// share a file.
fn file_stem(serial: &str) -> String {
    if serial.is_empty() {
        return "_".to_string();
    }
    let mut stem = String::with_capacity(serial.len());
    for byte in serial.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("_{byte:02X}"));
        }
    }
    stem
}

impl ProfileStore for JsonProfileStore {
    fn find(&self, serial: &str) -> Result<Option<Profile>, StoreError> {
        let path = self.path_for(serial);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let profile: Profile = serde_json::from_str(&text)?;
        if profile.serial != serial {
            warn!(path = ?path, stored = %profile.serial, %serial, "Ignoring profile stored for another serial");
            return Ok(None);
        }
        debug!(path = ?path, "Loaded stored profile");
        Ok(Some(profile))
    }

    fn upsert(&self, serial: &str, profile: Profile) -> Result<(), StoreError> {
        let path = self.path_for(serial);
        let temp_path = path.with_extension("tmp");
        let text = serde_json::to_string_pretty(&profile)?;

        fs::write(&temp_path, text)?;
        fs::rename(&temp_path, &path)?;
        debug!(path = ?path, "Stored profile");
        Ok(())
    }
}
