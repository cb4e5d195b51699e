//! Durable state: the committed occupancy set and rotation cursor.
//!
//! Two backings exist. [`FileLedgerStore`] keeps the global ledger as JSON
//! files in the data directory. [`ScopedLedgerStore`] keeps one ledger per
//! `(user, academic year, semester)` in a [`KeyValueStore`].

use crate::data::UserScope;
use crate::error::StoreError;
use crate::ledger::OccupancyKey;
use crate::rotation::RESET_CURSOR;
use log::{error, warn};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const OCCUPANCY_FILE: &str = "occupied_rooms.json";
pub const CURSOR_FILE: &str = "rotation_cursor.json";

pub trait LedgerStore: Send + Sync {
    fn load_committed(&self) -> Result<HashSet<OccupancyKey>, StoreError>;
    fn save_committed(&self, keys: &HashSet<OccupancyKey>) -> Result<(), StoreError>;
    fn load_cursor(&self) -> Result<i32, StoreError>;
    fn save_cursor(&self, cursor: i32) -> Result<(), StoreError>;

    /// Committed set, or empty if it cannot be read.
    fn committed_or_empty(&self) -> HashSet<OccupancyKey> {
        self.load_committed().unwrap_or_else(|e| {
            error!("Failed to load committed occupancy, starting empty: {}", e);
            HashSet::new()
        })
    }

    /// Cursor, or the reset value if it cannot be read.
    fn cursor_or_reset(&self) -> i32 {
        self.load_cursor().unwrap_or_else(|e| {
            error!("Failed to load rotation cursor, using {}: {}", RESET_CURSOR, e);
            RESET_CURSOR
        })
    }
}

fn encode_keys(keys: &HashSet<OccupancyKey>) -> Vec<String> {
    let mut encoded: Vec<String> = keys.iter().map(OccupancyKey::to_string).collect();
    encoded.sort();
    encoded
}

fn decode_keys(raw: Vec<String>) -> HashSet<OccupancyKey> {
    raw.into_iter()
        .filter_map(|entry| match entry.parse() {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("Skipping occupancy entry: {}", e);
                None
            }
        })
        .collect()
}

fn write_atomically(path: &Path, contents: &str) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Global ledger persisted as two files in a directory.
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    dir: PathBuf,
}

impl FileLedgerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read_optional(&self, name: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.dir.join(name)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl LedgerStore for FileLedgerStore {
    fn load_committed(&self) -> Result<HashSet<OccupancyKey>, StoreError> {
        match self.read_optional(OCCUPANCY_FILE)? {
            Some(contents) => Ok(decode_keys(serde_json::from_str(&contents)?)),
            None => Ok(HashSet::new()),
        }
    }

    fn save_committed(&self, keys: &HashSet<OccupancyKey>) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(&encode_keys(keys))?;
        write_atomically(&self.dir.join(OCCUPANCY_FILE), &contents)
    }

    fn load_cursor(&self) -> Result<i32, StoreError> {
        match self.read_optional(CURSOR_FILE)? {
            Some(contents) => Ok(serde_json::from_str(contents.trim())?),
            None => Ok(RESET_CURSOR),
        }
    }

    fn save_cursor(&self, cursor: i32) -> Result<(), StoreError> {
        write_atomically(&self.dir.join(CURSOR_FILE), &serde_json::to_string(&cursor)?)
    }
}

/// Minimal string key-value store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// Key-value store kept in memory and flushed to one JSON file on every write.
#[derive(Debug)]
pub struct FileKvStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileKvStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        write_atomically(&self.path, &serde_json::to_string_pretty(entries)?)
    }
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

/// Ledger of one user scope inside a [`KeyValueStore`].
pub struct ScopedLedgerStore {
    kv: Arc<dyn KeyValueStore>,
    cursor_key: String,
    occupancy_key: String,
}

impl ScopedLedgerStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, scope: &UserScope) -> Self {
        Self {
            kv,
            cursor_key: format!("schedule:cursor:{}", scope),
            occupancy_key: format!("schedule:occupancy:{}", scope),
        }
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.kv.delete(&self.occupancy_key)?;
        self.save_cursor(RESET_CURSOR)
    }
}

impl LedgerStore for ScopedLedgerStore {
    fn load_committed(&self) -> Result<HashSet<OccupancyKey>, StoreError> {
        match self.kv.get(&self.occupancy_key)? {
            Some(raw) => Ok(decode_keys(serde_json::from_str(&raw)?)),
            None => Ok(HashSet::new()),
        }
    }

    fn save_committed(&self, keys: &HashSet<OccupancyKey>) -> Result<(), StoreError> {
        self.kv
            .set(&self.occupancy_key, &serde_json::to_string(&encode_keys(keys))?)
    }

    /// Reading an absent cursor stores the reset value before returning it.
    fn load_cursor(&self) -> Result<i32, StoreError> {
        match self.kv.get(&self.cursor_key)? {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| StoreError::MalformedCursor(raw)),
            None => {
                self.save_cursor(RESET_CURSOR)?;
                Ok(RESET_CURSOR)
            }
        }
    }

    fn save_cursor(&self, cursor: i32) -> Result<(), StoreError> {
        self.kv.set(&self.cursor_key, &cursor.to_string())
    }
}
