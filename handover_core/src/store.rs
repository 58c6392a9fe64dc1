//! Local key-value persistence with file locking.
//!
//! Each key is stored as `<key>.json` in the data directory. Reads take a
//! shared lock; writes go through a locked temp file that is fsynced and
//! renamed over the original, so a crash never leaves a half-written value.

use crate::event_log::EventLog;
use crate::{CprEvent, CprSession, Error, Result, TimelineEntry};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// Store key for completed CPR sessions
pub const CPR_LOG_KEY: &str = "cprLog";
/// Store key for type-specific CPR events
pub const CPR_EVENTS_KEY: &str = "cprEvents";
/// Store key for the merged CPR timeline
pub const CPR_TIMELINE_KEY: &str = "cprTimeline";
/// Store key for patient records
pub const PATIENTS_KEY: &str = "patients";

/// String-keyed persistence collaborator
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// Directory-backed store, one JSON document per key
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(&path)?;
        // Acquire shared lock for reading
        file.lock_shared()?;

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(&file);
        let read = reader.read_to_string(&mut contents);
        file.unlock()?;
        read?;

        tracing::debug!("Read key {} from {:?}", key, path);
        Ok(Some(contents))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);

        // Temp file in the same directory so the rename stays atomic
        let temp = NamedTempFile::new_in(&self.dir)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            writer.write_all(value.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(&path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Wrote key {} to {:?}", key, path);
        Ok(())
    }
}

/// In-memory store for tests and dry runs
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Load a JSON value, falling back to the default when the key is missing,
/// unreadable, or corrupt.
pub fn load_json<T, S>(store: &S, key: &str) -> T
where
    T: DeserializeOwned + Default,
    S: KeyValueStore + ?Sized,
{
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            tracing::info!("No stored value for {}, using empty default", key);
            return T::default();
        }
        Err(e) => {
            tracing::warn!("Unable to read {}: {}. Using defaults.", key, e);
            return T::default();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Failed to parse {}: {}. Using defaults.", key, e);
            T::default()
        }
    }
}

/// Serialize and store a JSON value
pub fn save_json<T, S>(store: &mut S, key: &str, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
    S: KeyValueStore + ?Sized,
{
    // Compact JSON; these documents are rewritten on every action
    let contents = serde_json::to_string(value)?;
    store.set(key, &contents)
}

/// The three CPR record lists, held together because they are always
/// loaded and persisted as a unit.
#[derive(Clone, Debug, PartialEq)]
pub struct CprRecords {
    pub sessions: EventLog<CprSession>,
    pub events: EventLog<CprEvent>,
    pub timeline: EventLog<TimelineEntry>,
}

impl CprRecords {
    /// Empty records; `cap` bounds the event and timeline logs
    pub fn new(cap: usize) -> Self {
        Self {
            sessions: EventLog::unbounded(),
            events: EventLog::capped(cap),
            timeline: EventLog::capped(cap),
        }
    }

    /// Load all three lists; missing or corrupt keys become empty lists
    pub fn load<S: KeyValueStore + ?Sized>(store: &S, cap: usize) -> Self {
        let sessions: Vec<CprSession> = load_json(store, CPR_LOG_KEY);
        let events: Vec<CprEvent> = load_json(store, CPR_EVENTS_KEY);
        let timeline: Vec<TimelineEntry> = load_json(store, CPR_TIMELINE_KEY);

        tracing::debug!(
            "Loaded {} sessions, {} events, {} timeline entries",
            sessions.len(),
            events.len(),
            timeline.len()
        );

        Self {
            sessions: EventLog::from_entries(sessions, None),
            events: EventLog::from_entries(events, Some(cap)),
            timeline: EventLog::from_entries(timeline, Some(cap)),
        }
    }

    /// Rewrite all three lists
    pub fn save<S: KeyValueStore + ?Sized>(&self, store: &mut S) -> Result<()> {
        save_json(store, CPR_LOG_KEY, &self.sessions)?;
        save_json(store, CPR_EVENTS_KEY, &self.events)?;
        save_json(store, CPR_TIMELINE_KEY, &self.timeline)?;
        Ok(())
    }
}
