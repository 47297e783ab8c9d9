use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};

use crate::color::ColorRecord;

pub const DEFAULT_HISTORY_CAPACITY: usize = 20;
/// Key under which the list lives inside the history document.
pub const HISTORY_KEY: &str = "chroma_history";

/// Recent lookups, most recent first, at most one entry per `code`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorHistory {
    entries: Vec<ColorRecord>,
    capacity: usize,
}

impl Default for ColorHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ColorHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Rebuilds a history from stored entries, re-applying the dedup and
    /// capacity rules so a hand-edited file cannot break them.
    pub fn from_entries(entries: Vec<ColorRecord>, capacity: usize) -> Self {
        let mut history = Self::new(capacity);
        for entry in entries.into_iter().rev() {
            history.record(entry);
        }
        history
    }

    /// Moves `item` to the front, dropping any older entry with the same code
    /// and evicting from the back past capacity. Returns `false` for records
    /// without a code.
    pub fn record(&mut self, item: ColorRecord) -> bool {
        if !item.is_structurally_valid() {
            return false;
        }
        self.entries.retain(|existing| existing.code != item.code);
        self.entries.insert(0, item);
        self.entries.truncate(self.capacity);
        true
    }

    pub fn entries(&self) -> &[ColorRecord] {
        &self.entries
    }

    pub fn get(&self, code: &str) -> Option<&ColorRecord> {
        let wanted = code.trim();
        self.entries.iter().find(|entry| entry.code == wanted)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Where a [`ColorHistory`] is persisted between sessions.
pub trait HistoryStore {
    fn load(&self) -> anyhow::Result<Vec<ColorRecord>>;
    fn save(&self, entries: &[ColorRecord]) -> anyhow::Result<()>;
}

/// JSON document on disk with the list under [`HISTORY_KEY`].
///
/// Other top-level keys found in the file are kept on write.
#[derive(Debug, Clone)]
pub struct JsonFileHistoryStore {
    path: PathBuf,
}

impl JsonFileHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for JsonFileHistoryStore {
    /// A missing or unreadable document loads as an empty history.
    fn load(&self) -> anyhow::Result<Vec<ColorRecord>> {
        let Some(document) = read_json_object(&self.path) else {
            return Ok(Vec::new());
        };
        let entries = document
            .get(HISTORY_KEY)
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| ColorRecord::from_value(row).ok())
                    .collect()
            })
            .unwrap_or_default();
        Ok(entries)
    }

    fn save(&self, entries: &[ColorRecord]) -> anyhow::Result<()> {
        let mut document = read_json_object(&self.path).unwrap_or_default();
        document.insert(HISTORY_KEY.to_string(), serde_json::to_value(entries)?);
        write_json_object(&self.path, &document)
    }
}

/// In-process store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    entries: Mutex<Vec<ColorRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn load(&self) -> anyhow::Result<Vec<ColorRecord>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("history lock poisoned"))?;
        Ok(entries.clone())
    }

    fn save(&self, entries: &[ColorRecord]) -> anyhow::Result<()> {
        let mut stored = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("history lock poisoned"))?;
        *stored = entries.to_vec();
        Ok(())
    }
}

pub fn load_history(store: &dyn HistoryStore, capacity: usize) -> anyhow::Result<ColorHistory> {
    Ok(ColorHistory::from_entries(store.load()?, capacity))
}

fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )?;
    Ok(())
}
