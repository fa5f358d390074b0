/// Bounded, persisted record of broadcast messages.
///
/// The log keeps the last [`HISTORY_CAP`] rendered lines, oldest first, and
/// rewrites its JSON file after every append. On disk the log is a plain
/// JSON array of strings, so a missing file is simply an empty history.
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Maximum number of entries the log retains.
pub const HISTORY_CAP: usize = 100;

/// One rendered history line: `[HH:MM:SS] body`. Immutable once stamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryEntry {
    line: String,
}

impl HistoryEntry {
    fn stamp(at: DateTime<Local>, body: &str) -> Self {
        Self {
            line: format!("[{}] {body}", at.format("%H:%M:%S")),
        }
    }

    /// The rendered line, as sent over the wire and stored on disk.
    pub fn line(&self) -> &str {
        &self.line
    }
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.line)
    }
}

/// Append-only bounded message log with JSON file persistence.
#[derive(Debug)]
pub struct HistoryLog {
    entries: VecDeque<HistoryEntry>,
    cap: usize,
    persist_path: Option<PathBuf>,
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryLog {
    /// Create a new empty in-memory log (no persistence).
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            cap: HISTORY_CAP,
            persist_path: None,
        }
    }

    /// Load from `path` or start empty. A missing file is an empty history;
    /// an unreadable or corrupt file is warned about and treated the same.
    pub fn load_or_create(path: &Path) -> Self {
        let mut log = Self {
            entries: VecDeque::new(),
            cap: HISTORY_CAP,
            persist_path: Some(path.to_owned()),
        };

        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(json) => match serde_json::from_str::<VecDeque<HistoryEntry>>(&json) {
                    Ok(entries) => {
                        log.entries = entries;
                        // An oversized file keeps only the newest entries.
                        while log.entries.len() > log.cap {
                            log.entries.pop_front();
                        }
                        info!(count = log.entries.len(), "loaded chat history");
                    }
                    Err(e) => warn!("failed to parse {}: {e}", path.display()),
                },
                Err(e) => warn!("failed to read {}: {e}", path.display()),
            }
        }

        log
    }

    /// Stamp `body` with the current wall-clock time, append it, evict the
    /// oldest entry past capacity, and persist before returning.
    pub fn append(&mut self, body: &str) -> HistoryEntry {
        self.append_at(Local::now(), body)
    }

    /// Clock-injected form of [`append`](Self::append).
    pub fn append_at(&mut self, at: DateTime<Local>, body: &str) -> HistoryEntry {
        let entry = HistoryEntry::stamp(at, body);
        self.entries.push_back(entry.clone());
        while self.entries.len() > self.cap {
            self.entries.pop_front();
        }
        self.persist();
        entry
    }

    /// The last `n` entries, oldest first. `n` larger than the log returns
    /// the whole log.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &HistoryEntry> {
        self.entries
            .iter()
            .skip(self.entries.len().saturating_sub(n))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Persist to disk (atomic write via tmp+rename). A failure degrades
    /// durability: it is logged, and the in-memory log is left untouched.
    pub fn persist(&self) {
        let Some(path) = &self.persist_path else {
            return;
        };
        match serde_json::to_string_pretty(&self.entries) {
            Ok(json) => {
                let tmp = path.with_extension("json.tmp");
                if let Err(e) = std::fs::write(&tmp, &json) {
                    warn!("failed to write {}: {e}", tmp.display());
                } else if let Err(e) = std::fs::rename(&tmp, path) {
                    warn!("failed to replace {}: {e}", path.display());
                }
            }
            Err(e) => warn!("failed to serialize chat history: {e}"),
        }
    }
}
