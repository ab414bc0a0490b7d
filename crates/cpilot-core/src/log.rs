//! Captured subprocess output: log entries and the bounded store

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};

use crate::project::ProjectId;

/// Default cap on stored log entries
pub const DEFAULT_MAX_LOG_LINES: usize = 100_000;

static LOG_ENTRY_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_log_entry_id() -> u64 {
    LOG_ENTRY_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// One captured line of subprocess output (or a synthesized status notice).
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Stable identity within this run
    pub id: u64,

    /// When the line was captured
    pub timestamp: DateTime<Local>,

    /// Owning project
    pub project_id: ProjectId,

    /// The line text, without its trailing newline
    pub message: String,

    /// True when the line came from stderr (or is an error notice)
    pub is_error: bool,
}

impl LogEntry {
    pub fn new(project_id: ProjectId, message: impl Into<String>, is_error: bool) -> Self {
        Self {
            id: next_log_entry_id(),
            timestamp: Local::now(),
            project_id,
            message: message.into(),
            is_error,
        }
    }

    /// Timestamp formatted for display, e.g. `14:03:07.251`.
    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format("%H:%M:%S%.3f").to_string()
    }
}

/// Ordered, size-bounded sequence of log entries across all projects.
///
/// Eviction is strictly oldest-first in arrival order, regardless of which
/// project an entry belongs to. The cap is mutable at runtime and takes
/// effect on the next append, not retroactively.
#[derive(Debug)]
pub struct LogStore {
    entries: VecDeque<LogEntry>,
    max_entries: usize,
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOG_LINES)
    }
}

impl LogStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries,
        }
    }

    /// Append an entry, evicting the oldest entries once over the cap.
    pub fn append(&mut self, entry: LogEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    /// Remove entries owned by `project_id`, or everything when `None`.
    /// Relative order of the remaining entries is preserved.
    pub fn clear(&mut self, project_id: Option<ProjectId>) {
        match project_id {
            Some(id) => self.entries.retain(|e| e.project_id != id),
            None => self.entries.clear(),
        }
    }

    /// Change the cap. Applies on the next append.
    pub fn set_max_entries(&mut self, max_entries: usize) {
        self.max_entries = max_entries;
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Iterate only the entries owned by one project, oldest to newest.
    pub fn iter_project(&self, project_id: ProjectId) -> impl Iterator<Item = &LogEntry> + '_ {
        self.entries.iter().filter(move |e| e.project_id == project_id)
    }

    /// The most recently appended entry.
    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.back()
    }
}
