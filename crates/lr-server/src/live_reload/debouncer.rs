//! Change event debouncing.
//!
//! Editors often emit several events per save (truncate, write, chmod,
//! rename), and a "save all" or build step touches several files at once.
//! Every change joins one batch that is released once the whole directory
//! has been quiet for the debounce window.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Kind of filesystem change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ChangeKind {
    Created,
    Modified,
    Removed,
}

impl ChangeKind {
    /// Merge a later change into an earlier pending one for the same path.
    ///
    /// Returns `None` when the two cancel out (created, then removed).
    #[allow(clippy::match_same_arms)]
    fn merge(self, later: Self) -> Option<Self> {
        use ChangeKind::{Created, Modified, Removed};

        match (self, later) {
            (Created, Removed) => None,
            (Created, _) => Some(Created),
            (Modified, later) => Some(later),
            (Removed, Created) => Some(Modified),
            (Removed, _) => Some(Removed),
        }
    }
}

/// A coalesced change ready to be acted on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Upper bound on how long a batch may be held back, in windows.
const MAX_WAIT_WINDOWS: u32 = 10;

#[derive(Default)]
struct Batch {
    changes: HashMap<PathBuf, ChangeKind>,
    first_seen: Option<Instant>,
    last_seen: Option<Instant>,
}

impl Batch {
    fn clear(&mut self) {
        self.changes.clear();
        self.first_seen = None;
        self.last_seen = None;
    }
}

/// Thread-safe debouncer collecting changes into a single batch.
pub(crate) struct ChangeDebouncer {
    batch: Mutex<Batch>,
    window: Duration,
    max_wait: Duration,
}

impl ChangeDebouncer {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            batch: Mutex::new(Batch::default()),
            window,
            max_wait: window * MAX_WAIT_WINDOWS,
        }
    }

    /// Record a change observed at `now`, pushing back the batch deadline.
    pub(crate) fn record(&self, path: PathBuf, kind: ChangeKind, now: Instant) {
        use std::collections::hash_map::Entry;

        let mut batch = self.batch.lock().unwrap();

        match batch.changes.entry(path) {
            Entry::Vacant(entry) => {
                entry.insert(kind);
            }
            Entry::Occupied(mut entry) => match entry.get().merge(kind) {
                Some(merged) => {
                    *entry.get_mut() = merged;
                }
                None => {
                    entry.remove();
                }
            },
        }

        if batch.changes.is_empty() {
            batch.clear();
        } else {
            batch.first_seen.get_or_insert(now);
            batch.last_seen = Some(now);
        }
    }

    /// Remove and return the whole batch once it is ready at `now`.
    ///
    /// A batch is ready when no change arrived for a full window, or when it
    /// has been held for the maximum wait so that a file rewritten faster
    /// than the window still triggers a reload.
    pub(crate) fn drain_ready(&self, now: Instant) -> Vec<ChangeEvent> {
        let mut batch = self.batch.lock().unwrap();

        let (Some(first_seen), Some(last_seen)) = (batch.first_seen, batch.last_seen) else {
            return Vec::new();
        };
        if last_seen + self.window > now && first_seen + self.max_wait > now {
            return Vec::new();
        }

        let mut ready: Vec<_> = batch
            .changes
            .drain()
            .map(|(path, kind)| ChangeEvent { path, kind })
            .collect();
        batch.clear();

        ready.sort_by(|a, b| a.path.cmp(&b.path));
        ready
    }

    /// Number of paths in the pending batch.
    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.batch.lock().unwrap().changes.len()
    }
}
