//! Filesystem watcher.
//!
//! Watches the served directory recursively, filters events by extension,
//! debounces them, and triggers one broadcast per quiet period.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::event::{CreateKind, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::debouncer::{ChangeDebouncer, ChangeKind};
use super::notifier::Notifier;

/// How often the debouncer is checked for settled changes.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Raw events buffered between the notify thread and the runtime.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Watches a directory and notifies reload clients of changes.
pub(crate) struct ChangeWatcher {
    root: PathBuf,
    extensions: Vec<String>,
    notifier: Arc<Notifier>,
    window: Duration,
    watcher: Option<RecommendedWatcher>,
    tasks: Vec<JoinHandle<()>>,
}

impl ChangeWatcher {
    /// Create a watcher for `root`.
    ///
    /// # Arguments
    ///
    /// * `root` - Directory to watch recursively
    /// * `extensions` - Extensions (without dot) that trigger a reload
    /// * `notifier` - Client registry to broadcast to
    /// * `window` - Debounce window
    pub(crate) fn new(
        root: PathBuf,
        extensions: Vec<String>,
        notifier: Arc<Notifier>,
        window: Duration,
    ) -> Self {
        Self {
            root,
            extensions,
            notifier,
            window,
            watcher: None,
            tasks: Vec::new(),
        }
    }

    /// Start watching.
    ///
    /// Spawns one task that records raw events into the debouncer and one
    /// that broadcasts once changes have settled. Must be called from within
    /// a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher cannot be created or the directory
    /// cannot be watched.
    pub(crate) fn start(&mut self) -> Result<(), notify::Error> {
        let (tx, mut rx) = mpsc::channel::<notify::Result<Event>>(EVENT_CHANNEL_CAPACITY);

        // The callback runs on the watcher backend's own thread.
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.blocking_send(res);
        })?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        self.watcher = Some(watcher);

        let debouncer = Arc::new(ChangeDebouncer::new(self.window));

        let recorder = Arc::clone(&debouncer);
        let extensions = self.extensions.clone();
        self.tasks.push(tokio::spawn(async move {
            while let Some(result) = rx.recv().await {
                match result {
                    Ok(event) => Self::record_event(&event, &extensions, &recorder, Instant::now()),
                    Err(e) => tracing::warn!(error = %e, "File watcher error"),
                }
            }
        }));

        let notifier = Arc::clone(&self.notifier);
        let root = self.root.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            loop {
                interval.tick().await;
                Self::flush(&debouncer, &notifier, &root, Instant::now());
            }
        }));

        tracing::info!(directory = %self.root.display(), "Watching for changes");
        Ok(())
    }

    /// Stop watching and cancel background tasks. Safe to call repeatedly.
    pub(crate) fn stop(&mut self) {
        if self.watcher.take().is_some() {
            tracing::debug!(directory = %self.root.display(), "Stopped watching");
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    /// Record a raw notify event into the debouncer.
    fn record_event(event: &Event, extensions: &[String], debouncer: &ChangeDebouncer, now: Instant) {
        let kind = match event.kind {
            EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => return,
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Modify(_) => ChangeKind::Modified,
            EventKind::Remove(_) => ChangeKind::Removed,
            _ => return,
        };

        for path in &event.paths {
            if !Self::is_watched(path, extensions) {
                continue;
            }
            tracing::debug!(path = %path.display(), ?kind, "Recorded filesystem event");
            debouncer.record(path.clone(), kind, now);
        }
    }

    /// Broadcast once if any change has settled. Returns clients notified.
    fn flush(
        debouncer: &ChangeDebouncer,
        notifier: &Notifier,
        root: &Path,
        now: Instant,
    ) -> Option<usize> {
        let changes = debouncer.drain_ready(now);
        if changes.is_empty() {
            return None;
        }

        for change in &changes {
            let path = change.path.strip_prefix(root).unwrap_or(&change.path);
            tracing::info!(path = %path.display(), kind = ?change.kind, "File changed");
        }

        Some(notifier.broadcast_reload())
    }

    /// Check if a path has one of the watched extensions.
    fn is_watched(path: &Path, extensions: &[String]) -> bool {
        path.extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| extensions.iter().any(|watched| watched.eq_ignore_ascii_case(ext)))
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, ModifyKind};

    use crate::live_reload::notifier::ClientMessage;

    fn extensions() -> Vec<String> {
        ["html", "css", "js", "json"]
            .iter()
            .map(|e| (*e).to_owned())
            .collect()
    }

    fn modify(path: &str) -> Event {
        Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from(path))
    }

    #[test]
    fn test_is_watched() {
        let extensions = extensions();

        assert!(ChangeWatcher::is_watched(Path::new("/site/index.html"), &extensions));
        assert!(ChangeWatcher::is_watched(Path::new("/site/css/app.CSS"), &extensions));
        assert!(ChangeWatcher::is_watched(Path::new("/site/data.json"), &extensions));
        assert!(!ChangeWatcher::is_watched(Path::new("/site/notes.txt"), &extensions));
        assert!(!ChangeWatcher::is_watched(Path::new("/site/.index.html.swp"), &extensions));
        assert!(!ChangeWatcher::is_watched(Path::new("/site/index.html~"), &extensions));
        assert!(!ChangeWatcher::is_watched(Path::new("/site/Makefile"), &extensions));
    }

    #[test]
    fn test_record_event_filters_extensions() {
        let debouncer = ChangeDebouncer::new(Duration::from_millis(100));
        let now = Instant::now();

        ChangeWatcher::record_event(&modify("/site/notes.txt"), &extensions(), &debouncer, now);
        assert_eq!(debouncer.pending_len(), 0);

        ChangeWatcher::record_event(&modify("/site/style.css"), &extensions(), &debouncer, now);
        assert_eq!(debouncer.pending_len(), 1);
    }

    #[test]
    fn test_record_event_ignores_access_and_folders() {
        let debouncer = ChangeDebouncer::new(Duration::from_millis(100));
        let now = Instant::now();

        let access = Event::new(EventKind::Access(notify::event::AccessKind::Read))
            .add_path(PathBuf::from("/site/index.html"));
        let folder = Event::new(EventKind::Create(CreateKind::Folder))
            .add_path(PathBuf::from("/site/theme.css"));

        ChangeWatcher::record_event(&access, &extensions(), &debouncer, now);
        ChangeWatcher::record_event(&folder, &extensions(), &debouncer, now);
        assert_eq!(debouncer.pending_len(), 0);
    }

    #[test]
    fn test_burst_triggers_single_broadcast() {
        let window = Duration::from_millis(100);
        let debouncer = ChangeDebouncer::new(window);
        let notifier = Notifier::new();
        let (_, mut rx) = notifier.connect();
        let root = Path::new("/site");
        let start = Instant::now();

        for i in 0..20 {
            let at = start + Duration::from_millis(i * 5);
            ChangeWatcher::record_event(&modify("/site/index.html"), &extensions(), &debouncer, at);
        }
        ChangeWatcher::record_event(&modify("/site/style.css"), &extensions(), &debouncer, start);

        let settled = start + Duration::from_millis(95) + window;
        assert_eq!(ChangeWatcher::flush(&debouncer, &notifier, root, settled), Some(1));
        assert_eq!(ChangeWatcher::flush(&debouncer, &notifier, root, settled), None);

        assert_eq!(rx.try_recv().unwrap(), ClientMessage::Reload);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_save_all_across_files_triggers_single_broadcast() {
        let debouncer = ChangeDebouncer::new(Duration::from_millis(200));
        let notifier = Notifier::new();
        let (_, mut rx) = notifier.connect();
        let root = Path::new("/site");
        let start = Instant::now();

        let mut broadcasts = 0;
        for step in 0..=20 {
            let at = start + Duration::from_millis(step * 50);
            match step {
                0 => ChangeWatcher::record_event(&modify("/site/a.css"), &extensions(), &debouncer, at),
                2 => ChangeWatcher::record_event(&modify("/site/b.js"), &extensions(), &debouncer, at),
                4 => ChangeWatcher::record_event(&modify("/site/c.html"), &extensions(), &debouncer, at),
                _ => {}
            }
            if ChangeWatcher::flush(&debouncer, &notifier, root, at).is_some() {
                broadcasts += 1;
            }
        }

        assert_eq!(broadcasts, 1);
        assert_eq!(rx.try_recv().unwrap(), ClientMessage::Reload);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_flush_before_window_does_nothing() {
        let debouncer = ChangeDebouncer::new(Duration::from_millis(100));
        let notifier = Notifier::new();
        let (_, mut rx) = notifier.connect();
        let start = Instant::now();

        ChangeWatcher::record_event(&modify("/site/app.js"), &extensions(), &debouncer, start);

        assert_eq!(
            ChangeWatcher::flush(&debouncer, &notifier, Path::new("/site"), start),
            None
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_file_change_notifies_connected_client() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        std::fs::write(root.join("style.css"), "a {}").unwrap();

        let notifier = Arc::new(Notifier::new());
        let (_, mut rx) = notifier.connect();
        let mut watcher = ChangeWatcher::new(
            root.clone(),
            extensions(),
            Arc::clone(&notifier),
            Duration::from_millis(100),
        );
        watcher.start().unwrap();

        // Ignored extension: nothing arrives.
        std::fs::write(root.join("notes.txt"), "todo").unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(rx.try_recv().is_err());

        std::fs::write(root.join("style.css"), "a { color: red; }").unwrap();
        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no reload within timeout");
        assert_eq!(message, Some(ClientMessage::Reload));

        // One save, one reload.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(rx.try_recv().is_err());

        watcher.stop();
        watcher.stop();
    }
}
