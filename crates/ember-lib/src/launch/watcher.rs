/// Log watchers: a compiled pattern plus a callback, attached to one of the
/// game process output streams.
///
/// Lines are dispatched in arrival order. Attach and detach are explicit and
/// idempotent so higher layers can re-wire watchers without bookkeeping.
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Which output stream a watcher observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// A single line of process output.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub stream: StreamKind,
    pub text: String,
}

pub type WatcherCallback = Arc<dyn Fn(&LogLine) + Send + Sync + 'static>;

/// Handle for detaching a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

pub struct LogWatcher {
    pub stream: StreamKind,
    pub pattern: Regex,
    pub callback: WatcherCallback,
}

impl LogWatcher {
    pub fn new(stream: StreamKind, pattern: Regex, callback: WatcherCallback) -> Self {
        Self {
            stream,
            pattern,
            callback,
        }
    }
}

/// The set of watchers attached to one game process.
#[derive(Default)]
pub struct WatcherSet {
    next_id: AtomicU64,
    watchers: Mutex<Vec<(WatcherId, LogWatcher)>>,
}

impl WatcherSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, watcher: LogWatcher) -> WatcherId {
        let id = WatcherId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.watchers.lock().unwrap().push((id, watcher));
        id
    }

    /// Detach a watcher. Returns false if it was already gone.
    pub fn detach(&self, id: WatcherId) -> bool {
        let mut watchers = self.watchers.lock().unwrap();
        let before = watchers.len();
        watchers.retain(|(wid, _)| *wid != id);
        watchers.len() != before
    }

    /// Dispatch one line to every matching watcher, in attach order.
    ///
    /// Callbacks run outside the table lock so they may attach or detach
    /// watchers themselves.
    pub fn dispatch(&self, line: &LogLine) {
        let trimmed = line.text.trim();
        let matching: Vec<WatcherCallback> = {
            let watchers = self.watchers.lock().unwrap();
            watchers
                .iter()
                .filter(|(_, w)| w.stream == line.stream && w.pattern.is_match(trimmed))
                .map(|(_, w)| w.callback.clone())
                .collect()
        };
        for callback in matching {
            callback(line);
        }
    }
}
