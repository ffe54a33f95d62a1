pub mod process;
pub mod supervisor;
pub mod types;
pub mod watcher;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use supervisor::{ProcessSupervisor, MIN_LINGER};
pub use types::{LaunchSession, LaunchState, ProcessDescription};
pub use watcher::{LogLine, LogWatcher, StreamKind, WatcherId, WatcherSet};
