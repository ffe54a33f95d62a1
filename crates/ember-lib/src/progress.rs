/// Progress and failure sinks for the launch pipeline.
/// Implementations forward updates to the UI layer; the supervisor only ever
/// writes to these and never blocks on them.
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Narrow progress surface driven by the supervisor.
pub trait ProgressSink: Send + Sync {
    /// Set the textual detail line (e.g. "Downloading files..").
    fn set_detail(&self, text: &str);

    /// Set the visible progress percentage (0-100).
    fn set_percent(&self, percent: u8);

    /// Show or hide the busy/loading area.
    fn set_busy(&self, busy: bool);

    /// OS-level progress indicator: 0.0..=1.0, or -1.0 to clear it.
    fn set_os_progress(&self, fraction: f64);
}

/// Failure overlay surface. Exactly one call per failed launch attempt.
pub trait FailureSink: Send + Sync {
    fn show_failure(&self, title: &str, description: &str);
}

/// A progress sink that does nothing. Useful for background work and tests.
pub struct SilentProgressSink;

impl ProgressSink for SilentProgressSink {
    fn set_detail(&self, _text: &str) {}
    fn set_percent(&self, _percent: u8) {}
    fn set_busy(&self, _busy: bool) {}
    fn set_os_progress(&self, _fraction: f64) {}
}

/// A failure sink that only logs.
pub struct SilentFailureSink;

impl FailureSink for SilentFailureSink {
    fn show_failure(&self, title: &str, description: &str) {
        log::error!("launch failure: {}: {}", title, description);
    }
}

/// Animates trailing dots on the detail line while a long operation runs
/// without granular progress (runtime extraction does not report percent).
pub struct DetailTicker {
    handle: JoinHandle<()>,
}

impl DetailTicker {
    const CADENCE: Duration = Duration::from_millis(750);

    pub fn start(sink: Arc<dyn ProgressSink>, base: &str) -> Self {
        let base = base.to_string();
        sink.set_detail(&base);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Self::CADENCE);
            // The first tick of an interval completes immediately.
            interval.tick().await;
            let mut dots = 0usize;
            loop {
                interval.tick().await;
                dots = if dots >= 3 { 0 } else { dots + 1 };
                sink.set_detail(&format!("{}{}", base, ".".repeat(dots)));
            }
        });
        Self { handle }
    }

    pub fn stop(self) {
        // Drop aborts the task.
    }
}

impl Drop for DetailTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
