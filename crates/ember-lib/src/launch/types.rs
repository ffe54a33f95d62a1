/// Core types for launch orchestration.
use crate::config::AuthUser;
use crate::distribution::{LoaderMetadata, VersionMetadata};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio::time::Instant;
use uuid::Uuid;

/// Launch pipeline states.
///
/// The pipeline moves strictly forward; `Error` absorbs from any
/// non-terminal state and drains back to `Idle` once the failure has been
/// surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    Idle,
    ResolvingJava,
    AcquiringJava,
    Repairing,
    Launching,
    Running,
    Error,
}

impl LaunchState {
    /// Transition table for the launch pipeline.
    pub fn may_enter(self, next: LaunchState) -> bool {
        use LaunchState::*;
        match (self, next) {
            (Idle, ResolvingJava) => true,
            (ResolvingJava, AcquiringJava) => true,
            (ResolvingJava, Repairing) => true,
            // Acquisition loops back for the defensive re-check.
            (AcquiringJava, ResolvingJava) => true,
            (Repairing, Launching) => true,
            (Launching, Running) => true,
            // Process exit, before or after readiness.
            (Launching, Idle) => true,
            (Running, Idle) => true,
            (Error, Idle) => true,
            (from, Error) => from != Idle && from != Error,
            _ => false,
        }
    }
}

/// The single in-flight launch session. The supervisor owns exactly one of
/// these while a game process is alive; it is discarded on process exit or
/// unrecoverable failure.
#[derive(Debug)]
pub struct LaunchSession {
    pub id: Uuid,
    pub server_id: String,
    pub runtime_exec: PathBuf,
    pub pid: u32,
    /// Monotonic spawn time, used for the minimum-linger deadline.
    pub spawned_at: Instant,
    pub started_at: DateTime<Utc>,
    pub presence_enabled: bool,
}

/// Everything needed to spawn the game process.
#[derive(Debug, Clone)]
pub struct ProcessDescription {
    pub server_id: String,
    pub server_address: String,
    /// Absolute path to the resolved java executable.
    pub runtime: PathBuf,
    pub loader: LoaderMetadata,
    pub version: VersionMetadata,
    pub user: Option<AuthUser>,
    pub client_version: String,
    pub game_dir: PathBuf,
    pub common_dir: PathBuf,
}
