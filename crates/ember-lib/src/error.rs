/// Launch failure taxonomy surfaced to the UI layer
use std::path::PathBuf;

/// Phase of a repair pass that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairPhase {
    Verify,
    Download,
}

impl std::fmt::Display for RepairPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepairPhase::Verify => write!(f, "verification"),
            RepairPhase::Download => write!(f, "download"),
        }
    }
}

/// Errors that terminate a launch attempt.
///
/// Every variant except [`LaunchError::LaunchBusy`] is converted into exactly
/// one user-visible failure notification by the supervisor before the session
/// returns to idle.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("another launch session is already active")]
    LaunchBusy,

    #[error("Java runtime resolution failed: {0}")]
    Resolution(anyhow::Error),

    #[error("no downloadable Java {major} release for distribution '{distribution}'")]
    Acquisition { major: u32, distribution: String },

    #[error("downloaded runtime archive failed validation: {path}")]
    CorruptedDownload { path: PathBuf },

    #[error("file {phase} failed: {cause}")]
    Repair {
        phase: RepairPhase,
        cause: anyhow::Error,
    },

    #[error("could not start the game process: {0}")]
    Spawn(std::io::Error),

    #[error("fatal signature in game output: {signature}")]
    RuntimeFatal { signature: String },

    #[error("game process exited with code {code}")]
    NonZeroExit { code: i32 },
}

impl LaunchError {
    /// Short dialog title for the failure overlay.
    pub fn title(&self) -> &'static str {
        match self {
            LaunchError::LaunchBusy => "Launch In Progress",
            LaunchError::Resolution(_) => "Error During Launch",
            LaunchError::Acquisition { .. } => "No Compatible Java Release",
            LaunchError::CorruptedDownload { .. } => "Java Download Corrupted",
            LaunchError::Repair {
                phase: RepairPhase::Verify,
                ..
            } => "Error During File Verification",
            LaunchError::Repair {
                phase: RepairPhase::Download,
                ..
            } => "Error During File Download",
            LaunchError::Spawn(_) => "Error During Launch",
            LaunchError::RuntimeFatal { .. } => "Error During Launch",
            LaunchError::NonZeroExit { .. } => "Game Exited Unexpectedly",
        }
    }

    /// Longer dialog body for the failure overlay.
    pub fn description(&self) -> String {
        match self {
            LaunchError::LaunchBusy => {
                "A game session is already being launched. Wait for it to finish.".to_string()
            }
            LaunchError::Resolution(err) => {
                format!("The Java runtime could not be resolved: {err}")
            }
            LaunchError::Acquisition {
                major,
                distribution,
            } => format!(
                "No Java {major} release is available from the '{distribution}' distribution. \
                 Install Java {major} manually and try again."
            ),
            LaunchError::CorruptedDownload { path } => format!(
                "The downloaded runtime at {} did not match its published checksum. \
                 The attempt was aborted.",
                path.display()
            ),
            LaunchError::Repair { phase, cause } => {
                format!("File {phase} did not complete: {cause}. See the log for details.")
            }
            LaunchError::Spawn(err) => {
                format!("The operating system refused to start the game process: {err}")
            }
            LaunchError::RuntimeFatal { signature } => format!(
                "The game reported a fatal error while starting ({signature}). \
                 Try repairing the installation."
            ),
            LaunchError::NonZeroExit { code } => {
                format!("The game process exited with code {code}. See the log for details.")
            }
        }
    }

    /// Whether this error produces a failure dialog. Precondition rejections
    /// are returned to the caller without touching the UI.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, LaunchError::LaunchBusy)
    }
}
