//! Launch orchestration core for the Ember game launcher.
//!
//! The [`launch::ProcessSupervisor`] drives the whole pipeline: resolve a
//! Java runtime (acquiring one when none is installed), repair game files
//! against the server manifest, spawn the game process and supervise its
//! output until exit. UI layers plug in through the narrow sink traits in
//! [`progress`] and [`presence`].

pub mod config;
pub mod distribution;
pub mod error;
pub mod java;
pub mod launch;
pub mod presence;
pub mod progress;
pub mod repair;

// Re-export the surface a frontend typically needs
pub use config::{AuthUser, LauncherSettings};
pub use distribution::{Distribution, ServerEntry};
pub use error::LaunchError;
pub use launch::{LaunchState, ProcessSupervisor};
