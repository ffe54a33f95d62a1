/// Rich-presence integration driven by game log output.
use serde::{Deserialize, Serialize};

/// Distribution-level presence configuration (application identity).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceConfig {
    pub client_id: String,
    #[serde(default)]
    pub small_image_text: Option<String>,
    #[serde(default)]
    pub small_image_id: Option<String>,
}

/// Server-level presence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPresence {
    pub short_id: String,
    #[serde(default)]
    pub large_image_text: Option<String>,
    #[serde(default)]
    pub large_image_id: Option<String>,
}

/// Semantic in-game states forwarded to the presence service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    Loading,
    Joining,
    Joined,
}

impl PresenceState {
    pub fn label(&self) -> &'static str {
        match self {
            PresenceState::Loading => "Loading the game..",
            PresenceState::Joining => "Loading the world..",
            PresenceState::Joined => "Exploring the server",
        }
    }
}

/// Presence service surface. Started once per game process when both the
/// distribution and the selected server declare a presence configuration,
/// stopped when the process exits.
pub trait PresenceNotifier: Send + Sync {
    fn start(&self, distro: &PresenceConfig, server: &ServerPresence);
    fn update_state(&self, state: PresenceState);
    fn stop(&self);
}

/// Presence implementation that only logs. Used when no presence service is
/// wired up and in tests.
pub struct NoopPresence;

impl PresenceNotifier for NoopPresence {
    fn start(&self, distro: &PresenceConfig, server: &ServerPresence) {
        log::debug!(
            "presence start requested (client {}, server {})",
            distro.client_id,
            server.short_id
        );
    }

    fn update_state(&self, state: PresenceState) {
        log::debug!("presence state: {}", state.label());
    }

    fn stop(&self) {
        log::debug!("presence stopped");
    }
}
