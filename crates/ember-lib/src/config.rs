/// Launcher settings persisted between runs.
///
/// The supervisor reads the data directory, selected server/account and
/// per-server Java overrides from here, and writes back the resolved Java
/// executable after a successful acquisition.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const SETTINGS_FILE: &str = "settings.json";

/// Authenticated-user descriptor. Produced by the account system, consumed
/// as-is when building the game process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub display_name: String,
    pub uuid: String,
    pub access_token: String,
    #[serde(default)]
    pub user_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LauncherSettings {
    pub data_dir: PathBuf,
    pub selected_server: Option<String>,
    pub selected_account: Option<AuthUser>,
    /// Per-server Java executable overrides, keyed by server id.
    pub java_executables: HashMap<String, PathBuf>,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::new(),
            selected_server: None,
            selected_account: None,
            java_executables: HashMap::new(),
        }
    }
}

impl LauncherSettings {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Load settings from `<data_dir>/settings.json`. A missing file yields
    /// defaults rooted at `data_dir`.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let file = data_dir.join(SETTINGS_FILE);
        match std::fs::read_to_string(&file) {
            Ok(contents) => {
                let mut settings: LauncherSettings = serde_json::from_str(&contents)
                    .with_context(|| format!("Malformed settings file: {}", file.display()))?;
                settings.data_dir = data_dir.to_path_buf();
                Ok(settings)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No settings file at {:?}, using defaults", file);
                Ok(Self::new(data_dir))
            }
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read settings: {}", file.display()))
            }
        }
    }

    /// Persist settings to `<data_dir>/settings.json`.
    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir).with_context(|| {
            format!("Failed to create data directory: {}", self.data_dir.display())
        })?;
        let file = self.data_dir.join(SETTINGS_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(&file, contents)
            .with_context(|| format!("Failed to write settings: {}", file.display()))?;
        Ok(())
    }

    pub fn java_override(&self, server_id: &str) -> Option<&PathBuf> {
        self.java_executables.get(server_id)
    }

    pub fn set_java_override(&mut self, server_id: &str, exec: PathBuf) {
        self.java_executables.insert(server_id.to_string(), exec);
    }

    /// Managed runtime installations live here.
    pub fn runtime_dir(&self) -> PathBuf {
        self.data_dir.join("runtime")
    }

    /// Files shared between servers (assets, libraries).
    pub fn common_dir(&self) -> PathBuf {
        self.data_dir.join("common")
    }

    /// Per-server game directories.
    pub fn instance_dir(&self) -> PathBuf {
        self.data_dir.join("instances")
    }
}
