/// Distribution index: the remote descriptor of servers, their required
/// files and launch metadata.
use crate::java::JavaOptions;
use crate::presence::{PresenceConfig, ServerPresence};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Top-level distribution index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub version: String,
    /// Application-level presence identity. Presence is only activated when
    /// both this and the server's presence block are present.
    #[serde(default)]
    pub presence: Option<PresenceConfig>,
    pub servers: Vec<ServerEntry>,
}

/// One launchable server in the distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEntry {
    pub id: String,
    pub name: String,
    /// Host the client connects to, `host:port`.
    pub address: String,
    pub client_version: String,
    #[serde(default)]
    pub main_server: bool,
    pub java_options: JavaOptions,
    #[serde(default)]
    pub presence: Option<ServerPresence>,
    pub loader: LoaderMetadata,
    pub version: VersionMetadata,
    #[serde(default)]
    pub manifest: FileManifest,
    #[serde(default)]
    pub patterns: WatcherPatterns,
}

/// Loader metadata consumed by the process builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderMetadata {
    pub id: String,
    pub main_class: String,
    #[serde(default)]
    pub jvm_args: Vec<String>,
}

/// Client version metadata consumed by the process builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMetadata {
    pub id: String,
    #[serde(default)]
    pub game_args: Vec<String>,
}

/// Hash algorithm named by a manifest entry or release descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgo {
    Sha1,
    Sha256,
}

/// Server-specific manifest of required files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileManifest {
    #[serde(default)]
    pub files: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Path relative to the common directory.
    pub path: String,
    pub size: u64,
    pub algo: HashAlgo,
    pub hash: String,
    pub url: String,
}

impl ManifestEntry {
    /// Resolve the download URL, joining relative entries onto `base`.
    pub fn resolve_url(&self, base: &Url) -> Result<Url> {
        match Url::parse(&self.url) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => base
                .join(&self.url)
                .with_context(|| format!("Invalid relative manifest URL: {}", self.url)),
            Err(e) => Err(e).with_context(|| format!("Invalid manifest URL: {}", self.url)),
        }
    }
}

static DEFAULT_READY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[.+\]: Engine started").unwrap());
static DEFAULT_WORLD_LOADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[.+\]: Sound engine started").unwrap());

const DEFAULT_FATAL_SIGNATURE: &str = "Could not find or load main class";

/// Log-line patterns for the output watchers. Servers may override any of
/// them; unset fields fall back to the stock client patterns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherPatterns {
    #[serde(default)]
    pub ready: Option<String>,
    #[serde(default)]
    pub world_loading: Option<String>,
    #[serde(default)]
    pub fatal_signature: Option<String>,
}

impl WatcherPatterns {
    /// Pattern signalling that the engine finished starting.
    pub fn ready_pattern(&self) -> Regex {
        compile_or_default(self.ready.as_deref(), &DEFAULT_READY)
    }

    /// Pattern signalling that the world is loading.
    pub fn world_loading_pattern(&self) -> Regex {
        compile_or_default(self.world_loading.as_deref(), &DEFAULT_WORLD_LOADING)
    }

    /// Substring of a known-fatal stderr line.
    pub fn fatal_signature(&self) -> &str {
        self.fatal_signature
            .as_deref()
            .unwrap_or(DEFAULT_FATAL_SIGNATURE)
    }

    /// Pattern signalling that the given player joined the server.
    pub fn joined_pattern(&self, display_name: &str) -> Regex {
        let pattern = format!(
            r"\[.+\]: \[CHAT\] {} joined the game",
            regex::escape(display_name)
        );
        // Escaped literal inside a known-good template always compiles.
        Regex::new(&pattern).unwrap()
    }
}

fn compile_or_default(custom: Option<&str>, default: &Regex) -> Regex {
    match custom {
        Some(raw) => match Regex::new(raw) {
            Ok(re) => re,
            Err(e) => {
                log::warn!("Invalid configured watcher pattern {:?}: {}", raw, e);
                default.clone()
            }
        },
        None => default.clone(),
    }
}

impl Distribution {
    pub fn server_by_id(&self, id: &str) -> Option<&ServerEntry> {
        self.servers.iter().find(|s| s.id == id)
    }

    /// The server flagged as main, or the first one listed.
    pub fn main_server(&self) -> Option<&ServerEntry> {
        self.servers
            .iter()
            .find(|s| s.main_server)
            .or_else(|| self.servers.first())
    }

    /// Fetch the remote index and cache it to disk. When the fetch fails the
    /// cached copy is used instead, so a flaky connection does not block
    /// launches of already-downloaded servers.
    pub async fn refresh_or_fallback(
        client: &reqwest::Client,
        url: &str,
        cache: &Path,
    ) -> Result<Distribution> {
        match Self::fetch(client, url).await {
            Ok(distro) => {
                if let Err(e) = distro.write_cache(cache) {
                    log::warn!("Failed to cache distribution index: {}", e);
                }
                Ok(distro)
            }
            Err(fetch_err) => {
                log::warn!(
                    "Failed to refresh distribution index ({}), trying cache",
                    fetch_err
                );
                Self::load_cached(cache).context("No usable distribution index")
            }
        }
    }

    async fn fetch(client: &reqwest::Client, url: &str) -> Result<Distribution> {
        log::debug!("Fetching distribution index: {}", url);
        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("HTTP error {}: {}", response.status(), url);
        }
        Ok(response.json().await?)
    }

    pub fn load_cached(cache: &Path) -> Result<Distribution> {
        let contents = std::fs::read_to_string(cache)
            .with_context(|| format!("Failed to read cached index: {}", cache.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Malformed cached index: {}", cache.display()))
    }

    fn write_cache(&self, cache: &Path) -> Result<()> {
        if let Some(parent) = cache.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(cache, serde_json::to_string(self)?)?;
        Ok(())
    }
}
