/// Java runtime resolution: discovering, validating and ranking local
/// installations against a server's supported version range.
pub mod acquisition;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// JDK distribution the acquisition service may pull from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JdkDistribution {
    Temurin,
    Zulu,
}

impl std::fmt::Display for JdkDistribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JdkDistribution::Temurin => write!(f, "temurin"),
            JdkDistribution::Zulu => write!(f, "zulu"),
        }
    }
}

/// Supported major-version range, serialized as a constraint string such as
/// `">=17 <18"` or `"17"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub min: u32,
    /// Exclusive upper bound; `None` means open-ended.
    pub max_exclusive: Option<u32>,
}

impl VersionRange {
    pub fn at_least(min: u32) -> Self {
        Self {
            min,
            max_exclusive: None,
        }
    }

    pub fn exactly(major: u32) -> Self {
        Self {
            min: major,
            max_exclusive: Some(major + 1),
        }
    }

    pub fn contains(&self, major: u32) -> bool {
        major >= self.min && self.max_exclusive.map_or(true, |max| major < max)
    }

    /// Parse a constraint string: `"17"`, `">=17"`, `">=17 <19"`, `">=8 <=11"`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut min = None;
        let mut max_exclusive = None;
        for token in raw.split_whitespace() {
            if let Some(rest) = token.strip_prefix(">=") {
                min = Some(parse_major(rest)?);
            } else if let Some(rest) = token.strip_prefix("<=") {
                max_exclusive = Some(parse_major(rest)? + 1);
            } else if let Some(rest) = token.strip_prefix('<') {
                max_exclusive = Some(parse_major(rest)?);
            } else {
                let exact = parse_major(token)?;
                min = Some(exact);
                max_exclusive = Some(exact + 1);
            }
        }
        let min = min.with_context(|| format!("Version range has no lower bound: {raw:?}"))?;
        if let Some(max) = max_exclusive {
            if max <= min {
                anyhow::bail!("Empty version range: {raw:?}");
            }
        }
        Ok(Self { min, max_exclusive })
    }
}

fn parse_major(raw: &str) -> Result<u32> {
    // Tolerate "17.x" / "17.0.1" style constraints by taking the leading major.
    let major = raw.split('.').next().unwrap_or(raw);
    major
        .parse()
        .with_context(|| format!("Invalid major version: {raw:?}"))
}

impl std::fmt::Display for VersionRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.max_exclusive {
            Some(max) if max == self.min + 1 => write!(f, "{}", self.min),
            Some(max) => write!(f, ">={} <{}", self.min, max),
            None => write!(f, ">={}", self.min),
        }
    }
}

impl Serialize for VersionRange {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        VersionRange::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Immutable Java requirements for a server. Supplied by the distribution
/// index; read-only to the launch pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaOptions {
    pub supported: VersionRange,
    pub suggested_major: u32,
    pub distribution: JdkDistribution,
}

/// A usable local Java installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JvmDetails {
    /// Absolute path to the java executable.
    pub path: PathBuf,
    pub major_version: u32,
}

/// Resolution surface consumed by the supervisor. `Ok(None)` is the normal
/// "nothing usable installed" signal that starts acquisition, not an error.
pub trait JvmResolver: Send + Sync {
    /// Discover the best installation under `data_dir` and on the system.
    fn resolve<'a>(
        &'a self,
        data_dir: &'a Path,
        supported: &'a VersionRange,
    ) -> BoxFuture<'a, Result<Option<JvmDetails>>>;

    /// Validate a specific executable against the supported range.
    fn validate<'a>(
        &'a self,
        exec: &'a Path,
        supported: &'a VersionRange,
    ) -> BoxFuture<'a, Result<Option<JvmDetails>>>;
}

/// Resolver that scans the managed runtime directory, well-known system
/// locations and the PATH, ranks candidates by major version and keeps the
/// highest supported one.
pub struct DiscoveringResolver;

impl JvmResolver for DiscoveringResolver {
    fn resolve<'a>(
        &'a self,
        data_dir: &'a Path,
        supported: &'a VersionRange,
    ) -> BoxFuture<'a, Result<Option<JvmDetails>>> {
        Box::pin(async move {
            let mut best: Option<JvmDetails> = None;
            for candidate in collect_candidates(data_dir) {
                match verify_java(&candidate) {
                    Ok(details) if supported.contains(details.major_version) => {
                        let better = best
                            .as_ref()
                            .map_or(true, |b| details.major_version > b.major_version);
                        if better {
                            best = Some(details);
                        }
                    }
                    Ok(details) => {
                        log::debug!(
                            "Skipping Java {} at {:?} (supported: {})",
                            details.major_version,
                            details.path,
                            supported
                        );
                    }
                    Err(e) => {
                        log::debug!("Unusable Java candidate {:?}: {}", candidate, e);
                    }
                }
            }
            if let Some(details) = &best {
                log::info!(
                    "Resolved Java {} at {:?}",
                    details.major_version,
                    details.path
                );
            }
            Ok(best)
        })
    }

    fn validate<'a>(
        &'a self,
        exec: &'a Path,
        supported: &'a VersionRange,
    ) -> BoxFuture<'a, Result<Option<JvmDetails>>> {
        Box::pin(async move {
            if !exec.exists() {
                return Ok(None);
            }
            match verify_java(exec) {
                Ok(details) if supported.contains(details.major_version) => Ok(Some(details)),
                Ok(details) => {
                    log::info!(
                        "Configured Java {} at {:?} outside supported range {}",
                        details.major_version,
                        exec,
                        supported
                    );
                    Ok(None)
                }
                Err(e) => {
                    log::warn!("Configured Java at {:?} failed validation: {}", exec, e);
                    Ok(None)
                }
            }
        })
    }
}

/// Gather candidate executables: managed runtimes first, then system roots,
/// then whatever is on the PATH.
fn collect_candidates(data_dir: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut push = |path: PathBuf| {
        if seen.insert(path.clone()) {
            candidates.push(path);
        }
    };

    let runtime_dir = data_dir.join("runtime");
    for root in installation_roots(&runtime_dir) {
        if let Some(exec) = find_java_executable(&root) {
            push(exec);
        }
    }

    if let Ok(path_java) = which::which("java") {
        push(path_java);
    }

    candidates
}

/// Directories that may each contain one Java installation.
fn installation_roots(runtime_dir: &Path) -> Vec<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(entries) = std::fs::read_dir(runtime_dir) {
        for entry in entries.flatten() {
            if entry.path().is_dir() {
                roots.push(entry.path());
            }
        }
    }

    let mut system_roots: Vec<PathBuf> = Vec::new();
    #[cfg(windows)]
    {
        system_roots.push(PathBuf::from("C:\\Program Files\\Java"));
        system_roots.push(PathBuf::from("C:\\Program Files\\Eclipse Adoptium"));
        system_roots.push(PathBuf::from("C:\\Program Files (x86)\\Java"));
    }
    #[cfg(target_os = "macos")]
    {
        system_roots.push(PathBuf::from("/Library/Java/JavaVirtualMachines"));
    }
    #[cfg(target_os = "linux")]
    {
        system_roots.push(PathBuf::from("/usr/lib/jvm"));
        system_roots.push(PathBuf::from("/usr/java"));
    }

    for root in system_roots {
        if let Ok(entries) = std::fs::read_dir(&root) {
            for entry in entries.flatten() {
                if entry.path().is_dir() {
                    roots.push(entry.path());
                }
            }
        }
    }

    roots
}

/// Find the java executable inside an installation directory. Handles the
/// flat `bin/`, nested single-subdirectory and macOS `Contents/Home` layouts.
pub fn find_java_executable(dir: &Path) -> Option<PathBuf> {
    let executable_name = if cfg!(windows) { "java.exe" } else { "java" };

    let direct = dir.join("bin").join(executable_name);
    if direct.exists() {
        return Some(direct);
    }

    let macos = dir.join("Contents/Home/bin").join(executable_name);
    if macos.exists() {
        return Some(macos);
    }

    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            if entry.path().is_dir() {
                let nested = entry.path().join("bin").join(executable_name);
                if nested.exists() {
                    return Some(nested);
                }
                let nested_macos = entry.path().join("Contents/Home/bin").join(executable_name);
                if nested_macos.exists() {
                    return Some(nested_macos);
                }
            }
        }
    }

    None
}

/// Run `java -version` and parse the result.
///
/// The version banner goes to stderr, unusually.
pub fn verify_java(exec: &Path) -> Result<JvmDetails> {
    if !exec.exists() {
        anyhow::bail!("Java executable not found: {:?}", exec);
    }

    let output = std::process::Command::new(exec)
        .arg("-version")
        .output()
        .with_context(|| format!("Failed to run {:?} -version", exec))?;

    let banner = String::from_utf8_lossy(&output.stderr);
    let major_version = parse_major_version(&banner)
        .with_context(|| format!("Could not parse Java version from: {}", banner.trim()))?;

    Ok(JvmDetails {
        path: exec.to_path_buf(),
        major_version,
    })
}

static VERSION_BANNER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"version\s+"?(\d+)(\.(\d+))?"#).unwrap());

/// Parse the major version out of a `java -version` banner. Handles both the
/// legacy `1.8.0_311` scheme and the modern `17.0.1` / `21-ea` schemes.
fn parse_major_version(banner: &str) -> Option<u32> {
    let caps = VERSION_BANNER.captures(banner)?;
    let major = caps.get(1)?.as_str().parse::<u32>().ok()?;
    if major == 1 {
        return caps.get(3)?.as_str().parse::<u32>().ok();
    }
    Some(major)
}
