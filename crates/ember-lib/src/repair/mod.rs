/// Integrity repair: verify local files against the server manifest and
/// download whatever turns out missing or corrupt.
///
/// The verify pass remembers its invalid set so a following download pass
/// fetches exactly those entries. Partially downloaded files are left on
/// disk; the next verify pass re-discovers them.
use crate::distribution::{FileManifest, HashAlgo, ManifestEntry};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::StreamExt;
use sha1::Digest;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use url::Url;

/// Percentage progress callback (0-100).
pub type PercentProgress = Arc<dyn Fn(u8) + Send + Sync + 'static>;

/// Repair surface consumed by the supervisor. `verify` returns the number of
/// invalid files; zero means the download pass must be skipped entirely.
pub trait IntegrityRepair: Send + Sync {
    fn verify<'a>(&'a self, on_progress: PercentProgress) -> BoxFuture<'a, Result<usize>>;
    fn download<'a>(&'a self, on_progress: PercentProgress) -> BoxFuture<'a, Result<()>>;
}

/// Hands out a repair service bound to one server's manifest.
pub trait RepairProvider: Send + Sync {
    fn repair_for(&self, server: &crate::distribution::ServerEntry) -> Arc<dyn IntegrityRepair>;
}

/// Default provider: one [`FileRepair`] per server over the shared common
/// directory.
pub struct ManifestRepairProvider {
    client: reqwest::Client,
    common_dir: PathBuf,
    base_url: Url,
}

impl ManifestRepairProvider {
    pub fn new(client: reqwest::Client, common_dir: PathBuf, base_url: Url) -> Self {
        Self {
            client,
            common_dir,
            base_url,
        }
    }
}

impl RepairProvider for ManifestRepairProvider {
    fn repair_for(&self, server: &crate::distribution::ServerEntry) -> Arc<dyn IntegrityRepair> {
        Arc::new(FileRepair::new(
            self.client.clone(),
            self.common_dir.clone(),
            self.base_url.clone(),
            server.manifest.clone(),
        ))
    }
}

/// Manifest-driven repair over the common directory.
pub struct FileRepair {
    client: reqwest::Client,
    common_dir: PathBuf,
    base_url: Url,
    manifest: FileManifest,
    invalid: Mutex<Vec<ManifestEntry>>,
}

impl FileRepair {
    pub fn new(
        client: reqwest::Client,
        common_dir: PathBuf,
        base_url: Url,
        manifest: FileManifest,
    ) -> Self {
        Self {
            client,
            common_dir,
            base_url,
            manifest,
            invalid: Mutex::new(Vec::new()),
        }
    }

    async fn download_entry(&self, entry: &ManifestEntry) -> Result<()> {
        let url = entry.resolve_url(&self.base_url)?;
        let dest = self.common_dir.join(&entry.path);
        log::debug!("Repairing: {} -> {:?}", url, dest);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Stream into a sibling .part file, hash while streaming, then move
        // into place so a failed transfer never masquerades as a valid file.
        let tmp_name = format!(
            "{}.part",
            dest.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("download")
        );
        let tmp_path = dest.with_file_name(tmp_name);

        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("HTTP error {}: {}", response.status(), url);
        }

        let mut file = tokio::fs::File::create(&tmp_path).await?;
        let mut hasher = StreamingHasher::new(entry.algo);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let computed = hasher.finish();
        if !computed.eq_ignore_ascii_case(&entry.hash) {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            anyhow::bail!(
                "Hash mismatch for {}: expected {}, got {}",
                entry.path,
                entry.hash,
                computed
            );
        }

        tokio::fs::rename(&tmp_path, &dest).await?;
        Ok(())
    }
}

impl IntegrityRepair for FileRepair {
    fn verify<'a>(&'a self, on_progress: PercentProgress) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let total = self.manifest.files.len();
            log::info!("Verifying {} manifest entries", total);

            let mut invalid = Vec::new();
            for (index, entry) in self.manifest.files.iter().enumerate() {
                let full = self.common_dir.join(&entry.path);
                if !is_entry_valid(&full, entry).await? {
                    invalid.push(entry.clone());
                }
                on_progress(percent_of(index + 1, total));
            }
            if total == 0 {
                on_progress(100);
            }

            let count = invalid.len();
            log::info!("Verification found {} invalid files", count);
            *self.invalid.lock().unwrap() = invalid;
            Ok(count)
        })
    }

    fn download<'a>(&'a self, on_progress: PercentProgress) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let queue = self.invalid.lock().unwrap().clone();
            let total = queue.len();
            log::info!("Downloading {} invalid files", total);

            for (index, entry) in queue.iter().enumerate() {
                self.download_entry(entry)
                    .await
                    .with_context(|| format!("Failed to repair {}", entry.path))?;
                on_progress(percent_of(index + 1, total));
            }

            self.invalid.lock().unwrap().clear();
            Ok(())
        })
    }
}

/// A manifest entry is valid when the file exists, has the declared size and
/// matches the declared hash.
async fn is_entry_valid(full: &Path, entry: &ManifestEntry) -> Result<bool> {
    let metadata = match tokio::fs::metadata(full).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to stat {}", full.display()));
        }
    };
    if metadata.len() != entry.size {
        return Ok(false);
    }
    validate_local_file(full, entry.algo, &entry.hash).await
}

/// Check a local file against an expected hash. A missing file is simply
/// invalid, not an error.
pub async fn validate_local_file(path: &Path, algo: HashAlgo, expected: &str) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let computed = hash_file(path, algo).await?;
    Ok(computed.eq_ignore_ascii_case(expected))
}

/// Hash a file on disk with the named algorithm, hex-encoded.
pub async fn hash_file(path: &Path, algo: HashAlgo) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read file for hashing: {}", path.display()))?;
    Ok(hash_bytes(&bytes, algo))
}

pub fn hash_bytes(bytes: &[u8], algo: HashAlgo) -> String {
    let mut hasher = StreamingHasher::new(algo);
    hasher.update(bytes);
    hasher.finish()
}

/// Incremental hasher over either supported algorithm.
enum StreamingHasher {
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
}

impl StreamingHasher {
    fn new(algo: HashAlgo) -> Self {
        match algo {
            HashAlgo::Sha1 => StreamingHasher::Sha1(sha1::Sha1::new()),
            HashAlgo::Sha256 => StreamingHasher::Sha256(sha2::Sha256::new()),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            StreamingHasher::Sha1(h) => h.update(bytes),
            StreamingHasher::Sha256(h) => h.update(bytes),
        }
    }

    fn finish(self) -> String {
        match self {
            StreamingHasher::Sha1(h) => format!("{:x}", h.finalize()),
            StreamingHasher::Sha256(h) => format!("{:x}", h.finalize()),
        }
    }
}

fn percent_of(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done * 100) / total) as u8
}
