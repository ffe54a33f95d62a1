/// Java runtime acquisition: release catalogue lookup, archive download with
/// byte progress, checksum validation and extraction into the managed
/// runtime directory.
use super::{find_java_executable, JdkDistribution};
use crate::distribution::HashAlgo;
use crate::repair::hash_file;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::StreamExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

pub const TEMURIN_API_URL: &str = "https://api.adoptium.net/v3/assets/latest";
pub const ZULU_API_URL: &str = "https://api.azul.com/metadata/v1/zulu/packages";

/// Byte-level transfer progress callback (cumulative transferred bytes).
pub type ByteProgress = Arc<dyn Fn(u64) + Send + Sync + 'static>;

/// Downloadable runtime release descriptor.
#[derive(Debug, Clone)]
pub struct ReleaseAsset {
    pub id: String,
    pub url: String,
    /// Local destination for the archive.
    pub path: PathBuf,
    pub size: u64,
    pub algo: HashAlgo,
    pub hash: String,
}

/// Acquisition surface consumed by the supervisor. `fetch_release` returning
/// `Ok(None)` means no matching release exists upstream.
pub trait JvmAcquisition: Send + Sync {
    fn fetch_release<'a>(
        &'a self,
        major: u32,
        data_dir: &'a Path,
        distribution: JdkDistribution,
    ) -> BoxFuture<'a, Result<Option<ReleaseAsset>>>;

    /// Download the archive to `asset.path`, reporting cumulative transferred
    /// bytes. Returns the total number of bytes received.
    fn download<'a>(
        &'a self,
        asset: &'a ReleaseAsset,
        on_progress: ByteProgress,
    ) -> BoxFuture<'a, Result<u64>>;

    /// Check the downloaded archive against the release checksum.
    fn validate_archive<'a>(&'a self, asset: &'a ReleaseAsset) -> BoxFuture<'a, Result<bool>>;

    /// Extract the archive and return the path of the java executable inside
    /// the new installation.
    fn extract<'a>(&'a self, archive: &'a Path) -> BoxFuture<'a, Result<PathBuf>>;
}

/// HTTP-backed acquisition against the public release catalogues.
pub struct HttpJvmAcquisition {
    client: reqwest::Client,
    temurin_api: String,
    zulu_api: String,
}

impl HttpJvmAcquisition {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            temurin_api: TEMURIN_API_URL.to_string(),
            zulu_api: ZULU_API_URL.to_string(),
        }
    }

    /// Override the catalogue endpoints (tests).
    pub fn with_endpoints(
        client: reqwest::Client,
        temurin_api: impl Into<String>,
        zulu_api: impl Into<String>,
    ) -> Self {
        Self {
            client,
            temurin_api: temurin_api.into(),
            zulu_api: zulu_api.into(),
        }
    }

    async fn fetch_temurin(&self, major: u32, data_dir: &Path) -> Result<Option<ReleaseAsset>> {
        let url = format!("{}/{}/hotspot", self.temurin_api, major);
        log::debug!("Querying Temurin catalogue: {}", url);

        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!("Temurin catalogue error: HTTP {}", response.status());
        }

        let releases: Vec<TemurinRelease> = response.json().await?;
        let wanted_os = current_os_param();
        let wanted_arch = current_arch_param();

        let found = releases.into_iter().find(|r| {
            r.binary.os == wanted_os
                && r.binary.architecture == wanted_arch
                && r.binary.image_type == "jdk"
        });

        Ok(found.map(|release| ReleaseAsset {
            path: archive_dir(data_dir).join(&release.binary.package.name),
            id: release.release_name,
            url: release.binary.package.link,
            size: release.binary.package.size,
            algo: HashAlgo::Sha256,
            hash: release.binary.package.checksum,
        }))
    }

    async fn fetch_zulu(&self, major: u32, data_dir: &Path) -> Result<Option<ReleaseAsset>> {
        let ext = archive_ext();
        let url = format!(
            "{}/?os={}&arch={}&java_version={}&ext={}&bundle_type=jdk&javafx_bundled=false&latest=true&release_status=ga&page=1&page_size=1",
            self.zulu_api,
            current_os_param(),
            current_arch_param(),
            major,
            ext
        );
        log::debug!("Querying Zulu catalogue: {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Zulu catalogue error: HTTP {}", response.status());
        }

        let packages: Vec<ZuluPackage> = response.json().await?;
        Ok(packages.into_iter().next().map(|package| ReleaseAsset {
            path: archive_dir(data_dir).join(&package.name),
            id: package.name,
            url: package.download_url,
            size: package.size,
            algo: HashAlgo::Sha256,
            hash: package.sha256_hash,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct TemurinRelease {
    release_name: String,
    binary: TemurinBinary,
}

#[derive(Debug, Deserialize)]
struct TemurinBinary {
    os: String,
    architecture: String,
    image_type: String,
    package: TemurinPackage,
}

#[derive(Debug, Deserialize)]
struct TemurinPackage {
    name: String,
    link: String,
    size: u64,
    checksum: String,
}

#[derive(Debug, Deserialize)]
struct ZuluPackage {
    name: String,
    download_url: String,
    size: u64,
    sha256_hash: String,
}

impl JvmAcquisition for HttpJvmAcquisition {
    fn fetch_release<'a>(
        &'a self,
        major: u32,
        data_dir: &'a Path,
        distribution: JdkDistribution,
    ) -> BoxFuture<'a, Result<Option<ReleaseAsset>>> {
        Box::pin(async move {
            match distribution {
                JdkDistribution::Temurin => self.fetch_temurin(major, data_dir).await,
                JdkDistribution::Zulu => self.fetch_zulu(major, data_dir).await,
            }
        })
    }

    fn download<'a>(
        &'a self,
        asset: &'a ReleaseAsset,
        on_progress: ByteProgress,
    ) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            log::info!("Downloading runtime {} from {}", asset.id, asset.url);

            if let Some(parent) = asset.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let response = self.client.get(&asset.url).send().await?;
            if !response.status().is_success() {
                anyhow::bail!("HTTP error {}: {}", response.status(), asset.url);
            }

            let mut file = tokio::fs::File::create(&asset.path)
                .await
                .with_context(|| format!("Failed to create {}", asset.path.display()))?;
            let mut transferred: u64 = 0;
            let mut stream = response.bytes_stream();

            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                transferred += chunk.len() as u64;
                on_progress(transferred);
            }
            file.flush().await?;
            file.sync_all().await?;

            log::info!("Runtime download complete: {} bytes", transferred);
            Ok(transferred)
        })
    }

    fn validate_archive<'a>(&'a self, asset: &'a ReleaseAsset) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let computed = hash_file(&asset.path, asset.algo).await?;
            let matches = computed.eq_ignore_ascii_case(&asset.hash);
            if !matches {
                log::error!(
                    "Checksum mismatch for {}: expected {}, got {}",
                    asset.path.display(),
                    asset.hash,
                    computed
                );
            }
            Ok(matches)
        })
    }

    fn extract<'a>(&'a self, archive: &'a Path) -> BoxFuture<'a, Result<PathBuf>> {
        Box::pin(async move {
            let install_dir = install_dir_for(archive)?;
            tokio::fs::create_dir_all(&install_dir).await?;
            log::info!("Extracting runtime to {:?}", install_dir);

            let bytes = tokio::fs::read(archive)
                .await
                .with_context(|| format!("Failed to read archive: {}", archive.display()))?;

            let name = archive.to_string_lossy();
            if name.ends_with(".zip") {
                extract_zip(&bytes, &install_dir)?;
            } else {
                extract_tar_gz(&bytes, &install_dir)?;
            }

            let exec = find_java_executable(&install_dir)
                .context("No java executable found after extraction")?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mut perms = std::fs::metadata(&exec)?.permissions();
                perms.set_mode(0o755);
                std::fs::set_permissions(&exec, perms)?;
            }

            // The archive has served its purpose.
            if let Err(e) = tokio::fs::remove_file(archive).await {
                log::warn!("Could not remove runtime archive {:?}: {}", archive, e);
            }

            log::info!("Runtime installed: {:?}", exec);
            Ok(exec)
        })
    }
}

fn archive_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("runtime")
}

/// Installation directory derived from the archive name, with the archive
/// extension stripped.
fn install_dir_for(archive: &Path) -> Result<PathBuf> {
    let file_name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .context("Archive path has no file name")?;
    let stem = file_name
        .trim_end_matches(".zip")
        .trim_end_matches(".tar.gz")
        .trim_end_matches(".tgz");
    if stem.is_empty() {
        anyhow::bail!("Cannot derive install directory from {:?}", archive);
    }
    Ok(archive.with_file_name(stem))
}

fn extract_zip(bytes: &[u8], dest: &Path) -> Result<()> {
    use std::io::Cursor;

    let cursor = Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor)?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let outpath = dest.join(file.name());

        if file.name().ends_with('/') {
            std::fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut outfile = std::fs::File::create(&outpath)?;
            std::io::copy(&mut file, &mut outfile)?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))?;
            }
        }
    }

    Ok(())
}

fn extract_tar_gz(bytes: &[u8], dest: &Path) -> Result<()> {
    use flate2::read::GzDecoder;
    use std::io::Cursor;
    use tar::Archive;

    let decoder = GzDecoder::new(Cursor::new(bytes));
    let mut archive = Archive::new(decoder);
    archive.unpack(dest)?;
    Ok(())
}

fn current_os_param() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "mac"
    } else {
        "linux"
    }
}

fn current_arch_param() -> &'static str {
    if cfg!(target_arch = "aarch64") {
        "aarch64"
    } else {
        "x64"
    }
}

fn archive_ext() -> &'static str {
    if cfg!(target_os = "windows") {
        "zip"
    } else {
        "tar.gz"
    }
}
