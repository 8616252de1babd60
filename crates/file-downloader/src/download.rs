use anyhow::{bail, Context};
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{info, warn};

/// Fetches model resources from `base_url` into `resources_dir`,
/// keeping the relative layout of the uri.
///
/// Without a base url only resources already on disk can be served.
pub struct FileDownload {
    base_url: Option<String>,
    resources_dir: PathBuf,
}

impl FileDownload {
    pub fn new(resources_dir: impl Into<PathBuf>, base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url.map(|v| v.trim_end_matches('/').to_string()),
            resources_dir: resources_dir.into(),
        }
    }

    pub fn local_path(&self, uri: impl AsRef<Path>) -> PathBuf {
        self.resources_dir.join(uri)
    }

    /// Whether `uri` is on disk or can be fetched.
    pub fn can_provide(&self, uri: impl AsRef<Path>) -> bool {
        self.base_url.is_some() || self.local_path(uri).is_file()
    }

    pub fn download_url(&self, uri: impl AsRef<Path>) -> anyhow::Result<String> {
        let Some(base_url) = self.base_url.as_ref() else {
            bail!(
                "{:?} is missing and no download url is configured",
                uri.as_ref()
            );
        };
        let segments: Vec<_> = uri
            .as_ref()
            .components()
            .map(|v| v.as_os_str().to_string_lossy())
            .collect();
        Ok(format!("{}/{}", base_url, segments.join("/")))
    }

    /// Local path of `uri`, downloading it first when it is not on disk yet.
    pub async fn ensure(&self, uri: impl AsRef<Path>) -> anyhow::Result<PathBuf> {
        let target = self.local_path(&uri);
        if fs::try_exists(&target).await.unwrap_or(false) {
            return Ok(target);
        }

        let url = self.download_url(&uri)?;
        info!("downloading {} to {:?}", url, target);

        // partial downloads never sit at the final path
        let partial = target.with_extension("part");
        match fetch_into(&url, &target, &partial).await {
            Ok(bytes) => {
                info!("downloaded {:?} ({} bytes)", target, bytes);
                Ok(target)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&partial).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!("failed to remove {:?}: {}", partial, cleanup);
                    }
                }
                Err(e)
            }
        }
    }

    /// Ensures each uri in order, stopping at the first failure.
    pub async fn ensure_all<P: AsRef<Path>>(&self, uris: &[P]) -> anyhow::Result<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(uris.len());
        for uri in uris {
            paths.push(self.ensure(uri).await?);
        }
        Ok(paths)
    }
}

async fn fetch_into(url: &str, target: &Path, partial: &Path) -> anyhow::Result<u64> {
    let mut response = reqwest::get(url)
        .await
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("failed to download {}", url))?;

    if let Some(dir) = target.parent() {
        fs::create_dir_all(dir).await?;
    }

    let mut written = 0u64;
    let mut out = fs::File::create(partial).await?;
    while let Some(chunk) = response.chunk().await? {
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    out.flush().await?;
    drop(out);

    fs::rename(partial, target)
        .await
        .with_context(|| format!("failed to move download into {:?}", target))?;

    Ok(written)
}
