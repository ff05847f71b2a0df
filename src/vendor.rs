//! Local pass-through cache for third party browser bundles.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);
const USER_AGENT: &str = concat!("booking-intake/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum VendorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned status {0}")]
    Status(u16),

    #[error("Response rejected: {0}")]
    Invalid(String),

    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VendorAsset {
    /// File name served under `/vendor/` and used in the cache directory.
    pub name: String,
    /// Tried in order until one yields a usable body.
    pub candidates: Vec<String>,
    pub min_bytes: usize,
}

impl VendorAsset {
    pub fn new(name: &str, candidates: &[&str], min_bytes: usize) -> Self {
        Self {
            name: name.into(),
            candidates: candidates.iter().map(|url| url.to_string()).collect(),
            min_bytes,
        }
    }
}

pub fn default_assets() -> Vec<VendorAsset> {
    vec![
        VendorAsset::new(
            "retell-client-js-sdk.js",
            &[
                "https://cdn.jsdelivr.net/npm/retell-client-js-sdk@latest/dist/index.umd.js",
                "https://unpkg.com/retell-client-js-sdk@latest/dist/index.umd.js",
            ],
            2_000,
        ),
        VendorAsset::new(
            "livekit-client.umd.js",
            &[
                "https://cdn.jsdelivr.net/npm/livekit-client@latest/dist/livekit-client.umd.js",
                "https://unpkg.com/livekit-client@latest/dist/livekit-client.umd.js",
            ],
            20_000,
        ),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSource {
    Cache,
    Upstream,
    Stale,
    Stub,
}

impl AssetSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetSource::Cache => "cache",
            AssetSource::Upstream => "upstream",
            AssetSource::Stale => "stale",
            AssetSource::Stub => "stub",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServedAsset {
    pub source: AssetSource,
    pub body: Vec<u8>,
}

#[derive(Clone)]
pub struct VendorAssets {
    client: reqwest::Client,
    cache_dir: PathBuf,
    assets: Arc<Vec<VendorAsset>>,
}

impl VendorAssets {
    pub fn new(cache_dir: PathBuf, assets: Vec<VendorAsset>) -> Result<Self, VendorError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            cache_dir,
            assets: Arc::new(assets),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn assets(&self) -> &[VendorAsset] {
        &self.assets
    }

    pub fn find(&self, name: &str) -> Option<&VendorAsset> {
        self.assets.iter().find(|asset| asset.name == name)
    }

    pub fn cache_path(&self, asset: &VendorAsset) -> PathBuf {
        self.cache_dir.join(&asset.name)
    }

    /// Fresh cache, then each candidate, then any stale copy, then a stub
    /// that only logs to the browser console. Never fails.
    pub async fn serve(&self, asset: &VendorAsset, bypass_cache: bool) -> ServedAsset {
        let cache_path = self.cache_path(asset);
        let cached = fs::read(&cache_path).await.ok();

        if !bypass_cache {
            if let Some(body) = &cached {
                if validate(body, asset.min_bytes).is_ok() {
                    debug!(asset = %asset.name, "Serving vendor asset from cache");
                    return ServedAsset {
                        source: AssetSource::Cache,
                        body: body.clone(),
                    };
                }
            }
        }

        for url in &asset.candidates {
            match self.fetch(url, asset.min_bytes).await {
                Ok(body) => {
                    if let Err(err) = self.store(&cache_path, &body).await {
                        warn!(asset = %asset.name, %err, "Failed to cache vendor asset");
                    }
                    info!(asset = %asset.name, %url, bytes = body.len(), "Fetched vendor asset");
                    return ServedAsset {
                        source: AssetSource::Upstream,
                        body,
                    };
                }
                Err(err) => warn!(asset = %asset.name, %url, %err, "Vendor candidate failed"),
            }
        }

        match cached {
            Some(body) if !body.is_empty() => {
                warn!(asset = %asset.name, "All vendor candidates failed, serving stale copy");
                ServedAsset {
                    source: AssetSource::Stale,
                    body,
                }
            }
            _ => {
                warn!(asset = %asset.name, "All vendor candidates failed, serving stub");
                ServedAsset {
                    source: AssetSource::Stub,
                    body: stub_script(&asset.name).into_bytes(),
                }
            }
        }
    }

    async fn fetch(&self, url: &str, min_bytes: usize) -> Result<Vec<u8>, VendorError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(VendorError::Status(status.as_u16()));
        }
        let body = response.bytes().await?.to_vec();
        validate(&body, min_bytes).map_err(VendorError::Invalid)?;
        Ok(body)
    }

    async fn store(&self, path: &Path, body: &[u8]) -> Result<(), VendorError> {
        fs::create_dir_all(&self.cache_dir).await?;
        // Unique per write so concurrent fetches of one asset never share a file.
        let partial = path.with_extension(format!("{}.partial", Uuid::new_v4()));
        if let Err(err) = fs::write(&partial, body).await {
            let _ = fs::remove_file(&partial).await;
            return Err(err.into());
        }
        fs::rename(&partial, path).await?;
        Ok(())
    }
}

/// Rejects bodies that are too small to be the bundle or that look like an
/// HTML error page.
pub fn validate(body: &[u8], min_bytes: usize) -> Result<(), String> {
    if body.len() < min_bytes {
        return Err(format!("{} bytes, expected at least {min_bytes}", body.len()));
    }
    match body.iter().find(|byte| !byte.is_ascii_whitespace()) {
        Some(b'<') => Err("body looks like HTML".into()),
        Some(_) => Ok(()),
        None => Err("body is blank".into()),
    }
}

pub fn stub_script(name: &str) -> String {
    format!(
        "console.error({:?});\n",
        format!("[vendor] {name} could not be loaded")
    )
}
