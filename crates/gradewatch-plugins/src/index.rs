//! Plugin index — remote JSON manifest of available adapters with a local
//! cache fallback.
//!
//! Remote fetch is best-effort: the direct URL is tried first, then the
//! configured mirror prefix, and finally the on-disk cache. An unreachable
//! index never fails the caller.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use gradewatch_core::config::PluginsConfig;
use gradewatch_core::error::{GradewatchError, Result};

/// One adapter as advertised by the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterDescriptor {
    pub school_code: String,
    #[serde(default)]
    pub school_name: String,
    /// Timestamp-like opaque token, see `version` module.
    #[serde(default)]
    pub plugin_version: String,
    /// Hex sha256 of the downloadable artifact.
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub download_url: String,
    #[serde(default)]
    pub contributor: String,
}

/// The full index document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginIndex {
    #[serde(default)]
    pub plugins: Vec<AdapterDescriptor>,
}

impl PluginIndex {
    /// Parse either `{"plugins": [...]}` or a bare top-level array — both
    /// shapes exist in the wild.
    pub fn parse(json: &str) -> Result<Self> {
        if let Ok(index) = serde_json::from_str::<PluginIndex>(json) {
            return Ok(index);
        }
        let plugins: Vec<AdapterDescriptor> = serde_json::from_str(json)
            .map_err(|e| GradewatchError::Plugin(format!("Parse plugin index: {e}")))?;
        Ok(Self { plugins })
    }

    pub fn get(&self, school_code: &str) -> Option<&AdapterDescriptor> {
        self.plugins.iter().find(|p| p.school_code == school_code)
    }
}

/// Fetches and caches the plugin index.
pub struct IndexClient {
    index_url: String,
    mirror_prefix: String,
    cache_file: PathBuf,
    client: reqwest::Client,
}

impl IndexClient {
    pub fn new(config: &PluginsConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        Ok(Self {
            index_url: config.index_url.clone(),
            mirror_prefix: config.mirror_prefix.clone(),
            cache_file: config.data_dir.join("plugins_index.json"),
            client: reqwest::Client::builder()
                .user_agent("gradewatch")
                .build()
                .map_err(|e| GradewatchError::Plugin(format!("http client: {e}")))?,
        })
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_file
    }

    /// Load the cached index, if any.
    pub fn cached(&self) -> Option<PluginIndex> {
        let json = std::fs::read_to_string(&self.cache_file).ok()?;
        match PluginIndex::parse(&json) {
            Ok(index) => Some(index),
            Err(e) => {
                tracing::warn!("⚠️ Corrupt index cache: {e}");
                None
            }
        }
    }

    /// Fetch the remote index and refresh the cache.
    pub async fn refresh(&self) -> Result<PluginIndex> {
        let json = self.get_with_mirror(&self.index_url).await?;
        let index = PluginIndex::parse(&json)?;
        if let Err(e) = std::fs::write(&self.cache_file, &json) {
            tracing::warn!("⚠️ Failed to cache index: {e}");
        }
        tracing::info!("📦 Plugin index refreshed ({} plugins)", index.plugins.len());
        Ok(index)
    }

    /// Refresh, falling back to the cache when the remote is unreachable.
    pub async fn fetch_or_cached(&self) -> Option<PluginIndex> {
        match self.refresh().await {
            Ok(index) => Some(index),
            Err(e) => {
                tracing::warn!("⚠️ Index refresh failed, using cache: {e}");
                self.cached()
            }
        }
    }

    /// Force-refresh: drop the cache and re-fetch.
    pub async fn force_refresh(&self) -> Result<PluginIndex> {
        if self.cache_file.exists() {
            std::fs::remove_file(&self.cache_file)?;
        }
        self.refresh().await
    }

    /// Download arbitrary bytes (plugin artifacts) with mirror fallback.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        match self.get_bytes(url).await {
            Ok(bytes) => Ok(bytes),
            Err(direct_err) if !self.mirror_prefix.is_empty() => {
                let mirrored = format!("{}{url}", self.mirror_prefix);
                tracing::info!("Retrying download via mirror: {mirrored}");
                self.get_bytes(&mirrored).await.map_err(|mirror_err| {
                    GradewatchError::Plugin(format!(
                        "download failed (direct: {direct_err}; mirror: {mirror_err})"
                    ))
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn get_with_mirror(&self, url: &str) -> Result<String> {
        let bytes = self.download(url).await?;
        String::from_utf8(bytes)
            .map_err(|e| GradewatchError::Plugin(format!("index not utf-8: {e}")))
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .timeout(std::time::Duration::from_secs(20))
            .send()
            .await
            .map_err(|e| GradewatchError::Plugin(format!("GET {url}: {e}")))?;
        if !resp.status().is_success() {
            return Err(GradewatchError::Plugin(format!(
                "GET {url}: http status {}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| GradewatchError::Plugin(format!("GET {url}: body: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WRAPPED: &str = r#"{
        "plugins": [
            {"school_code": "10546", "school_name": "示例大学",
             "plugin_version": "20260101_120000",
             "sha256": "abc", "download_url": "https://example.com/p.zip",
             "contributor": "someone"}
        ]
    }"#;

    #[test]
    fn test_parse_wrapped_shape() {
        let index = PluginIndex::parse(WRAPPED).unwrap();
        assert_eq!(index.plugins.len(), 1);
        assert_eq!(index.get("10546").unwrap().school_name, "示例大学");
        assert!(index.get("99999").is_none());
    }

    #[test]
    fn test_parse_bare_array_shape() {
        let json = r#"[{"school_code": "10001"}]"#;
        let index = PluginIndex::parse(json).unwrap();
        assert_eq!(index.plugins[0].school_code, "10001");
    }

    #[test]
    fn test_parse_garbage_is_error() {
        assert!(PluginIndex::parse("not json").is_err());
    }

    #[test]
    fn test_cached_round_trip() {
        let dir = std::env::temp_dir().join("gradewatch-test-index");
        std::fs::create_dir_all(&dir).unwrap();
        let config = PluginsConfig {
            data_dir: dir.clone(),
            ..Default::default()
        };
        let client = IndexClient::new(&config).unwrap();
        assert!(client.cached().is_none());
        std::fs::write(client.cache_path(), WRAPPED).unwrap();
        let index = client.cached().unwrap();
        assert_eq!(index.plugins.len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }
}
