//! Plugin registry — install, update, and resolve institution adapters.
//!
//! Installs are integrity-checked (sha256 against the index descriptor)
//! and land in a per-code directory; a failed install never leaves a
//! partial state behind. Concurrent installs of the same code serialize on
//! a per-code lock; different codes proceed independently.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock};

use gradewatch_core::config::PluginsConfig;
use gradewatch_core::error::{GradewatchError, Result};
use gradewatch_core::traits::SchoolAdapter;

use crate::adapter::HttpAdapter;
use crate::index::{AdapterDescriptor, IndexClient};
use crate::manifest::{AdapterManifest, MANIFEST_FILE};
use crate::version;

const VERSION_FILE: &str = "version.txt";

/// Discovers, verifies, installs, and loads per-institution adapters.
pub struct PluginRegistry {
    plugins_dir: PathBuf,
    index: IndexClient,
    builtins: HashMap<String, Arc<dyn SchoolAdapter>>,
    loaded: RwLock<HashMap<String, Arc<dyn SchoolAdapter>>>,
    install_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PluginRegistry {
    pub fn new(config: &PluginsConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.plugins_dir)?;
        Ok(Self {
            plugins_dir: config.plugins_dir.clone(),
            index: IndexClient::new(config)?,
            builtins: HashMap::new(),
            loaded: RwLock::new(HashMap::new()),
            install_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Register a compiled-in adapter. Builtins take precedence over
    /// installed bundles for the same code.
    pub fn register_builtin(&mut self, adapter: Arc<dyn SchoolAdapter>) {
        let code = adapter.school_code().to_string();
        tracing::info!("🏫 Registered builtin adapter: {code} ({})", adapter.school_name());
        self.builtins.insert(code, adapter);
    }

    /// Compiled-in adapters as (code, name), sorted by code.
    pub fn builtins(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .builtins
            .values()
            .map(|a| (a.school_code().to_string(), a.school_name().to_string()))
            .collect();
        out.sort();
        out
    }

    /// All adapters the index advertises; cache-backed, fails soft.
    pub async fn list_available(&self) -> Vec<AdapterDescriptor> {
        self.index
            .fetch_or_cached()
            .await
            .map(|i| i.plugins)
            .unwrap_or_default()
    }

    /// Re-fetch the index, discarding the local cache first.
    pub async fn refresh_index(&self) -> Result<usize> {
        Ok(self.index.force_refresh().await?.plugins.len())
    }

    /// Installed codes with their local version tokens.
    pub fn installed(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let Ok(entries) = std::fs::read_dir(&self.plugins_dir) else {
            return out;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if path.is_dir()
                && !name.starts_with("backup_")
                && path.join(MANIFEST_FILE).exists()
            {
                let version = self.local_version(&name).unwrap_or_else(|| "0.0.0".into());
                out.push((name, version));
            }
        }
        out.sort();
        out
    }

    /// Local version token for an installed code: version.txt first, the
    /// manifest's own version as fallback.
    pub fn local_version(&self, code: &str) -> Option<String> {
        let dir = self.install_dir(code);
        if let Ok(v) = std::fs::read_to_string(dir.join(VERSION_FILE)) {
            let v = v.trim().to_string();
            if !v.is_empty() {
                return Some(v);
            }
        }
        AdapterManifest::load(&dir)
            .ok()
            .filter(|m| !m.version.is_empty())
            .map(|m| m.version)
    }

    /// Download, verify, and install the adapter bundle for `code`.
    pub async fn install(&self, code: &str) -> Result<AdapterDescriptor> {
        let descriptor = self
            .index
            .fetch_or_cached()
            .await
            .and_then(|i| i.get(code).cloned())
            .ok_or_else(|| GradewatchError::NotFound(code.to_string()))?;
        if descriptor.download_url.is_empty() {
            return Err(GradewatchError::Plugin(format!(
                "plugin '{code}' has no download_url"
            )));
        }
        tracing::info!("⬇️ Downloading plugin {code} from {}", descriptor.download_url);
        let bytes = self.index.download(&descriptor.download_url).await?;
        self.install_artifact(&descriptor, &bytes).await?;
        Ok(descriptor)
    }

    /// Verify and install an already-downloaded artifact.
    pub async fn install_artifact(
        &self,
        descriptor: &AdapterDescriptor,
        bytes: &[u8],
    ) -> Result<()> {
        let code = descriptor.school_code.clone();
        let lock = self.install_lock(&code).await;
        let _guard = lock.lock().await;

        // Integrity gate: nothing touches the install dir before this.
        if descriptor.sha256.is_empty() {
            return Err(GradewatchError::Plugin(format!(
                "descriptor for '{code}' carries no sha256"
            )));
        }
        let actual = sha256_hex(bytes);
        if !actual.eq_ignore_ascii_case(&descriptor.sha256) {
            return Err(GradewatchError::Integrity {
                code,
                expected: descriptor.sha256.to_lowercase(),
                actual,
            });
        }

        let dir = self.install_dir(&code);
        let backup = self.backup_existing(&dir, &code)?;

        match self.extract_and_load(descriptor, bytes, &dir) {
            Ok(adapter) => {
                self.loaded.write().await.insert(code.clone(), adapter);
                if let Some(backup) = backup {
                    std::fs::remove_dir_all(&backup).ok();
                }
                tracing::info!(
                    "✅ Plugin {code} installed (version {})",
                    descriptor.plugin_version
                );
                Ok(())
            }
            Err(e) => {
                std::fs::remove_dir_all(&dir).ok();
                if let Some(backup) = backup {
                    if let Err(re) = std::fs::rename(&backup, &dir) {
                        tracing::error!("Failed to restore backup for {code}: {re}");
                    }
                }
                Err(e)
            }
        }
    }

    fn extract_and_load(
        &self,
        descriptor: &AdapterDescriptor,
        bytes: &[u8],
        dir: &std::path::Path,
    ) -> Result<Arc<dyn SchoolAdapter>> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| GradewatchError::Plugin(format!("open archive: {e}")))?;
        archive
            .extract(dir)
            .map_err(|e| GradewatchError::Plugin(format!("extract archive: {e}")))?;
        std::fs::write(dir.join(VERSION_FILE), &descriptor.plugin_version)?;

        let manifest = AdapterManifest::load(dir)?;
        if manifest.school_code != descriptor.school_code {
            return Err(GradewatchError::Load(format!(
                "bundle declares code '{}', expected '{}'",
                manifest.school_code, descriptor.school_code
            )));
        }
        Ok(Arc::new(HttpAdapter::new(manifest)?))
    }

    /// Install only when the remote version is strictly newer. Returns
    /// whether an update happened.
    pub async fn update_if_newer(&self, code: &str) -> Result<bool> {
        let Some(index) = self.index.fetch_or_cached().await else {
            return Ok(false);
        };
        let Some(descriptor) = index.get(code) else {
            return Ok(false);
        };
        let local = self.local_version(code).unwrap_or_else(|| "0.0.0".into());
        if version::is_newer(&descriptor.plugin_version, &local) {
            tracing::info!(
                "🔄 Plugin {code} update: {local} -> {}",
                descriptor.plugin_version
            );
            self.install(code).await?;
            Ok(true)
        } else {
            tracing::debug!("Plugin {code} is up to date ({local})");
            Ok(false)
        }
    }

    /// Resolve the adapter for an institution code.
    pub async fn resolve(&self, code: &str) -> Result<Arc<dyn SchoolAdapter>> {
        if let Some(builtin) = self.builtins.get(code) {
            return Ok(Arc::clone(builtin));
        }
        if let Some(adapter) = self.loaded.read().await.get(code) {
            return Ok(Arc::clone(adapter));
        }
        let dir = self.install_dir(code);
        if !dir.join(MANIFEST_FILE).exists() {
            return Err(GradewatchError::NotFound(code.to_string()));
        }
        let manifest = AdapterManifest::load(&dir)?;
        let adapter: Arc<dyn SchoolAdapter> = Arc::new(HttpAdapter::new(manifest)?);
        self.loaded
            .write()
            .await
            .insert(code.to_string(), Arc::clone(&adapter));
        Ok(adapter)
    }

    /// Remove an installed bundle and forget its adapter.
    pub async fn uninstall(&self, code: &str) -> Result<()> {
        let dir = self.install_dir(code);
        if !dir.exists() {
            return Err(GradewatchError::NotFound(code.to_string()));
        }
        std::fs::remove_dir_all(&dir)?;
        self.loaded.write().await.remove(code);
        tracing::info!("🗑️ Plugin {code} uninstalled");
        Ok(())
    }

    fn install_dir(&self, code: &str) -> PathBuf {
        self.plugins_dir.join(code)
    }

    fn backup_existing(
        &self,
        dir: &std::path::Path,
        code: &str,
    ) -> Result<Option<PathBuf>> {
        if !dir.exists() {
            return Ok(None);
        }
        let backup = self
            .plugins_dir
            .join(format!("backup_{code}_{}", chrono::Utc::now().timestamp()));
        std::fs::rename(dir, &backup)
            .map_err(|e| GradewatchError::Plugin(format!("backup existing install: {e}")))?;
        Ok(Some(backup))
    }

    async fn install_lock(&self, code: &str) -> Arc<Mutex<()>> {
        let mut locks = self.install_locks.lock().await;
        Arc::clone(
            locks
                .entry(code.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

/// Hex sha256 digest.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gradewatch_core::types::{GradeRecord, ScheduleEntry};
    use std::io::Write;
    use zip::write::FileOptions;

    const MANIFEST: &str = r#"
school_code = "10546"
school_name = "示例大学"
version = "20260101_120000"

[endpoints]
grades_url = "https://jw.example.edu.cn/api/grades"
schedule_url = "https://jw.example.edu.cn/api/schedule"
"#;

    fn bundle(manifest: &str) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let opts = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
            zip.start_file(MANIFEST_FILE, opts).unwrap();
            zip.write_all(manifest.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    fn registry(name: &str) -> (PluginRegistry, PathBuf) {
        let root = std::env::temp_dir().join(format!("gradewatch-test-registry-{name}"));
        std::fs::remove_dir_all(&root).ok();
        let config = PluginsConfig {
            plugins_dir: root.join("plugins"),
            data_dir: root.join("data"),
            ..Default::default()
        };
        (PluginRegistry::new(&config).unwrap(), root)
    }

    fn descriptor(bytes: &[u8]) -> AdapterDescriptor {
        AdapterDescriptor {
            school_code: "10546".into(),
            school_name: "示例大学".into(),
            plugin_version: "20260101_120000".into(),
            sha256: sha256_hex(bytes),
            download_url: "https://example.com/p.zip".into(),
            contributor: "tester".into(),
        }
    }

    #[tokio::test]
    async fn test_install_and_resolve() {
        let (reg, root) = registry("install");
        let bytes = bundle(MANIFEST);
        let desc = descriptor(&bytes);
        reg.install_artifact(&desc, &bytes).await.unwrap();

        let adapter = reg.resolve("10546").await.unwrap();
        assert_eq!(adapter.school_code(), "10546");
        assert_eq!(reg.local_version("10546").as_deref(), Some("20260101_120000"));
        assert_eq!(reg.installed(), vec![("10546".into(), "20260101_120000".into())]);
        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_corrupted_artifact_leaves_nothing() {
        let (reg, root) = registry("corrupt");
        let mut bytes = bundle(MANIFEST);
        let desc = descriptor(&bytes);
        // Flip one byte after the digest was computed
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let err = reg.install_artifact(&desc, &bytes).await.unwrap_err();
        assert!(matches!(err, GradewatchError::Integrity { .. }));
        assert!(!root.join("plugins").join("10546").exists());
        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_failed_reinstall_restores_previous() {
        let (reg, root) = registry("restore");
        let good = bundle(MANIFEST);
        reg.install_artifact(&descriptor(&good), &good).await.unwrap();

        // A bundle that hashes correctly but fails manifest validation
        let bad = bundle("school_code = \"10546\"\nschool_name = \"x\"\n");
        let mut desc = descriptor(&bad);
        desc.plugin_version = "20270101_000000".into();
        let err = reg.install_artifact(&desc, &bad).await.unwrap_err();
        assert!(matches!(err, GradewatchError::Load(_)));

        // Old install is back in place and still resolvable
        assert_eq!(reg.local_version("10546").as_deref(), Some("20260101_120000"));
        let adapter = reg.resolve("10546").await.unwrap();
        assert_eq!(adapter.school_name(), "示例大学");
        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_missing_sha256_rejected() {
        let (reg, root) = registry("nosha");
        let bytes = bundle(MANIFEST);
        let mut desc = descriptor(&bytes);
        desc.sha256 = String::new();
        assert!(reg.install_artifact(&desc, &bytes).await.is_err());
        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_resolve_unknown_is_not_found() {
        let (reg, root) = registry("unknown");
        let err = reg.resolve("99999").await.map(|_| ()).unwrap_err();
        assert!(matches!(err, GradewatchError::NotFound(_)));
        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_uninstall_removes_dir() {
        let (reg, root) = registry("uninstall");
        let bytes = bundle(MANIFEST);
        reg.install_artifact(&descriptor(&bytes), &bytes).await.unwrap();
        reg.uninstall("10546").await.unwrap();
        assert!(!root.join("plugins").join("10546").exists());
        assert!(matches!(
            reg.resolve("10546").await.map(|_| ()).unwrap_err(),
            GradewatchError::NotFound(_)
        ));
        std::fs::remove_dir_all(&root).ok();
    }

    struct BuiltinAdapter;

    #[async_trait]
    impl SchoolAdapter for BuiltinAdapter {
        fn school_code(&self) -> &str {
            "10546"
        }
        fn school_name(&self) -> &str {
            "内置大学"
        }
        async fn fetch_grades(
            &self,
            _username: &str,
            _password: &str,
            _force_update: bool,
        ) -> Result<Vec<GradeRecord>> {
            Ok(Vec::new())
        }
        async fn fetch_schedule(
            &self,
            _username: &str,
            _password: &str,
            _force_update: bool,
        ) -> Result<Vec<ScheduleEntry>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_builtin_takes_precedence_over_installed() {
        let (mut reg, root) = registry("precedence");
        let bytes = bundle(MANIFEST);
        reg.install_artifact(&descriptor(&bytes), &bytes).await.unwrap();
        reg.register_builtin(Arc::new(BuiltinAdapter));

        let adapter = reg.resolve("10546").await.unwrap();
        assert_eq!(adapter.school_name(), "内置大学");
        assert_eq!(reg.builtins(), vec![("10546".into(), "内置大学".into())]);
        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_concurrent_installs_same_code_serialize() {
        let (reg, root) = registry("concurrent");
        let reg = Arc::new(reg);
        let bytes = bundle(MANIFEST);
        let desc = descriptor(&bytes);

        let a = {
            let reg = Arc::clone(&reg);
            let (desc, bytes) = (desc.clone(), bytes.clone());
            tokio::spawn(async move { reg.install_artifact(&desc, &bytes).await })
        };
        let b = {
            let reg = Arc::clone(&reg);
            let (desc, bytes) = (desc.clone(), bytes.clone());
            tokio::spawn(async move { reg.install_artifact(&desc, &bytes).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();
        assert!(reg.resolve("10546").await.is_ok());
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
