//! Adapter manifest — ADAPTER.toml inside an installed plugin bundle.
//!
//! The manifest declares the institution identity and the HTTP endpoints
//! the generic adapter calls. A bundle that omits a required endpoint is
//! rejected at load time, not at fetch time.

use serde::{Deserialize, Serialize};

use gradewatch_core::error::{GradewatchError, Result};

pub const MANIFEST_FILE: &str = "ADAPTER.toml";

/// Adapter manifest — loaded from ADAPTER.toml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterManifest {
    /// Institution code this bundle serves.
    pub school_code: String,
    /// Human-readable institution name.
    pub school_name: String,
    /// Version token, same scheme as the index.
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub endpoints: Endpoints,
}

/// Fetch endpoints consumed by the generic HTTP adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default)]
    pub grades_url: Option<String>,
    #[serde(default)]
    pub schedule_url: Option<String>,
}

impl AdapterManifest {
    /// Parse an ADAPTER.toml manifest from string content.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| GradewatchError::Load(format!("Parse {MANIFEST_FILE}: {e}")))
    }

    /// Load manifest from an install directory.
    pub fn load(dir: &std::path::Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| GradewatchError::Load(format!("Read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Reject bundles missing a required capability.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.endpoints.grades_url.is_none() {
            missing.push("endpoints.grades_url");
        }
        if self.endpoints.schedule_url.is_none() {
            missing.push("endpoints.schedule_url");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(GradewatchError::Load(format!(
                "adapter '{}' missing required: {}",
                self.school_code,
                missing.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_manifest() {
        let toml_str = r#"
school_code = "10546"
school_name = "示例大学"
version = "20260101_120000"

[endpoints]
grades_url = "https://jw.example.edu.cn/api/grades"
schedule_url = "https://jw.example.edu.cn/api/schedule"
"#;
        let manifest = AdapterManifest::from_toml(toml_str).unwrap();
        assert_eq!(manifest.school_code, "10546");
        manifest.validate().unwrap();
    }

    #[test]
    fn test_missing_endpoint_rejected() {
        let toml_str = r#"
school_code = "10546"
school_name = "示例大学"

[endpoints]
grades_url = "https://jw.example.edu.cn/api/grades"
"#;
        let manifest = AdapterManifest::from_toml(toml_str).unwrap();
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("schedule_url"));
    }

    #[test]
    fn test_bad_toml_is_load_error() {
        assert!(AdapterManifest::from_toml("school_code = [").is_err());
    }
}
