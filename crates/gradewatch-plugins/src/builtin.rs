//! Compiled-in adapters.
//!
//! Institutions supported out of the box ship their manifest inside the
//! binary and load through the same manifest-driven HTTP adapter as
//! installed bundles. Builtins take precedence over an installed bundle
//! for the same code.

use std::sync::Arc;

use gradewatch_core::traits::SchoolAdapter;

use crate::adapter::HttpAdapter;
use crate::manifest::AdapterManifest;

const BUILTIN_MANIFESTS: &[&str] = &[include_str!("../builtins/csust.toml")];

/// All adapters compiled into the binary. A manifest that fails to
/// validate is a packaging defect; it is logged and skipped.
pub fn builtin_adapters() -> Vec<Arc<dyn SchoolAdapter>> {
    let mut adapters: Vec<Arc<dyn SchoolAdapter>> = Vec::new();
    for raw in BUILTIN_MANIFESTS {
        match AdapterManifest::from_toml(raw).and_then(HttpAdapter::new) {
            Ok(adapter) => adapters.push(Arc::new(adapter)),
            Err(e) => tracing::error!("❌ Bundled adapter manifest rejected: {e}"),
        }
    }
    adapters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_manifests_all_load() {
        let adapters = builtin_adapters();
        assert_eq!(adapters.len(), BUILTIN_MANIFESTS.len());
        assert!(adapters.iter().any(|a| a.school_code() == "10536"));
    }
}
