//! # Gradewatch Plugins
//!
//! Per-institution adapter management: a remote index with local cache,
//! integrity-checked zip installs into per-code directories, timestamp
//! version comparison, and adapter loading.
//!
//! Adapters are not runtime-imported code. Each installed plugin is a data
//! bundle whose `ADAPTER.toml` manifest drives a generic HTTP adapter;
//! compiled-in adapters register under their institution code and take
//! precedence. Codes never share mutable state.

pub mod adapter;
pub mod builtin;
pub mod index;
pub mod manifest;
pub mod registry;
pub mod version;

pub use builtin::builtin_adapters;
pub use index::{AdapterDescriptor, IndexClient, PluginIndex};
pub use manifest::AdapterManifest;
pub use registry::PluginRegistry;
pub use version::VersionToken;
