//! Compilation snapshot schema
//!
//! A snapshot is one batch of telemetry emitted by the host adapter for a single
//! build pass. Identity fields are optional on purpose: records missing them are
//! malformed and skipped by the ingestor instead of failing the whole parse.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Module sizes in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleSizeRecord {
    pub source_size: u64,
    pub transformed_size: u64,
    pub parsed_size: u64,
}

/// Reference from one module to another
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DependencyRecord {
    /// Request string as written in the importing module
    pub request: Option<String>,
    /// Resolved path of the target. Unresolved requests produce no edge.
    pub path: Option<String>,
    pub query: Option<String>,
    pub layer: Option<String>,
}

/// Time spent by one loader on one module
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoaderTimingRecord {
    pub loader: Option<String>,
    pub start_ms: u64,
    pub end_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleRecord {
    /// Resolved path: the required identity key
    pub path: Option<String>,
    pub query: Option<String>,
    pub layer: Option<String>,
    pub size: ModuleSizeRecord,
    pub dependencies: Vec<DependencyRecord>,
    pub loaders: Vec<LoaderTimingRecord>,
    /// Ids of the chunks containing this module
    pub chunks: Vec<String>,
    pub source: Option<String>,
    pub is_entry: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChunkRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub initial: bool,
    pub entry: bool,
    pub parents: Vec<String>,
    pub children: Vec<String>,
}

/// An emitted file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetRecord {
    pub path: Option<String>,
    pub size: u64,
    pub chunks: Vec<String>,
    pub content: Option<String>,
}

/// One invocation of a plugin tap on a compiler hook
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginTimingRecord {
    pub hook: Option<String>,
    pub tap: Option<String>,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// One module resolution
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolverRecord {
    pub issuer: Option<String>,
    pub request: Option<String>,
    pub resolved: Option<String>,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// Telemetry of one build pass
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilationSnapshot {
    /// Name of the compiler instance that produced this snapshot
    pub compiler: Option<String>,
    pub modules: Vec<ModuleRecord>,
    pub chunks: Vec<ChunkRecord>,
    pub assets: Vec<AssetRecord>,
    pub plugins: Vec<PluginTimingRecord>,
    pub resolver: Vec<ResolverRecord>,
}

impl CompilationSnapshot {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse compilation snapshot")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("Invalid snapshot in {}", path.display()))
    }
}

pub(crate) const fn elapsed_ms(start_ms: u64, end_ms: u64) -> u64 {
    end_ms.saturating_sub(start_ms)
}
