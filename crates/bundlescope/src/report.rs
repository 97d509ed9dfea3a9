//! Build report produced when a session is finalized

use serde::Serialize;
use serde_json::Value;

use crate::{
    chunk_graph::{ChunkGraph, ChunkNode},
    config::{FeatureSet, NormalizedConfig},
    fidelity::{Fidelity, Mode},
    ingest::{IngestSummary, SessionGraph},
    module_graph::{ModuleKey, ModuleNode},
    timings::{PluginTiming, Resolution},
};

/// Everything a session learned, ready to be serialized for the report client
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub mode: Mode,
    pub fidelity: Fidelity,
    pub features: FeatureSet,
    pub compilers: Vec<String>,
    pub modules: Vec<ModuleNode>,
    pub chunks: Vec<ChunkNode>,
    pub plugins: Vec<PluginTiming>,
    pub resolutions: Vec<Resolution>,
    /// Circular module dependencies
    pub cycles: Vec<Vec<ModuleKey>>,
    pub summary: IngestSummary,
    /// Serialized module rules, when loader analysis recorded them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_rules: Option<Value>,
}

impl BuildReport {
    pub fn from_parts(
        config: &NormalizedConfig,
        graph: SessionGraph,
        chunks: ChunkGraph,
        module_rules: Option<Value>,
    ) -> Self {
        let cycles = graph.modules.dependency_cycles();

        Self {
            mode: config.mode,
            fidelity: config.fidelity,
            features: config.features,
            compilers: graph.compilers.into_iter().collect(),
            modules: graph.modules.into_modules().collect(),
            chunks: chunks.into_chunks().collect(),
            plugins: graph.plugins.iter().cloned().collect(),
            resolutions: graph.resolutions.iter().cloned().collect(),
            cycles,
            summary: graph.totals,
            module_rules,
        }
    }

    pub fn module(&self, key: &ModuleKey) -> Option<&ModuleNode> {
        self.modules.iter().find(|node| &node.key == key)
    }

    pub fn chunk(&self, id: &str) -> Option<&ChunkNode> {
        self.chunks.iter().find(|chunk| chunk.id == id)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
