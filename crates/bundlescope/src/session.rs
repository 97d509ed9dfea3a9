//! Build session
//!
//! [`AnalysisSession`] owns the normalized configuration and everything the
//! compilers of one build feed into it. It is `Sync`: compilers running on
//! separate threads share a `&AnalysisSession` and call [`AnalysisSession::ingest`]
//! concurrently.

use std::mem;

use log::{debug, info};
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;

use crate::{
    chunk_graph::ChunkGraph,
    config::NormalizedConfig,
    ingest::{GraphIngestor, IngestError, IngestState, IngestSummary},
    report::BuildReport,
    rule_conditions::{RuleSetRule, make_rules_serializable},
    snapshot::CompilationSnapshot,
};

#[derive(Debug, Error)]
pub enum RulesError {
    #[error(transparent)]
    Closed(#[from] IngestError),
    #[error("module rules cannot be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Module rules waiting for the report; `closed` once the session is finalized
#[derive(Debug, Default)]
struct RulesSlot {
    rules: Option<Value>,
    closed: bool,
}

#[derive(Debug)]
pub struct AnalysisSession {
    config: NormalizedConfig,
    ingestor: GraphIngestor,
    chunk_graph: Mutex<ChunkGraph>,
    module_rules: Mutex<RulesSlot>,
}

impl AnalysisSession {
    pub fn new(config: NormalizedConfig) -> Self {
        Self::with_chunk_graph(config, ChunkGraph::new())
    }

    /// Start a session around a chunk graph the host has already built
    pub fn with_chunk_graph(config: NormalizedConfig, chunk_graph: ChunkGraph) -> Self {
        let ingestor = GraphIngestor::new()
            .with_skip_loaders(config.loader_interceptor.skip_loaders.clone())
            .with_default_compiler(config.name.clone());
        debug!(
            "Analysis session opened (mode={}, fidelity={})",
            config.mode, config.fidelity
        );

        Self {
            config,
            ingestor,
            chunk_graph: Mutex::new(chunk_graph),
            module_rules: Mutex::new(RulesSlot::default()),
        }
    }

    pub fn config(&self) -> &NormalizedConfig {
        &self.config
    }

    pub fn state(&self) -> IngestState {
        self.ingestor.state()
    }

    /// Merge one compilation snapshot, applying the session's features and fidelity
    pub fn ingest(&self, snapshot: &CompilationSnapshot) -> Result<IngestSummary, IngestError> {
        self.ingestor.ingest(
            snapshot,
            &self.chunk_graph,
            &self.config.features,
            self.config.fidelity,
        )
    }

    /// Record the host's module rules for the report.
    ///
    /// Rules are only kept when loader analysis is enabled; returns whether they
    /// were recorded. Later calls replace earlier ones.
    pub fn record_module_rules(&self, rules: &[RuleSetRule]) -> Result<bool, RulesError> {
        let mut slot = self.module_rules.lock();
        if slot.closed {
            return Err(IngestError::Closed.into());
        }
        if !self.config.features.loader {
            debug!("Ignoring module rules: loader analysis is disabled");
            return Ok(false);
        }

        make_rules_serializable(rules);
        slot.rules = Some(serde_json::to_value(rules)?);
        Ok(true)
    }

    /// Close the session and build the report. Fails if already finalized.
    pub fn finalize(&self) -> Result<BuildReport, IngestError> {
        let graph = self.ingestor.finalize()?;
        let chunks = mem::take(&mut *self.chunk_graph.lock());
        let module_rules = {
            let mut slot = self.module_rules.lock();
            slot.closed = true;
            slot.rules.take()
        };

        let report = BuildReport::from_parts(&self.config, graph, chunks, module_rules);
        info!(
            "Build report ready: {} modules, {} chunks, {} dependency cycles",
            report.modules.len(),
            report.chunks.len(),
            report.cycles.len()
        );
        Ok(report)
    }
}
