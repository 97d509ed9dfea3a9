//! Incremental ingestion of compilation snapshots
//!
//! Every compiler of a build session feeds its snapshots into one
//! [`GraphIngestor`]. Each `ingest` call holds the ingestor lock for the whole
//! merge, so concurrent producers are serialized without knowing about each other.
//! The session ends with [`GraphIngestor::finalize`], after which the graph is
//! handed out and every further call fails with [`IngestError::Closed`].
//!
//! Records gated off by the feature set are dropped before any graph state is
//! allocated for them. Records without identity are skipped and counted.

use std::mem;

use indexmap::IndexSet;
use log::{debug, trace, warn};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::{
    chunk_graph::ChunkGraph,
    config::FeatureSet,
    fidelity::Fidelity,
    module_graph::{LoaderTiming, ModuleGraph, ModuleKey, ModuleSize},
    snapshot::{
        AssetRecord, ChunkRecord, CompilationSnapshot, ModuleRecord, PluginTimingRecord,
        ResolverRecord, elapsed_ms,
    },
    timings::{PluginTiming, PluginTimings, Resolution, ResolverLog},
};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IngestError {
    /// Ingestion attempted after the session was finalized
    #[error("build session is finalized; no further ingestion is accepted")]
    Closed,
}

/// Lifecycle of the shared graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestState {
    #[default]
    Empty,
    Populating,
    Finalized,
}

/// Counters for one `ingest` call, or cumulative for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub modules_added: usize,
    pub modules_merged: usize,
    pub dependency_edges_added: usize,
    pub loader_timings: usize,
    pub chunks: usize,
    pub assets: usize,
    /// Assets that belong to no chunk and were not stored
    pub orphan_assets: usize,
    pub plugin_timings: usize,
    pub resolutions: usize,
    /// Records dropped because their feature is switched off
    pub dropped_by_feature: usize,
    /// Loader timings dropped by the loader skip list
    pub skipped_loaders: usize,
    /// Records skipped for missing identity
    pub malformed: usize,
}

impl IngestSummary {
    fn accumulate(&mut self, other: &Self) {
        self.modules_added += other.modules_added;
        self.modules_merged += other.modules_merged;
        self.dependency_edges_added += other.dependency_edges_added;
        self.loader_timings += other.loader_timings;
        self.chunks += other.chunks;
        self.assets += other.assets;
        self.orphan_assets += other.orphan_assets;
        self.plugin_timings += other.plugin_timings;
        self.resolutions += other.resolutions;
        self.dropped_by_feature += other.dropped_by_feature;
        self.skipped_loaders += other.skipped_loaders;
        self.malformed += other.malformed;
    }
}

/// Everything the ingestor accumulates over a session
#[derive(Debug, Default)]
pub struct SessionGraph {
    pub modules: ModuleGraph,
    pub plugins: PluginTimings,
    pub resolutions: ResolverLog,
    /// Compilers that contributed snapshots, in order of first appearance
    pub compilers: IndexSet<String>,
    /// Cumulative counters over every ingest call
    pub totals: IngestSummary,
}

#[derive(Debug, Default)]
struct Shared {
    state: IngestState,
    graph: SessionGraph,
}

/// Merges compilation snapshots into the shared session graph
#[derive(Debug, Default)]
pub struct GraphIngestor {
    shared: Mutex<Shared>,
    skip_loaders: Vec<String>,
    /// Label for snapshots that do not name their compiler
    default_compiler: Option<String>,
}

impl GraphIngestor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop loader timings whose loader id contains any of `skip_loaders`
    #[must_use]
    pub fn with_skip_loaders(mut self, skip_loaders: Vec<String>) -> Self {
        self.skip_loaders = skip_loaders
            .into_iter()
            .filter(|loader| !loader.is_empty())
            .collect();
        self
    }

    /// Label snapshots without a `compiler` field with `name`
    #[must_use]
    pub fn with_default_compiler(mut self, name: Option<String>) -> Self {
        self.default_compiler = name.filter(|name| !name.is_empty());
        self
    }

    pub fn state(&self) -> IngestState {
        self.shared.lock().state
    }

    /// Read the graph while the session is still populating
    pub fn with_graph<R>(&self, f: impl FnOnce(&SessionGraph) -> R) -> R {
        f(&self.shared.lock().graph)
    }

    /// Merge one snapshot into the shared graph.
    ///
    /// `chunk_graph` is owned by the host; it is locked after the ingestor lock for
    /// the duration of the merge.
    pub fn ingest(
        &self,
        snapshot: &CompilationSnapshot,
        chunk_graph: &Mutex<ChunkGraph>,
        features: &FeatureSet,
        fidelity: Fidelity,
    ) -> Result<IngestSummary, IngestError> {
        let mut shared = self.shared.lock();
        match shared.state {
            IngestState::Finalized => return Err(IngestError::Closed),
            IngestState::Empty => {
                debug!("Graph ingestion started (fidelity={fidelity})");
                shared.state = IngestState::Populating;
            }
            IngestState::Populating => {}
        }

        let mut chunks = chunk_graph.lock();
        let mut pass = IngestPass {
            graph: &mut shared.graph,
            chunks: &mut chunks,
            features,
            fidelity,
            skip_loaders: &self.skip_loaders,
            summary: IngestSummary::default(),
        };

        let compiler = snapshot
            .compiler
            .as_ref()
            .filter(|name| !name.is_empty())
            .or(self.default_compiler.as_ref());
        if let Some(compiler) = compiler
            && !pass.graph.compilers.contains(compiler)
        {
            pass.graph.compilers.insert(compiler.clone());
        }
        pass.ingest_chunks(&snapshot.chunks);
        pass.ingest_modules(&snapshot.modules);
        pass.ingest_assets(&snapshot.assets);
        pass.ingest_plugins(&snapshot.plugins);
        pass.ingest_resolutions(&snapshot.resolver);

        let summary = pass.summary;
        shared.graph.totals.accumulate(&summary);

        debug!(
            "Ingested snapshot from {}: {} modules added, {} merged, {} malformed records skipped",
            compiler.map_or("<unnamed compiler>", String::as_str),
            summary.modules_added,
            summary.modules_merged,
            summary.malformed
        );
        Ok(summary)
    }

    /// End the session and hand out the accumulated graph
    pub fn finalize(&self) -> Result<SessionGraph, IngestError> {
        let mut shared = self.shared.lock();
        if shared.state == IngestState::Finalized {
            return Err(IngestError::Closed);
        }
        shared.state = IngestState::Finalized;

        let graph = mem::take(&mut shared.graph);
        debug!(
            "Graph ingestion finalized: {} modules from {} compilers",
            graph.modules.len(),
            graph.compilers.len()
        );
        Ok(graph)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// State of a single `ingest` call, alive while both locks are held
struct IngestPass<'a> {
    graph: &'a mut SessionGraph,
    chunks: &'a mut ChunkGraph,
    features: &'a FeatureSet,
    fidelity: Fidelity,
    skip_loaders: &'a [String],
    summary: IngestSummary,
}

impl IngestPass<'_> {
    fn ingest_modules(&mut self, records: &[ModuleRecord]) {
        let keep_source = self.fidelity.keeps_module_source();

        for (index, record) in records.iter().enumerate() {
            let Some(key) = ModuleKey::from_parts(
                record.path.as_deref(),
                record.query.as_deref(),
                record.layer.as_deref(),
            ) else {
                warn!("Skipping module record #{index}: missing resolved path");
                self.summary.malformed += 1;
                continue;
            };

            let loader_timings = self.loader_timings(&key, record);

            let (node, created) = self.graph.modules.get_or_insert(key);
            if created {
                self.summary.modules_added += 1;
            } else {
                self.summary.modules_merged += 1;
            }

            node.size.merge_max(ModuleSize {
                source_size: record.size.source_size,
                transformed_size: record.size.transformed_size,
                parsed_size: record.size.parsed_size,
            });
            node.is_entry |= record.is_entry;

            for dependency in &record.dependencies {
                // Unresolved requests have no target module
                let Some(target) = ModuleKey::from_parts(
                    dependency.path.as_deref(),
                    dependency.query.as_deref(),
                    dependency.layer.as_deref(),
                ) else {
                    continue;
                };
                if node.add_dependency(target) {
                    self.summary.dependency_edges_added += 1;
                }
            }

            for chunk_id in record.chunks.iter().filter(|id| !id.is_empty()) {
                node.add_chunk(chunk_id);
                self.chunks.add_module(chunk_id, &node.key);
            }

            for timing in loader_timings {
                node.record_loader(timing);
            }

            if let Some(source) = &record.source {
                node.attach_source(source, keep_source);
            }
        }
    }

    /// Loader timings of one module record that survive the feature gate and the
    /// skip list
    fn loader_timings(&mut self, key: &ModuleKey, record: &ModuleRecord) -> Vec<LoaderTiming> {
        if record.loaders.is_empty() {
            return Vec::new();
        }
        if !self.features.loader {
            trace!(
                "Dropping {} loader timings of {key}: loader analysis is disabled",
                record.loaders.len()
            );
            self.summary.dropped_by_feature += record.loaders.len();
            return Vec::new();
        }

        let mut timings = Vec::with_capacity(record.loaders.len());
        for (index, loader) in record.loaders.iter().enumerate() {
            let Some(name) = non_empty(loader.loader.as_deref()) else {
                warn!("Skipping loader timing #{index} of {key}: missing loader id");
                self.summary.malformed += 1;
                continue;
            };
            if self
                .skip_loaders
                .iter()
                .any(|skip| name.contains(skip.as_str()))
            {
                self.summary.skipped_loaders += 1;
                continue;
            }

            timings.push(LoaderTiming {
                loader: name.to_owned(),
                start_ms: loader.start_ms,
                end_ms: loader.end_ms,
                duration_ms: elapsed_ms(loader.start_ms, loader.end_ms),
            });
        }
        self.summary.loader_timings += timings.len();
        timings
    }

    fn ingest_chunks(&mut self, records: &[ChunkRecord]) {
        for (index, record) in records.iter().enumerate() {
            let Some(id) = non_empty(record.id.as_deref()) else {
                warn!("Skipping chunk record #{index}: missing chunk id");
                self.summary.malformed += 1;
                continue;
            };

            let chunk = self.chunks.get_or_insert(id);
            if chunk.name.is_none() {
                chunk.name.clone_from(&record.name);
            }
            chunk.initial |= record.initial;
            chunk.entry |= record.entry;

            for parent in record.parents.iter().filter(|p| !p.is_empty()) {
                self.chunks.link(parent, id);
            }
            for child in record.children.iter().filter(|c| !c.is_empty()) {
                self.chunks.link(id, child);
            }
            self.summary.chunks += 1;
        }
    }

    fn ingest_assets(&mut self, records: &[AssetRecord]) {
        let keep_payload = self.fidelity.keeps_asset_payload();

        for (index, record) in records.iter().enumerate() {
            let Some(path) = non_empty(record.path.as_deref()) else {
                warn!("Skipping asset record #{index}: missing asset path");
                self.summary.malformed += 1;
                continue;
            };
            let chunk_ids: Vec<&str> = record
                .chunks
                .iter()
                .map(String::as_str)
                .filter(|id| !id.is_empty())
                .collect();
            if chunk_ids.is_empty() {
                debug!("Asset {path} belongs to no chunk and is not stored");
                self.summary.orphan_assets += 1;
                continue;
            }

            let content = if keep_payload {
                record.content.as_deref()
            } else {
                None
            };
            for chunk_id in chunk_ids {
                self.chunks
                    .get_or_insert(chunk_id)
                    .attach_asset(path, record.size, content);
            }
            self.summary.assets += 1;
        }
    }

    fn ingest_plugins(&mut self, records: &[PluginTimingRecord]) {
        if records.is_empty() {
            return;
        }
        if !self.features.plugins {
            trace!(
                "Dropping {} plugin timings: plugin analysis is disabled",
                records.len()
            );
            self.summary.dropped_by_feature += records.len();
            return;
        }

        for (index, record) in records.iter().enumerate() {
            let (Some(hook), Some(tap)) = (
                non_empty(record.hook.as_deref()),
                non_empty(record.tap.as_deref()),
            ) else {
                warn!("Skipping plugin timing #{index}: missing hook or tap name");
                self.summary.malformed += 1;
                continue;
            };

            self.graph.plugins.record(PluginTiming {
                hook: hook.to_owned(),
                tap: tap.to_owned(),
                start_ms: record.start_ms,
                end_ms: record.end_ms,
                duration_ms: elapsed_ms(record.start_ms, record.end_ms),
            });
            self.summary.plugin_timings += 1;
        }
    }

    fn ingest_resolutions(&mut self, records: &[ResolverRecord]) {
        if records.is_empty() {
            return;
        }
        if !self.features.resolver {
            trace!(
                "Dropping {} resolver records: resolver analysis is disabled",
                records.len()
            );
            self.summary.dropped_by_feature += records.len();
            return;
        }

        for (index, record) in records.iter().enumerate() {
            let (Some(issuer), Some(request)) = (
                non_empty(record.issuer.as_deref()),
                non_empty(record.request.as_deref()),
            ) else {
                warn!("Skipping resolver record #{index}: missing issuer or request");
                self.summary.malformed += 1;
                continue;
            };

            self.graph.resolutions.record(Resolution {
                issuer: issuer.to_owned(),
                request: request.to_owned(),
                resolved: record.resolved.clone(),
                duration_ms: elapsed_ms(record.start_ms, record.end_ms),
            });
            self.summary.resolutions += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        config::DEFAULTS,
        snapshot::{DependencyRecord, LoaderTimingRecord, ModuleSizeRecord},
    };

    fn features() -> FeatureSet {
        FeatureSet {
            resolver: true,
            ..DEFAULTS.features
        }
    }

    fn dependency(path: &str) -> DependencyRecord {
        DependencyRecord {
            request: Some(path.to_owned()),
            path: Some(path.to_owned()),
            ..Default::default()
        }
    }

    fn loader(name: &str, start_ms: u64, end_ms: u64) -> LoaderTimingRecord {
        LoaderTimingRecord {
            loader: Some(name.to_owned()),
            start_ms,
            end_ms,
        }
    }

    fn module(path: &str, deps: &[&str]) -> ModuleRecord {
        ModuleRecord {
            path: Some(path.to_owned()),
            size: ModuleSizeRecord {
                source_size: 100,
                transformed_size: 0,
                parsed_size: 0,
            },
            dependencies: deps.iter().map(|dep| dependency(dep)).collect(),
            chunks: vec!["main".to_owned()],
            ..Default::default()
        }
    }

    fn rich_snapshot() -> CompilationSnapshot {
        CompilationSnapshot {
            compiler: Some("web".to_owned()),
            modules: vec![ModuleRecord {
                source: Some("import './b.js';".to_owned()),
                loaders: vec![loader("/node_modules/babel-loader/lib/index.js", 0, 25)],
                ..module("/src/a.js", &["/src/b.js"])
            }],
            chunks: vec![ChunkRecord {
                id: Some("main".to_owned()),
                name: Some("main".to_owned()),
                initial: true,
                entry: true,
                ..Default::default()
            }],
            assets: vec![AssetRecord {
                path: Some("main.js".to_owned()),
                size: 2048,
                chunks: vec!["main".to_owned()],
                content: Some("(() => {})()".to_owned()),
            }],
            plugins: vec![PluginTimingRecord {
                hook: Some("emit".to_owned()),
                tap: Some("HtmlPlugin".to_owned()),
                start_ms: 5,
                end_ms: 9,
            }],
            resolver: vec![ResolverRecord {
                issuer: Some("/src/a.js".to_owned()),
                request: Some("./b.js".to_owned()),
                resolved: Some("/src/b.js".to_owned()),
                start_ms: 1,
                end_ms: 2,
            }],
        }
    }

    #[test]
    fn test_state_transitions() {
        let ingestor = GraphIngestor::new();
        let chunks = Mutex::new(ChunkGraph::new());
        assert_eq!(ingestor.state(), IngestState::Empty);

        ingestor
            .ingest(&CompilationSnapshot::default(), &chunks, &features(), Fidelity::Normal)
            .expect("open session accepts snapshots");
        assert_eq!(ingestor.state(), IngestState::Populating);

        ingestor.finalize().expect("first finalize succeeds");
        assert_eq!(ingestor.state(), IngestState::Finalized);
        assert_eq!(ingestor.finalize().err(), Some(IngestError::Closed));
    }

    #[test]
    fn test_duplicate_module_is_merged() {
        let ingestor = GraphIngestor::new();
        let chunks = Mutex::new(ChunkGraph::new());

        let first = CompilationSnapshot {
            modules: vec![module("/src/a.js", &["/src/b.js"])],
            ..Default::default()
        };
        let second = CompilationSnapshot {
            modules: vec![module("/src/a.js", &["/src/b.js", "/src/c.js"])],
            ..Default::default()
        };

        let summary = ingestor
            .ingest(&first, &chunks, &features(), Fidelity::Normal)
            .expect("ingest succeeds");
        assert_eq!(summary.modules_added, 1);
        let summary = ingestor
            .ingest(&second, &chunks, &features(), Fidelity::Normal)
            .expect("ingest succeeds");
        assert_eq!(summary.modules_added, 0);
        assert_eq!(summary.modules_merged, 1);
        assert_eq!(summary.dependency_edges_added, 1);

        let graph = ingestor.finalize().expect("finalize succeeds");
        assert_eq!(graph.modules.len(), 1);
        let node = graph
            .modules
            .get(&ModuleKey::new("/src/a.js"))
            .expect("module exists");
        let edges: Vec<String> = node.dependencies.iter().map(ToString::to_string).collect();
        assert_eq!(edges, vec!["/src/b.js".to_owned(), "/src/c.js".to_owned()]);
        assert_eq!(node.size.source_size, 100);
        assert_eq!(node.chunks.len(), 1);
        assert_eq!(graph.totals.modules_added, 1);
        assert_eq!(graph.totals.modules_merged, 1);
    }

    #[test]
    fn test_repeated_snapshot_is_idempotent() {
        let ingestor = GraphIngestor::new();
        let chunks = Mutex::new(ChunkGraph::new());
        let snapshot = rich_snapshot();

        ingestor
            .ingest(&snapshot, &chunks, &features(), Fidelity::Normal)
            .expect("ingest succeeds");
        let once = ingestor.with_graph(|graph| {
            graph
                .modules
                .iter()
                .map(|node| (node.key.clone(), node.dependencies.len(), node.size))
                .collect::<Vec<_>>()
        });

        let summary = ingestor
            .ingest(&snapshot, &chunks, &features(), Fidelity::Normal)
            .expect("ingest succeeds");
        assert_eq!(summary.modules_added, 0);
        assert_eq!(summary.dependency_edges_added, 0);

        let twice = ingestor.with_graph(|graph| {
            assert_eq!(graph.plugins.len(), 1);
            assert_eq!(graph.resolutions.len(), 1);
            graph
                .modules
                .iter()
                .map(|node| (node.key.clone(), node.dependencies.len(), node.size))
                .collect::<Vec<_>>()
        });
        assert_eq!(once, twice);

        let chunks = chunks.lock();
        let main = chunks.get("main").expect("chunk exists");
        assert_eq!(main.modules.len(), 1);
        assert_eq!(main.assets.len(), 1);
    }

    #[test]
    fn test_sizes_and_timings_merge_by_maximum() {
        let ingestor = GraphIngestor::new();
        let chunks = Mutex::new(ChunkGraph::new());
        let snapshot = |size: u64, duration: u64| CompilationSnapshot {
            modules: vec![ModuleRecord {
                size: ModuleSizeRecord {
                    source_size: size,
                    transformed_size: size / 2,
                    parsed_size: 0,
                },
                loaders: vec![loader("ts-loader", 100, 100 + duration)],
                ..module("/src/a.ts", &[])
            }],
            ..Default::default()
        };

        for (size, duration) in [(300, 10), (200, 40), (250, 20)] {
            ingestor
                .ingest(&snapshot(size, duration), &chunks, &features(), Fidelity::Normal)
                .expect("ingest succeeds");
        }

        let graph = ingestor.finalize().expect("finalize succeeds");
        let node = graph
            .modules
            .get(&ModuleKey::new("/src/a.ts"))
            .expect("module exists");
        assert_eq!(node.size.source_size, 300);
        assert_eq!(node.size.transformed_size, 150);
        assert_eq!(node.loaders["ts-loader"].duration_ms, 40);
    }

    #[test]
    fn test_loader_gate_drops_only_loader_timings() {
        let ingestor = GraphIngestor::new();
        let chunks = Mutex::new(ChunkGraph::new());
        let gated = FeatureSet {
            loader: false,
            ..features()
        };

        let summary = ingestor
            .ingest(&rich_snapshot(), &chunks, &gated, Fidelity::Normal)
            .expect("ingest succeeds");
        assert_eq!(summary.loader_timings, 0);
        assert_eq!(summary.dropped_by_feature, 1);

        let graph = ingestor.finalize().expect("finalize succeeds");
        let node = graph
            .modules
            .get(&ModuleKey::new("/src/a.js"))
            .expect("module node is still created");
        assert!(node.loaders.is_empty());
        assert_eq!(node.dependencies.len(), 1);
        assert_eq!(graph.plugins.len(), 1);
        assert_eq!(graph.resolutions.len(), 1);
    }

    #[test]
    fn test_plugin_and_resolver_gates() {
        let ingestor = GraphIngestor::new();
        let chunks = Mutex::new(ChunkGraph::new());
        let gated = FeatureSet {
            plugins: false,
            resolver: false,
            ..features()
        };

        let summary = ingestor
            .ingest(&rich_snapshot(), &chunks, &gated, Fidelity::Normal)
            .expect("ingest succeeds");
        assert_eq!(summary.dropped_by_feature, 2);

        let graph = ingestor.finalize().expect("finalize succeeds");
        assert!(graph.plugins.is_empty());
        assert!(graph.resolutions.is_empty());
        let node = graph
            .modules
            .get(&ModuleKey::new("/src/a.js"))
            .expect("module exists");
        assert_eq!(node.loaders.len(), 1);
    }

    #[test]
    fn test_lowest_fidelity_drops_all_payloads() {
        let ingestor = GraphIngestor::new();
        let chunks = Mutex::new(ChunkGraph::new());

        ingestor
            .ingest(&rich_snapshot(), &chunks, &features(), Fidelity::NoSourceAndAssets)
            .expect("ingest succeeds");

        let graph = ingestor.finalize().expect("finalize succeeds");
        assert!(graph.modules.iter().all(|node| node.source.is_none()));
        assert!(graph.modules.iter().all(|node| node.source_hash.is_some()));

        let chunks = chunks.lock();
        let main = chunks.get("main").expect("chunk exists");
        assert!(!main.has_asset_payload());
        assert_eq!(main.assets["main.js"].size, 2048);
    }

    #[test]
    fn test_intermediate_fidelity_keeps_assets_only() {
        for fidelity in [Fidelity::NoCode, Fidelity::NoSource] {
            let ingestor = GraphIngestor::new();
            let chunks = Mutex::new(ChunkGraph::new());
            ingestor
                .ingest(&rich_snapshot(), &chunks, &features(), fidelity)
                .expect("ingest succeeds");

            let graph = ingestor.finalize().expect("finalize succeeds");
            assert!(graph.modules.iter().all(|node| node.source.is_none()));
            assert!(
                chunks
                    .lock()
                    .get("main")
                    .is_some_and(|chunk| chunk.has_asset_payload())
            );
        }
    }

    #[test]
    fn test_normal_fidelity_keeps_everything() {
        let ingestor = GraphIngestor::new();
        let chunks = Mutex::new(ChunkGraph::new());
        ingestor
            .ingest(&rich_snapshot(), &chunks, &features(), Fidelity::Normal)
            .expect("ingest succeeds");

        let graph = ingestor.finalize().expect("finalize succeeds");
        let node = graph
            .modules
            .get(&ModuleKey::new("/src/a.js"))
            .expect("module exists");
        assert_eq!(node.source.as_deref(), Some("import './b.js';"));

        let chunks = chunks.lock();
        let main = chunks.get("main").expect("chunk exists");
        assert!(main.initial && main.entry);
        assert!(main.modules.contains(&ModuleKey::new("/src/a.js")));
        assert!(main.has_asset_payload());
        assert_eq!(graph.compilers.iter().collect::<Vec<_>>(), vec!["web"]);
    }

    #[test]
    fn test_malformed_records_are_skipped_and_counted() {
        let ingestor = GraphIngestor::new();
        let chunks = Mutex::new(ChunkGraph::new());
        let snapshot = CompilationSnapshot {
            modules: vec![
                ModuleRecord::default(),
                module("/src/ok.js", &[]),
                ModuleRecord {
                    path: Some(String::new()),
                    ..Default::default()
                },
            ],
            chunks: vec![ChunkRecord::default()],
            assets: vec![AssetRecord {
                size: 10,
                ..Default::default()
            }],
            plugins: vec![PluginTimingRecord {
                hook: Some("done".to_owned()),
                ..Default::default()
            }],
            resolver: vec![ResolverRecord::default()],
            ..Default::default()
        };

        let summary = ingestor
            .ingest(&snapshot, &chunks, &features(), Fidelity::Normal)
            .expect("malformed records never abort ingestion");

        assert_eq!(summary.malformed, 6);
        assert_eq!(summary.modules_added, 1);
        ingestor.with_graph(|graph| {
            assert_eq!(graph.modules.len(), 1);
            assert!(graph.plugins.is_empty());
        });
    }

    #[test]
    fn test_asset_with_only_empty_chunk_ids_is_orphaned() {
        let ingestor = GraphIngestor::new();
        let chunks = Mutex::new(ChunkGraph::new());
        let snapshot = CompilationSnapshot {
            assets: vec![AssetRecord {
                path: Some("stray.js".to_owned()),
                size: 12,
                chunks: vec![String::new(), String::new()],
                content: Some("/* stray */".to_owned()),
            }],
            ..Default::default()
        };

        let summary = ingestor
            .ingest(&snapshot, &chunks, &features(), Fidelity::Normal)
            .expect("ingest succeeds");

        assert_eq!(summary.orphan_assets, 1);
        assert_eq!(summary.assets, 0);
        assert!(chunks.lock().is_empty());
    }

    #[test]
    fn test_default_compiler_labels_unnamed_snapshots() {
        let ingestor = GraphIngestor::new().with_default_compiler(Some("web".to_owned()));
        let chunks = Mutex::new(ChunkGraph::new());

        let unnamed = CompilationSnapshot {
            modules: vec![module("/src/a.js", &[])],
            ..Default::default()
        };
        let named = CompilationSnapshot {
            compiler: Some("node".to_owned()),
            ..Default::default()
        };
        for snapshot in [&unnamed, &named, &unnamed] {
            ingestor
                .ingest(snapshot, &chunks, &features(), Fidelity::Normal)
                .expect("ingest succeeds");
        }

        let graph = ingestor.finalize().expect("finalize succeeds");
        let compilers: Vec<&str> = graph.compilers.iter().map(String::as_str).collect();
        assert_eq!(compilers, vec!["web", "node"]);
    }

    #[test]
    fn test_skip_loaders() {
        let ingestor = GraphIngestor::new()
            .with_skip_loaders(vec!["babel-loader".to_owned(), String::new()]);
        let chunks = Mutex::new(ChunkGraph::new());
        let snapshot = CompilationSnapshot {
            modules: vec![ModuleRecord {
                loaders: vec![
                    loader("/node_modules/babel-loader/lib/index.js", 0, 5),
                    loader("/node_modules/css-loader/dist/cjs.js", 0, 7),
                ],
                ..module("/src/app.css", &[])
            }],
            ..Default::default()
        };

        let summary = ingestor
            .ingest(&snapshot, &chunks, &features(), Fidelity::Normal)
            .expect("ingest succeeds");
        assert_eq!(summary.skipped_loaders, 1);
        assert_eq!(summary.loader_timings, 1);

        ingestor.with_graph(|graph| {
            let node = graph
                .modules
                .get(&ModuleKey::new("/src/app.css"))
                .expect("module exists");
            let loaders: Vec<&str> = node.loaders.keys().map(String::as_str).collect();
            assert_eq!(loaders, vec!["/node_modules/css-loader/dist/cjs.js"]);
        });
    }

    #[test]
    fn test_ingest_after_finalize_is_rejected() {
        let ingestor = GraphIngestor::new();
        let chunks = Mutex::new(ChunkGraph::new());
        ingestor
            .ingest(&rich_snapshot(), &chunks, &features(), Fidelity::Normal)
            .expect("ingest succeeds");
        let graph = ingestor.finalize().expect("finalize succeeds");

        let late = CompilationSnapshot {
            modules: vec![module("/src/late.js", &[])],
            chunks: vec![ChunkRecord {
                id: Some("late".to_owned()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let result = ingestor.ingest(&late, &chunks, &features(), Fidelity::Normal);

        assert_eq!(result, Err(IngestError::Closed));
        assert_eq!(graph.modules.len(), 1);
        assert!(chunks.lock().get("late").is_none());
        ingestor.with_graph(|graph| assert!(graph.modules.is_empty()));
    }
}
