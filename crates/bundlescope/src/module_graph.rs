//! Module graph shared by every compilation of a build session
//!
//! Nodes are keyed by [`ModuleKey`] (resolved path plus query/layer variant) so the
//! same module re-emitted by another pass or another compiler lands on the same
//! node. All merge operations are monotonic: sizes and timings keep the maximum
//! observed value, edge and membership sets only grow.

use std::{fmt, hash::BuildHasherDefault};

use indexmap::{IndexMap, IndexSet, map::Entry};
use petgraph::{algo::tarjan_scc, graph::DiGraph};
use rustc_hash::{FxHashMap, FxHasher};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Type alias for FxHasher-based IndexMap
type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// Unique identifier for a module, in order of first appearance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ModuleId(u32);

impl ModuleId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the underlying u32 value of the ModuleId
    #[inline]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

/// Stable identity of a module across passes and compilers
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleKey {
    /// Resolved file path
    pub path: String,
    /// Resource query, e.g. `?raw`
    pub query: Option<String>,
    /// Build layer the module was compiled in
    pub layer: Option<String>,
}

impl ModuleKey {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: None,
            layer: None,
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    #[must_use]
    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    /// Build a key from optional record fields. A missing or empty path means the
    /// record has no identity.
    pub fn from_parts(
        path: Option<&str>,
        query: Option<&str>,
        layer: Option<&str>,
    ) -> Option<Self> {
        let path = path.filter(|p| !p.is_empty())?;
        Some(Self {
            path: path.to_owned(),
            query: query.filter(|q| !q.is_empty()).map(str::to_owned),
            layer: layer.filter(|l| !l.is_empty()).map(str::to_owned),
        })
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        if let Some(query) = &self.query {
            if !query.starts_with('?') {
                f.write_str("?")?;
            }
            f.write_str(query)?;
        }
        if let Some(layer) = &self.layer {
            write!(f, "|{layer}")?;
        }
        Ok(())
    }
}

impl Serialize for ModuleKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Module sizes in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSize {
    pub source_size: u64,
    pub transformed_size: u64,
    pub parsed_size: u64,
}

impl ModuleSize {
    /// Field-wise maximum
    pub fn merge_max(&mut self, other: Self) {
        self.source_size = self.source_size.max(other.source_size);
        self.transformed_size = self.transformed_size.max(other.transformed_size);
        self.parsed_size = self.parsed_size.max(other.parsed_size);
    }
}

/// Time one loader spent on one module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderTiming {
    pub loader: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub duration_ms: u64,
}

/// A module and everything learned about it so far
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleNode {
    pub id: ModuleId,
    pub key: ModuleKey,
    pub size: ModuleSize,
    /// Outgoing references, without duplicates, in discovery order
    pub dependencies: IndexSet<ModuleKey>,
    /// Loader timings keyed by loader id
    pub loaders: IndexMap<String, LoaderTiming>,
    /// Ids of the chunks containing this module
    pub chunks: IndexSet<String>,
    pub is_entry: bool,
    /// Source text, only present when fidelity allows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// SHA-256 of the source text, kept at every fidelity level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,
}

impl ModuleNode {
    pub fn new(id: ModuleId, key: ModuleKey) -> Self {
        Self {
            id,
            key,
            size: ModuleSize::default(),
            dependencies: IndexSet::new(),
            loaders: IndexMap::new(),
            chunks: IndexSet::new(),
            is_entry: false,
            source: None,
            source_hash: None,
        }
    }

    /// Add an outgoing edge. Returns `false` if the edge already existed.
    pub fn add_dependency(&mut self, target: ModuleKey) -> bool {
        self.dependencies.insert(target)
    }

    pub fn add_chunk(&mut self, chunk_id: &str) -> bool {
        if self.chunks.contains(chunk_id) {
            return false;
        }
        self.chunks.insert(chunk_id.to_owned())
    }

    /// Record a loader timing, keeping the longest one seen for that loader
    pub fn record_loader(&mut self, timing: LoaderTiming) {
        match self.loaders.get_mut(&timing.loader) {
            Some(existing) if existing.duration_ms >= timing.duration_ms => {}
            Some(existing) => *existing = timing,
            None => {
                self.loaders.insert(timing.loader.clone(), timing);
            }
        }
    }

    /// Attach source text. The first non-empty text seen for a module wins; the
    /// text itself is only kept when `keep_text` is set, the hash always.
    pub fn attach_source(&mut self, text: &str, keep_text: bool) {
        if self.source_hash.is_some() || text.is_empty() {
            return;
        }
        self.source_hash = Some(format!("{:x}", Sha256::digest(text.as_bytes())));
        if keep_text {
            self.source = Some(text.to_owned());
        }
    }
}

/// All modules of a build session
#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: FxIndexMap<ModuleKey, ModuleNode>,
    /// Next module ID to allocate
    next_module_id: u32,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn get(&self, key: &ModuleKey) -> Option<&ModuleNode> {
        self.modules.get(key)
    }

    pub fn contains(&self, key: &ModuleKey) -> bool {
        self.modules.contains_key(key)
    }

    /// Modules in order of first appearance
    pub fn iter(&self) -> impl Iterator<Item = &ModuleNode> {
        self.modules.values()
    }

    pub fn into_modules(self) -> impl Iterator<Item = ModuleNode> {
        self.modules.into_values()
    }

    /// Fetch the node for `key`, creating it if needed. The flag is `true` when
    /// the node was created by this call.
    pub fn get_or_insert(&mut self, key: ModuleKey) -> (&mut ModuleNode, bool) {
        match self.modules.entry(key) {
            Entry::Occupied(entry) => (entry.into_mut(), false),
            Entry::Vacant(entry) => {
                let id = ModuleId::new(self.next_module_id);
                self.next_module_id += 1;
                let node = ModuleNode::new(id, entry.key().clone());
                (entry.insert(node), true)
            }
        }
    }

    /// Modules with an edge to `key`
    pub fn dependents(&self, key: &ModuleKey) -> Vec<&ModuleKey> {
        self.modules
            .values()
            .filter(|node| node.dependencies.contains(key))
            .map(|node| &node.key)
            .collect()
    }

    /// Circular dependencies: strongly connected components with more than one
    /// module, plus modules that depend on themselves. Edges to modules that are
    /// not in the graph are ignored. Each cycle is ordered by module id.
    pub fn dependency_cycles(&self) -> Vec<Vec<ModuleKey>> {
        let mut graph = DiGraph::<ModuleId, ()>::new();
        let mut node_indices = FxHashMap::default();
        for node in self.modules.values() {
            node_indices.insert(node.id, graph.add_node(node.id));
        }

        for node in self.modules.values() {
            let from = node_indices[&node.id];
            for target in &node.dependencies {
                if let Some(target) = self.modules.get(target) {
                    graph.update_edge(from, node_indices[&target.id], ());
                }
            }
        }

        let mut cycles: Vec<Vec<ModuleId>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1 || graph.contains_edge(component[0], component[0])
            })
            .map(|component| {
                let mut ids: Vec<ModuleId> = component.into_iter().map(|idx| graph[idx]).collect();
                ids.sort_unstable();
                ids
            })
            .collect();
        cycles.sort();

        let keys_by_id: FxHashMap<ModuleId, &ModuleKey> = self
            .modules
            .values()
            .map(|node| (node.id, &node.key))
            .collect();
        cycles
            .into_iter()
            .map(|ids| ids.into_iter().map(|id| keys_by_id[&id].clone()).collect())
            .collect()
    }
}
