//! Chunk graph
//!
//! The host constructs the chunk graph and hands it to the ingestor, which only
//! enriches it: module memberships, parent/child relations and emitted assets.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::module_graph::ModuleKey;

/// An emitted file attached to a chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPayload {
    pub path: String,
    pub size: u64,
    /// Emitted code, dropped at the lowest fidelity level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkNode {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub initial: bool,
    pub entry: bool,
    pub modules: IndexSet<ModuleKey>,
    pub parents: IndexSet<String>,
    pub children: IndexSet<String>,
    /// Assets keyed by emitted path
    pub assets: IndexMap<String, AssetPayload>,
}

impl ChunkNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            initial: false,
            entry: false,
            modules: IndexSet::new(),
            parents: IndexSet::new(),
            children: IndexSet::new(),
            assets: IndexMap::new(),
        }
    }

    /// Attach an asset. Sizes merge by maximum and the first payload wins.
    pub fn attach_asset(&mut self, path: &str, size: u64, content: Option<&str>) {
        let asset = self
            .assets
            .entry(path.to_owned())
            .or_insert_with(|| AssetPayload {
                path: path.to_owned(),
                size: 0,
                content: None,
            });
        asset.size = asset.size.max(size);
        if asset.content.is_none() {
            asset.content = content.map(str::to_owned);
        }
    }

    pub fn has_asset_payload(&self) -> bool {
        self.assets.values().any(|asset| asset.content.is_some())
    }
}

/// Chunks of a build session, keyed by chunk id
#[derive(Debug, Default)]
pub struct ChunkGraph {
    chunks: IndexMap<String, ChunkNode>,
}

impl ChunkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the graph with chunks the host already knows about
    pub fn from_chunks(chunks: impl IntoIterator<Item = ChunkNode>) -> Self {
        Self {
            chunks: chunks
                .into_iter()
                .map(|chunk| (chunk.id.clone(), chunk))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ChunkNode> {
        self.chunks.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkNode> {
        self.chunks.values()
    }

    /// Consume the graph, yielding chunks in order of first appearance
    pub fn into_chunks(self) -> impl Iterator<Item = ChunkNode> {
        self.chunks.into_values()
    }

    pub fn get_or_insert(&mut self, id: &str) -> &mut ChunkNode {
        self.chunks
            .entry(id.to_owned())
            .or_insert_with(|| ChunkNode::new(id))
    }

    /// Record a parent/child relation on both chunks
    pub fn link(&mut self, parent: &str, child: &str) {
        self.get_or_insert(parent).children.insert(child.to_owned());
        self.get_or_insert(child).parents.insert(parent.to_owned());
    }

    pub fn add_module(&mut self, chunk_id: &str, module: &ModuleKey) {
        let chunk = self.get_or_insert(chunk_id);
        if !chunk.modules.contains(module) {
            chunk.modules.insert(module.clone());
        }
    }
}
