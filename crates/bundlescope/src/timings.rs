//! Plugin and resolver telemetry
//!
//! Both ledgers follow the module merge policy: one entry per identity, keeping
//! the longest duration observed.

use indexmap::IndexMap;
use serde::Serialize;

/// Longest observed run of one plugin tap on one hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginTiming {
    pub hook: String,
    pub tap: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub duration_ms: u64,
}

/// Plugin timings keyed by (hook, tap)
#[derive(Debug, Default)]
pub struct PluginTimings {
    entries: IndexMap<(String, String), PluginTiming>,
}

impl PluginTimings {
    pub fn record(&mut self, timing: PluginTiming) {
        let key = (timing.hook.clone(), timing.tap.clone());
        match self.entries.get_mut(&key) {
            Some(existing) if existing.duration_ms >= timing.duration_ms => {}
            Some(existing) => *existing = timing,
            None => {
                self.entries.insert(key, timing);
            }
        }
    }

    pub fn get(&self, hook: &str, tap: &str) -> Option<&PluginTiming> {
        self.entries.get(&(hook.to_owned(), tap.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginTiming> {
        self.entries.values()
    }
}

/// Longest observed resolution of one request from one issuer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub issuer: String,
    pub request: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    pub duration_ms: u64,
}

/// Resolutions keyed by (issuer, request)
#[derive(Debug, Default)]
pub struct ResolverLog {
    entries: IndexMap<(String, String), Resolution>,
}

impl ResolverLog {
    pub fn record(&mut self, resolution: Resolution) {
        let key = (resolution.issuer.clone(), resolution.request.clone());
        let entry = self.entries.entry(key).or_insert_with(|| Resolution {
            issuer: resolution.issuer.clone(),
            request: resolution.request.clone(),
            resolved: None,
            duration_ms: 0,
        });
        entry.duration_ms = entry.duration_ms.max(resolution.duration_ms);
        if entry.resolved.is_none() {
            entry.resolved = resolution.resolved;
        }
    }

    pub fn get(&self, issuer: &str, request: &str) -> Option<&Resolution> {
        self.entries.get(&(issuer.to_owned(), request.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resolution> {
        self.entries.values()
    }
}
