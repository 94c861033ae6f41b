//! Dotenv-format parsing and prioritized environment layers
//!
//! Deployment configuration draws variables from two files: the project-wide
//! `.env` (lowest priority) and the agent's `.env.secrets` (overrides it).
//! Each file becomes one [`EnvLayer`]; a [`LayerStack`] merges them into the
//! ephemeral per-agent view the resolver reads. Layers are never mutated by
//! merging and a merged view is never shared between agents.

use std::path::Path;

use crate::error::GantryResult;

/// Priority rank of an environment layer. Higher ranks override lower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LayerRank {
    /// Project-wide defaults (`.env` at the project root)
    GlobalDefaults,
    /// Per-agent secrets file (`agents/<name>/.env.secrets`)
    AgentSecrets,
}

impl LayerRank {
    /// Human label used in verbose output and error context
    pub fn label(&self) -> &'static str {
        match self {
            LayerRank::GlobalDefaults => "global .env",
            LayerRank::AgentSecrets => "agent .env.secrets",
        }
    }
}

/// One prioritized source of key=value pairs, in file order.
#[derive(Debug, Clone)]
pub struct EnvLayer {
    pub rank: LayerRank,
    entries: Vec<(String, String)>,
}

impl EnvLayer {
    pub fn empty(rank: LayerRank) -> Self {
        EnvLayer {
            rank,
            entries: Vec::new(),
        }
    }

    /// Parse dotenv-format content: `KEY=VALUE` lines, `#` comments and blank
    /// lines ignored, lines without `=` ignored. One level of matching single
    /// or double quotes around the value is stripped.
    pub fn from_dotenv(rank: LayerRank, content: &str) -> Self {
        let mut entries = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            entries.push((key.to_string(), strip_quotes(value.trim()).to_string()));
        }
        EnvLayer { rank, entries }
    }

    /// Load a dotenv file. A missing file is an empty layer, not an error.
    pub fn load(path: &Path, rank: LayerRank) -> GantryResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Self::from_dotenv(rank, &content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::empty(rank)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Variable names defined by this layer, in file order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    #[cfg(test)]
    pub fn from_pairs(rank: LayerRank, pairs: &[(&str, &str)]) -> Self {
        EnvLayer {
            rank,
            entries: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Ordered collection of layers for one agent's resolution pass.
#[derive(Debug, Clone, Default)]
pub struct LayerStack {
    layers: Vec<EnvLayer>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, layer: EnvLayer) {
        self.layers.push(layer);
    }

    pub fn layers(&self) -> &[EnvLayer] {
        &self.layers
    }

    /// Look up a variable, taking the value from the highest-ranked layer
    /// that defines it. Ties between layers of equal rank go to the later
    /// layer, matching file order.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.layers
            .iter()
            .filter(|layer| layer.get(key).is_some())
            .max_by_key(|layer| layer.rank)
            .and_then(|layer| layer.get(key))
    }

    /// Total number of entries across all layers (for verbose reporting).
    pub fn entry_count(&self) -> usize {
        self.layers.iter().map(|l| l.len()).sum()
    }
}

/// Strip one level of matching single or double quotes.
fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}
