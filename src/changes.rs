//! Change-driven agent selection for CI
//!
//! Given the list of paths that changed between two revisions, decide which
//! agents must be redeployed. A path under `agents/<name>/` touches that
//! agent; a path matching a global pattern (shared manifests, the utils
//! tree, workflow definitions) escalates to every known agent. Global
//! classification dominates: a path that is both agent-scoped and global
//! counts as global.
//!
//! Selection runs once per CI invocation, before any per-agent work, and its
//! output is treated as immutable by everything downstream.

use std::collections::BTreeSet;
use std::io::BufRead;

use serde::Serialize;

use crate::error::{GantryError, GantryResult};

/// Root-level files that affect every agent
const GLOBAL_FILES: [&str; 7] = [
    ".env",
    "requirements.txt",
    "environment.yml",
    "Makefile",
    "makefile",
    "pyproject.toml",
    ".python-version",
];

/// Directory prefixes shared by every agent
const GLOBAL_PREFIXES: [&str; 2] = ["utils/", ".github/workflows/"];

/// Paths whose changes force a full redeploy.
#[derive(Debug, Clone)]
pub struct GlobalPatterns {
    /// Exact paths relative to the project root
    files: Vec<String>,
    /// Directory prefixes, each ending in '/'
    prefixes: Vec<String>,
}

impl Default for GlobalPatterns {
    fn default() -> Self {
        GlobalPatterns {
            files: GLOBAL_FILES.iter().map(|s| s.to_string()).collect(),
            prefixes: GLOBAL_PREFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl GlobalPatterns {
    /// Extend the defaults. A pattern ending in `/` matches as a directory
    /// prefix; anything else must match a path exactly.
    pub fn with_extra(mut self, extra: &[String]) -> Self {
        for pattern in extra {
            if pattern.ends_with('/') {
                self.prefixes.push(pattern.clone());
            } else {
                self.files.push(pattern.clone());
            }
        }
        self
    }

    pub fn matches(&self, path: &str) -> bool {
        self.files.iter().any(|f| f == path)
            || self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}

/// The agents a set of changed paths touches.
///
/// When `global_escalation` is set, `agents` holds every known agent no
/// matter which individual paths changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub agents: BTreeSet<String>,
    pub global_escalation: bool,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Classify changed paths into the set of agents to redeploy.
pub fn select(
    changed_paths: &[String],
    known_agents: &[String],
    agents_dir: &str,
    patterns: &GlobalPatterns,
) -> ChangeSet {
    let normalized: Vec<&str> = changed_paths.iter().map(|p| normalize(p)).collect();

    if normalized.iter().any(|path| patterns.matches(path)) {
        return ChangeSet {
            agents: known_agents.iter().cloned().collect(),
            global_escalation: true,
        };
    }

    let mut agents = BTreeSet::new();
    for agent in known_agents {
        let prefix = format!("{agents_dir}/{agent}/");
        if normalized.iter().any(|path| path.starts_with(&prefix)) {
            agents.insert(agent.clone());
        }
    }

    ChangeSet {
        agents,
        global_escalation: false,
    }
}

/// Read newline-separated changed paths, skipping blank lines.
pub fn read_paths<R: BufRead>(reader: R) -> GantryResult<Vec<String>> {
    let mut paths = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| GantryError::ChangeDetection {
            reason: format!("failed to read changed paths: {e}"),
        })?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            paths.push(trimmed.to_string());
        }
    }
    Ok(paths)
}

fn normalize(path: &str) -> &str {
    path.trim().trim_start_matches("./")
}
