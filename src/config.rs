//! Agent configuration loading and listing
//!
//! Each deployable agent lives in its own directory under the agents root
//! (`agents/` by default) with a `config.yaml` describing its Docker build,
//! Cloud Run service, and deploy hooks. Loading validates the schema and
//! surfaces unknown keys as warnings with a did-you-mean suggestion rather
//! than failing, so adding a key in a newer gantry never bricks older
//! checkouts.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GantryError, GantryResult};

/// Per-agent configuration file name
pub const CONFIG_FILE: &str = "config.yaml";

/// Default agents root, relative to the project root
pub const DEFAULT_AGENTS_DIR: &str = "agents";

/// Environment override for the agents root
pub const AGENTS_DIR_ENV: &str = "GANTRY_AGENTS_DIR";

/// Keys the schema knows about, used for unknown-key suggestions
const KNOWN_KEYS: &[&str] = &[
    "description",
    "tags",
    "docker",
    "base_image",
    "system_packages",
    "extra_steps",
    "cloud_run",
    "service_name",
    "gcp_project",
    "gcp_location",
    "additional_flags",
    "secrets_strategy",
    "hooks",
    "pre_deploy",
    "post_deploy",
];

/// One agent's declarative configuration (`config.yaml`)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AgentConfig {
    /// Agent name, taken from the directory name, not the file
    #[serde(skip)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub docker: DockerSection,

    #[serde(default)]
    pub cloud_run: CloudRunSection,

    #[serde(default)]
    pub hooks: HooksSection,
}

/// Docker build settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DockerSection {
    /// Overrides the template's FROM image when set
    #[serde(default)]
    pub base_image: Option<String>,

    /// apt packages installed into the image
    #[serde(default)]
    pub system_packages: Vec<String>,

    /// Raw Dockerfile lines spliced in before the entrypoint
    #[serde(default)]
    pub extra_steps: Vec<String>,
}

/// Cloud Run service settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CloudRunSection {
    /// Deployed service name (required, prefixed per environment)
    #[serde(default)]
    pub service_name: String,

    #[serde(default)]
    pub gcp_project: Option<String>,

    #[serde(default)]
    pub gcp_location: Option<String>,

    /// Raw gcloud flags, resolved and classified before synthesis
    #[serde(default)]
    pub additional_flags: Vec<String>,

    /// How Full deploys reconcile secrets on the service
    #[serde(default)]
    pub secrets_strategy: SecretsStrategy,
}

/// Secret reconciliation strategy for Full deployments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretsStrategy {
    /// Clear every existing binding, then set exactly the declared ones
    #[default]
    ClearThenSet,
    /// Merge declared bindings into whatever the service already has
    Additive,
}

/// Pre/post-deploy hook scripts, relative to the agent directory
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HooksSection {
    #[serde(default)]
    pub pre_deploy: Vec<String>,

    #[serde(default)]
    pub post_deploy: Vec<String>,
}

/// Warning for an unknown configuration key
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub key: String,
    pub file: PathBuf,
    pub line: Option<usize>,
    pub suggestion: Option<String>,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown key '{}' in {}", self.key, self.file.display())?;
        if let Some(line) = self.line {
            write!(f, ":{line}")?;
        }
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " (did you mean '{suggestion}'?)")?;
        }
        Ok(())
    }
}

/// Resolved filesystem locations for a project
#[derive(Debug, Clone)]
pub struct AgentPaths {
    pub project_root: PathBuf,
    pub agents_dir: PathBuf,
}

impl AgentPaths {
    /// Resolve from CLI flags and the `GANTRY_AGENTS_DIR` override.
    /// Precedence: `--agents-dir` flag, then the env var, then `agents/`
    /// under the project root.
    pub fn discover(project_root: Option<PathBuf>, agents_dir: Option<PathBuf>) -> Self {
        let project_root = project_root.unwrap_or_else(|| PathBuf::from("."));
        let agents_dir = agents_dir
            .or_else(|| std::env::var_os(AGENTS_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_AGENTS_DIR));
        let agents_dir = if agents_dir.is_absolute() {
            agents_dir
        } else {
            project_root.join(agents_dir)
        };
        AgentPaths {
            project_root,
            agents_dir,
        }
    }

    pub fn agent_dir(&self, name: &str) -> PathBuf {
        self.agents_dir.join(name)
    }

    pub fn config_file(&self, name: &str) -> PathBuf {
        self.agent_dir(name).join(CONFIG_FILE)
    }

    /// Per-agent secrets layer, never committed
    pub fn secrets_file(&self, name: &str) -> PathBuf {
        self.agent_dir(name).join(".env.secrets")
    }

    /// Project-wide defaults layer
    pub fn global_env_file(&self) -> PathBuf {
        self.project_root.join(".env")
    }
}

impl AgentConfig {
    /// Load one agent's configuration, discarding warnings.
    pub fn load(paths: &AgentPaths, name: &str) -> GantryResult<Self> {
        Self::load_with_warnings(paths, name).map(|(config, _)| config)
    }

    /// Load one agent's configuration, collecting unknown-key warnings.
    pub fn load_with_warnings(
        paths: &AgentPaths,
        name: &str,
    ) -> GantryResult<(Self, Vec<ConfigWarning>)> {
        let path = paths.config_file(name);
        if !path.exists() {
            return Err(GantryError::MissingConfig {
                agent: name.to_string(),
                path,
            });
        }
        let content = fs::read_to_string(&path)?;
        Self::parse_with_warnings(&content, name, &path)
    }

    /// Parse config.yaml content, tracking keys the schema does not know.
    fn parse_with_warnings(
        content: &str,
        name: &str,
        path: &Path,
    ) -> GantryResult<(Self, Vec<ConfigWarning>)> {
        let mut unknown_keys: Vec<String> = Vec::new();
        let deserializer = serde_yaml_ng::Deserializer::from_str(content);
        let mut config: AgentConfig = serde_ignored::deserialize(deserializer, |ignored_path| {
            unknown_keys.push(ignored_path.to_string());
        })
        .map_err(|e| GantryError::SchemaViolation {
            agent: name.to_string(),
            reason: e.to_string(),
        })?;

        config.name = name.to_string();
        config.validate(name)?;

        let warnings = unknown_keys
            .into_iter()
            .map(|key| {
                let leaf = key.rsplit('.').next().unwrap_or(&key).to_string();
                ConfigWarning {
                    line: find_line_number(content, &leaf),
                    suggestion: suggest_key(&leaf),
                    key,
                    file: path.to_path_buf(),
                }
            })
            .collect();

        Ok((config, warnings))
    }

    fn validate(&self, name: &str) -> GantryResult<()> {
        if self.cloud_run.service_name.trim().is_empty() {
            return Err(GantryError::SchemaViolation {
                agent: name.to_string(),
                reason: "cloud_run.service_name must be a non-empty string".to_string(),
            });
        }
        Ok(())
    }
}

/// Result of scanning the agents root
#[derive(Debug, Default)]
pub struct AgentListing {
    /// Valid agents, sorted by name
    pub agents: Vec<AgentConfig>,
    /// Entries that had a config file which failed to load
    pub skipped: Vec<SkippedAgent>,
}

#[derive(Debug)]
pub struct SkippedAgent {
    pub name: String,
    pub reason: String,
}

/// Scan the agents root. Directories without a config file are not agents
/// and are ignored; directories whose config fails to load are skipped with
/// a warning entry, never fatally.
pub fn list_agents(paths: &AgentPaths) -> GantryResult<AgentListing> {
    if !paths.agents_dir.is_dir() {
        return Err(GantryError::DirectoryNotFound {
            path: paths.agents_dir.clone(),
        });
    }

    let mut listing = AgentListing::default();
    for entry in fs::read_dir(&paths.agents_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || !paths.config_file(&name).exists() {
            continue;
        }
        match AgentConfig::load(paths, &name) {
            Ok(config) => listing.agents.push(config),
            Err(e) => listing.skipped.push(SkippedAgent {
                name,
                reason: e.to_string(),
            }),
        }
    }

    // Sort by name for deterministic output
    listing.agents.sort_by(|a, b| a.name.cmp(&b.name));
    listing.skipped.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(listing)
}

/// Names of all valid agents, sorted.
pub fn agent_names(paths: &AgentPaths) -> GantryResult<Vec<String>> {
    Ok(list_agents(paths)?
        .agents
        .into_iter()
        .map(|a| a.name)
        .collect())
}

/// Find the 1-based line where a key appears, for warning locations.
fn find_line_number(content: &str, key: &str) -> Option<usize> {
    content
        .lines()
        .position(|line| line.trim_start().starts_with(&format!("{key}:")))
        .map(|idx| idx + 1)
}

/// Suggest the closest known key within edit distance 2.
fn suggest_key(key: &str) -> Option<String> {
    KNOWN_KEYS
        .iter()
        .map(|known| (known, levenshtein(key, known)))
        .filter(|(_, distance)| *distance <= 2)
        .min_by_key(|(_, distance)| *distance)
        .map(|(known, _)| known.to_string())
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.iter().enumerate() {
        let mut previous = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let current = row[j + 1];
            row[j + 1] = if ca == cb {
                previous
            } else {
                1 + previous.min(row[j]).min(row[j + 1])
            };
            previous = current;
        }
    }
    row[b.len()]
}
