//! Error types for Gantry
//!
//! Uses `thiserror` for library errors. Variants are unit-scoped wherever
//! possible so one agent's failure never aborts its siblings; only change
//! detection is pipeline-scoped. Secret *values* must never appear in any
//! message - only variable and secret names do.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Gantry operations
pub type GantryResult<T> = Result<T, GantryError>;

/// Main error type for Gantry operations
#[derive(Error, Debug)]
pub enum GantryError {
    /// Agent has no configuration file at the expected path
    #[error("no configuration found for agent '{agent}' (expected {path})")]
    MissingConfig { agent: String, path: PathBuf },

    /// Configuration file exists but violates the schema
    #[error("invalid configuration for agent '{agent}': {reason}")]
    SchemaViolation { agent: String, reason: String },

    /// A `${...}` placeholder references a variable no layer defines
    #[error("undefined variable '{name}' in '{context}' - define it in .env or the agent's .env.secrets")]
    UndefinedVariable { name: String, context: String },

    /// A secret binding does not match ENV_VAR=SECRET_NAME[:VERSION]
    #[error("malformed secret binding '{fragment}': {reason}")]
    MalformedSecretBinding { fragment: String, reason: String },

    /// A file the build context requires does not exist
    #[error("missing build input for agent '{agent}': {path}")]
    MissingBuildInput { agent: String, path: PathBuf },

    /// External command could not be spawned
    #[error("failed to run {program}: {source}")]
    CommandSpawn {
        program: String,
        source: std::io::Error,
    },

    /// External command ran and exited non-zero
    #[error("{program} exited with {code}: {stderr}")]
    CommandFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    /// A deploy hook script failed or was missing
    #[error("hook '{script}' failed for agent '{agent}': {reason}")]
    HookFailed {
        agent: String,
        script: String,
        reason: String,
    },

    /// Change-detection input could not be read; aborts the whole run
    #[error("change detection failed: {reason}")]
    ChangeDetection { reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Directory not found
    #[error("directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },
}
