//! Gantry - per-agent Cloud Run deployment engine
//!
//! Gantry lets teams keep a fleet of Python agents in one repository, each
//! with its own declarative `config.yaml`, and deploy them to Cloud Run with
//! layered environment resolution, Secret Manager bindings, and CI change
//! detection.

pub mod changes;
pub mod check;
pub mod command;
pub mod config;
pub mod deploy;
pub mod docker;
pub mod envfile;
pub mod error;
pub mod hooks;
pub mod resolve;
pub mod runner;
pub mod secrets;
pub mod snapshot;

// Re-exports for convenience
pub use changes::{select, ChangeSet, GlobalPatterns};
pub use command::{synthesize, CommandSpec, DeployScope, DeploymentMode, EnvTarget, RunMode};
pub use config::{list_agents, AgentConfig, AgentPaths};
pub use deploy::{deploy_agent, deploy_many, DeployOptions, DeployOutcome};
pub use error::{GantryError, GantryResult};
pub use resolve::resolve;
pub use runner::{CommandRunner, SystemRunner};
pub use secrets::{classify, SecretBinding};
