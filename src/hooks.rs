//! Pre/post-deploy hook execution
//!
//! Agents may declare ordered script lists under `hooks.pre_deploy` and
//! `hooks.post_deploy`, with paths relative to the agent directory. Scripts
//! run from the agent directory with the agent name as their only argument
//! and the `GANTRY_AGENT` / `GANTRY_SERVICE` / `GANTRY_ENVIRONMENT`
//! variables exported. The first missing or failing script fails the stage;
//! later scripts in that stage do not run.

use std::path::{Component, Path};

use serde::Serialize;

use crate::command::{CommandSpec, EnvTarget};
use crate::config::AgentConfig;
use crate::error::{GantryError, GantryResult};
use crate::runner::CommandRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookStage {
    PreDeploy,
    PostDeploy,
}

impl HookStage {
    pub fn label(&self) -> &'static str {
        match self {
            HookStage::PreDeploy => "pre_deploy",
            HookStage::PostDeploy => "post_deploy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pre_deploy" => Some(HookStage::PreDeploy),
            "post_deploy" => Some(HookStage::PostDeploy),
            _ => None,
        }
    }

    /// The configured scripts for this stage, in declared order.
    pub fn scripts<'a>(&self, config: &'a AgentConfig) -> &'a [String] {
        match self {
            HookStage::PreDeploy => &config.hooks.pre_deploy,
            HookStage::PostDeploy => &config.hooks.post_deploy,
        }
    }
}

/// One successfully executed hook script.
#[derive(Debug)]
pub struct HookRun {
    pub script: String,
    pub stdout: String,
}

/// Run every script of a stage in order. Unit-scoped: the error names the
/// agent and the script, and siblings of the failing script are skipped.
pub fn run_stage(
    config: &AgentConfig,
    stage: HookStage,
    target: EnvTarget,
    agent_dir: &Path,
    runner: &dyn CommandRunner,
) -> GantryResult<Vec<HookRun>> {
    let mut runs = Vec::new();

    for script in stage.scripts(config) {
        let failed = |reason: String| GantryError::HookFailed {
            agent: config.name.clone(),
            script: script.clone(),
            reason,
        };

        if escapes_agent_dir(Path::new(script)) {
            return Err(failed("script path escapes the agent directory".to_string()));
        }
        let script_path = agent_dir.join(script);
        if !script_path.is_file() {
            return Err(failed(format!(
                "script not found at {}",
                script_path.display()
            )));
        }
        // A relative program path would resolve against the command's cwd,
        // not ours; hand the runner an absolute path.
        let script_path = script_path.canonicalize()?;

        let spec = CommandSpec::new(
            script_path.to_string_lossy().into_owned(),
            vec![config.name.clone()],
        )
        .with_env("GANTRY_AGENT", config.name.clone())
        .with_env(
            "GANTRY_SERVICE",
            format!("{}{}", target.prefix(), config.cloud_run.service_name),
        )
        .with_env("GANTRY_ENVIRONMENT", target.label())
        .with_cwd(agent_dir.to_path_buf());

        match runner.run(&spec) {
            Ok(output) if output.success() => runs.push(HookRun {
                script: script.clone(),
                stdout: output.stdout,
            }),
            Ok(output) => {
                return Err(failed(format!(
                    "exited with {}: {}",
                    output.code,
                    output.stderr.trim_end()
                )))
            }
            Err(e) => return Err(failed(e.to_string())),
        }
    }

    Ok(runs)
}

/// Hook scripts must stay inside the agent directory.
fn escapes_agent_dir(script: &Path) -> bool {
    script.is_absolute()
        || script
            .components()
            .any(|c| matches!(c, Component::ParentDir))
}
