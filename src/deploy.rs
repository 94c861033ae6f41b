//! Deployment pipeline
//!
//! One agent deploys as: load and validate config, merge the variable
//! layers, resolve `${...}` placeholders in the declared flags, split
//! secret bindings out of the plain flags, synthesize the gcloud command,
//! then run pre-deploy hooks, stage the build context, execute, and run
//! post-deploy hooks. Dry runs stop after synthesis; they stage nothing,
//! run no hooks, and write nothing.
//!
//! Failures are unit-scoped. In a multi-agent invocation one agent's
//! failure is recorded and the remaining agents still deploy.

use crate::command::{self, CommandSpec, DeploymentMode};
use crate::config::{AgentConfig, AgentPaths, ConfigWarning};
use crate::docker;
use crate::envfile::{EnvLayer, LayerRank, LayerStack};
use crate::error::GantryResult;
use crate::hooks::{self, HookStage};
use crate::resolve;
use crate::runner::CommandRunner;
use crate::secrets;

/// Caller-selected knobs for one deploy invocation.
#[derive(Debug, Clone, Copy)]
pub struct DeployOptions {
    pub mode: DeploymentMode,
    pub skip_hooks: bool,
}

/// A fully resolved deployment, ready to preview or execute.
///
/// Planning reads config and env files but has no other side effects, so a
/// plan can always be built for display even when nothing will be executed.
#[derive(Debug)]
pub struct DeployPlan {
    pub config: AgentConfig,
    pub warnings: Vec<ConfigWarning>,
    pub command: CommandSpec,
    /// Environment-prefixed service name
    pub service: String,
    pub binding_count: usize,
    /// Env var names dropped from plain flags because a secret binds them
    pub pruned: Vec<String>,
}

/// Report for one finished or simulated deployment.
#[derive(Debug)]
pub struct DeployOutcome {
    pub agent: String,
    pub service: String,
    pub command: CommandSpec,
    pub warnings: Vec<ConfigWarning>,
    pub pruned: Vec<String>,
    pub binding_count: usize,
    pub executed: bool,
}

/// Merge the substitution sources for one agent, weakest first: the shared
/// `.env` at the project root, then the agent's own `.env.secrets`.
pub fn load_layers(paths: &AgentPaths, agent: &str) -> GantryResult<LayerStack> {
    let mut stack = LayerStack::new();
    stack.push(EnvLayer::load(
        &paths.global_env_file(),
        LayerRank::GlobalDefaults,
    )?);
    stack.push(EnvLayer::load(
        &paths.secrets_file(agent),
        LayerRank::AgentSecrets,
    )?);
    Ok(stack)
}

/// Resolve one agent's config down to an executable command.
pub fn plan_agent(
    paths: &AgentPaths,
    name: &str,
    mode: &DeploymentMode,
) -> GantryResult<DeployPlan> {
    let (config, warnings) = AgentConfig::load_with_warnings(paths, name)?;
    let layers = load_layers(paths, name)?;

    let resolved = resolve::resolve_flags(&config.cloud_run.additional_flags, &layers)?;
    let flags = secrets::classify(&resolved)?;

    let region = resolve_optional(config.cloud_run.gcp_location.as_deref(), &layers)?;
    let project = resolve_optional(config.cloud_run.gcp_project.as_deref(), &layers)?;

    let command = command::synthesize(
        &config,
        region.as_deref(),
        project.as_deref(),
        &flags,
        mode,
    );
    let service = format!("{}{}", mode.target.prefix(), config.cloud_run.service_name);

    Ok(DeployPlan {
        binding_count: flags.bindings.len(),
        pruned: flags.pruned,
        config,
        warnings,
        command,
        service,
    })
}

/// Deploy one agent. Dry runs return the planned command without touching
/// hooks, the filesystem, or the runner.
pub fn deploy_agent(
    paths: &AgentPaths,
    name: &str,
    options: &DeployOptions,
    runner: &dyn CommandRunner,
) -> GantryResult<DeployOutcome> {
    let plan = plan_agent(paths, name, &options.mode)?;

    if options.mode.is_dry_run() {
        return Ok(into_outcome(name, plan, false));
    }

    let agent_dir = paths.agent_dir(name);
    if !options.skip_hooks {
        hooks::run_stage(
            &plan.config,
            HookStage::PreDeploy,
            options.mode.target,
            &agent_dir,
            runner,
        )?;
    }

    // The staged directory is removed when `staged` drops, success or not.
    let staged = docker::stage_build_context(paths, &plan.config)?;
    let command = plan.command.clone().with_cwd(staged.path().to_path_buf());
    runner.run_checked(&command)?;

    if !options.skip_hooks {
        hooks::run_stage(
            &plan.config,
            HookStage::PostDeploy,
            options.mode.target,
            &agent_dir,
            runner,
        )?;
    }

    Ok(into_outcome(name, plan, true))
}

/// Deploy several agents. Every agent is attempted; failures come back
/// paired with the agent that caused them, in the input order.
///
/// Agents share no mutable state, so Execute-mode deploys run on scoped
/// threads, one per agent. Dry runs stay sequential to keep the rendered
/// output byte-deterministic.
pub fn deploy_many(
    paths: &AgentPaths,
    names: &[String],
    options: &DeployOptions,
    runner: &dyn CommandRunner,
) -> Vec<(String, GantryResult<DeployOutcome>)> {
    if options.mode.is_dry_run() || names.len() <= 1 {
        return names
            .iter()
            .map(|name| (name.clone(), deploy_agent(paths, name, options, runner)))
            .collect();
    }

    std::thread::scope(|scope| {
        let handles: Vec<_> = names
            .iter()
            .map(|name| {
                (
                    name,
                    scope.spawn(move || deploy_agent(paths, name, options, runner)),
                )
            })
            .collect();
        handles
            .into_iter()
            .map(|(name, handle)| {
                let result = match handle.join() {
                    Ok(result) => result,
                    Err(payload) => std::panic::resume_unwind(payload),
                };
                (name.clone(), result)
            })
            .collect()
    })
}

fn into_outcome(agent: &str, plan: DeployPlan, executed: bool) -> DeployOutcome {
    DeployOutcome {
        agent: agent.to_string(),
        service: plan.service,
        command: plan.command,
        warnings: plan.warnings,
        pruned: plan.pruned,
        binding_count: plan.binding_count,
        executed,
    }
}

fn resolve_optional(
    value: Option<&str>,
    layers: &LayerStack,
) -> GantryResult<Option<String>> {
    value.map(|v| resolve::resolve(v, layers)).transpose()
}
