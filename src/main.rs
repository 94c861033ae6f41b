//! Gantry CLI - per-agent Cloud Run deployment engine
//!
//! Usage: gantry <COMMAND>
//!
//! Commands:
//!   deploy          Deploy one or more agents
//!   list            List available agents
//!   check           Validate agent configurations without deploying
//!   test            Exercise build staging and Dockerfile rendering
//!   delete          Delete a deployed service
//!   detect-changes  Map changed paths to agents that need redeploying
//!   hooks           Run or list an agent's deploy hooks

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use gantry::command::EnvTarget;
use gantry::config::AgentPaths;

/// Gantry - declarative Cloud Run deployments for agent fleets
#[derive(Parser, Debug)]
#[command(name = "gantry")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Output format for CI
    #[arg(long, global = true)]
    json: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Agents root (default: ./agents, or GANTRY_AGENTS_DIR)
    #[arg(long, global = true)]
    agents_dir: Option<PathBuf>,

    /// Project root holding main.py, requirements.txt, and .env
    #[arg(long, global = true)]
    project_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Deploy one or more agents to Cloud Run
    Deploy {
        /// Agent names (directories under the agents root)
        #[arg(required = true)]
        agents: Vec<String>,

        /// Deploy to the dev environment (dev- service prefix)
        #[arg(long, conflicts_with = "stag")]
        dev: bool,

        /// Deploy to the staging environment (stag- service prefix)
        #[arg(long)]
        stag: bool,

        /// Update only the code; leave remote env vars and secrets untouched
        #[arg(long)]
        code_only: bool,

        /// Print the deployment command instead of running it
        #[arg(long)]
        dry_run: bool,

        /// Skip pre/post-deploy hooks
        #[arg(long)]
        skip_hooks: bool,
    },

    /// List agents with a valid configuration
    List,

    /// Validate agent configuration without deploying
    Check {
        /// Agent to check (default: all agents)
        agent: Option<String>,
    },

    /// Exercise the build pipeline without deploying
    Test {
        #[command(subcommand)]
        what: TestCommands,
    },

    /// Delete a deployed Cloud Run service
    Delete {
        /// Agent whose service to delete
        agent: String,

        /// Target the dev environment (dev- service prefix)
        #[arg(long, conflicts_with = "stag")]
        dev: bool,

        /// Target the staging environment (stag- service prefix)
        #[arg(long)]
        stag: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Decide which agents a set of changed files requires redeploying
    DetectChanges {
        /// Changed paths, relative to the project root
        paths: Vec<String>,

        /// Read changed paths from stdin, one per line
        #[arg(long, conflicts_with = "snapshot")]
        stdin: bool,

        /// Diff against a stored snapshot instead of a path list
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Extra global patterns (exact path, or directory prefix ending in /)
        #[arg(long = "global-pattern")]
        global_patterns: Vec<String>,
    },

    /// Run or list an agent's deploy hooks
    Hooks {
        /// Agent name
        agent: String,

        /// Hook stage to run
        #[arg(value_parser = ["pre_deploy", "post_deploy"], required_unless_present = "list")]
        stage: Option<String>,

        /// List configured hooks instead of running them
        #[arg(long)]
        list: bool,
    },
}

#[derive(Subcommand, Debug)]
enum TestCommands {
    /// Stage the build context and report its contents
    Build {
        /// Agent name
        agent: String,
    },

    /// Render the agent's Dockerfile to stdout
    Dockerfile {
        /// Agent name
        agent: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = AgentPaths::discover(cli.project_root.clone(), cli.agents_dir.clone());

    match cli.command {
        Commands::Deploy {
            agents,
            dev,
            stag,
            code_only,
            dry_run,
            skip_hooks,
        } => cmd_deploy(
            &paths,
            &agents,
            env_target(dev, stag),
            code_only,
            dry_run,
            skip_hooks,
            cli.json,
            cli.verbose,
        ),
        Commands::List => cmd_list(&paths, cli.json),
        Commands::Check { agent } => cmd_check(&paths, agent.as_deref(), cli.json),
        Commands::Test { what } => match what {
            TestCommands::Build { agent } => cmd_test_build(&paths, &agent, cli.json),
            TestCommands::Dockerfile { agent } => cmd_test_dockerfile(&paths, &agent, cli.json),
        },
        Commands::Delete {
            agent,
            dev,
            stag,
            yes,
        } => cmd_delete(&paths, &agent, env_target(dev, stag), yes, cli.json),
        Commands::DetectChanges {
            paths: changed,
            stdin,
            snapshot,
            global_patterns,
        } => cmd_detect_changes(&paths, changed, stdin, snapshot, &global_patterns, cli.json),
        Commands::Hooks { agent, stage, list } => {
            cmd_hooks(&paths, &agent, stage.as_deref(), list, cli.json)
        }
    }
}

fn env_target(dev: bool, stag: bool) -> EnvTarget {
    if dev {
        EnvTarget::Dev
    } else if stag {
        EnvTarget::Stag
    } else {
        EnvTarget::Prod
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_deploy(
    paths: &AgentPaths,
    agents: &[String],
    target: EnvTarget,
    code_only: bool,
    dry_run: bool,
    skip_hooks: bool,
    json: bool,
    verbose: u8,
) -> Result<()> {
    use gantry::command::{DeployScope, DeploymentMode, RunMode};
    use gantry::deploy::{deploy_many, DeployOptions};
    use gantry::runner::SystemRunner;

    let mode = DeploymentMode {
        scope: if code_only {
            DeployScope::CodeOnly
        } else {
            DeployScope::Full
        },
        run: if dry_run {
            RunMode::DryRun
        } else {
            RunMode::Execute
        },
        target,
    };
    let options = DeployOptions { mode, skip_hooks };

    if !json {
        println!("🚀 Gantry Deploy");
        println!("Mode: {}", mode.summary());
        println!();
    }

    let runner = SystemRunner;
    let results = deploy_many(paths, agents, &options, &runner);

    let mut failed = 0usize;
    for (agent, result) in &results {
        match result {
            Ok(outcome) => {
                if json {
                    let mut event = serde_json::json!({
                        "event": "deploy",
                        "agent": agent,
                        "service": outcome.service,
                        "mode": mode.summary(),
                        "executed": outcome.executed,
                    });
                    if !outcome.executed {
                        event["command"] = serde_json::Value::String(outcome.command.preview());
                    }
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    for warning in &outcome.warnings {
                        println!("⚠ {agent}: {warning}");
                    }
                    for name in &outcome.pruned {
                        println!(
                            "⚠ {agent}: {name} moved from plain env vars to its secret binding"
                        );
                    }
                    if outcome.executed {
                        if verbose > 0 {
                            println!("{}", outcome.command.preview());
                        }
                        println!("✓ {agent} → {} deployed", outcome.service);
                    } else {
                        println!("📋 {agent} → {} ({})", outcome.service, mode.summary());
                        println!("{}", outcome.command.preview());
                        println!();
                    }
                }
            }
            Err(e) => {
                failed += 1;
                if json {
                    let event = serde_json::json!({
                        "event": "error",
                        "agent": agent,
                        "message": e.to_string(),
                    });
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    eprintln!("✗ {agent}: {e}");
                }
            }
        }
    }

    let succeeded = results.len() - failed;
    if json {
        let event = serde_json::json!({
            "event": "summary",
            "deployed": succeeded,
            "failed": failed,
            "dry_run": dry_run,
            "success": failed == 0,
        });
        println!("{}", serde_json::to_string(&event)?);
    } else {
        println!();
        if dry_run {
            println!("Summary: {succeeded} command(s) rendered, {failed} failed");
        } else {
            println!("Summary: {succeeded} deployed, {failed} failed");
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_list(paths: &AgentPaths, json: bool) -> Result<()> {
    use gantry::config::list_agents;

    let listing = list_agents(paths)?;

    if json {
        for agent in &listing.agents {
            let event = serde_json::json!({
                "event": "agent",
                "name": agent.name,
                "service": agent.cloud_run.service_name,
                "description": agent.description,
                "tags": agent.tags,
                "has_secrets": paths.secrets_file(&agent.name).exists(),
            });
            println!("{}", serde_json::to_string(&event)?);
        }
        for skipped in &listing.skipped {
            let event = serde_json::json!({
                "event": "skipped",
                "name": skipped.name,
                "reason": skipped.reason,
            });
            println!("{}", serde_json::to_string(&event)?);
        }
        return Ok(());
    }

    println!("🤖 Available agents:");
    if listing.agents.is_empty() && listing.skipped.is_empty() {
        println!("No agents found with a config.yaml file");
        return Ok(());
    }

    for agent in &listing.agents {
        println!("  📁 {}", agent.name);
        if !agent.description.is_empty() {
            println!("     📝 {}", agent.description);
        }
        if let Some(base) = &agent.docker.base_image {
            println!("     🐳 Base: {base}");
        }
        if !agent.docker.system_packages.is_empty() {
            println!(
                "     📦 System packages: {}",
                agent.docker.system_packages.join(", ")
            );
        }
        if paths.secrets_file(&agent.name).exists() {
            println!("     🔐 Has secrets: yes");
        }
        println!("     ⚙️ Service: {}", agent.cloud_run.service_name);
        if !agent.tags.is_empty() {
            println!("     🏷️ Tags: {}", agent.tags.join(", "));
        }
    }

    for skipped in &listing.skipped {
        println!("  ⚠ Skipped {}: {}", skipped.name, skipped.reason);
    }

    Ok(())
}

fn cmd_check(paths: &AgentPaths, agent: Option<&str>, json: bool) -> Result<()> {
    use gantry::check::{run_agent_checks, run_all_checks};

    let reports = match agent {
        Some(name) => vec![run_agent_checks(paths, name)],
        None => run_all_checks(paths)?,
    };

    let errors: usize = reports.iter().map(|r| r.errors()).sum();
    let warnings: usize = reports.iter().map(|r| r.warnings()).sum();
    let passes: usize = reports.iter().map(|r| r.passes()).sum();

    if json {
        let document = serde_json::json!({
            "event": "check",
            "reports": reports,
            "passes": passes,
            "warnings": warnings,
            "errors": errors,
            "success": errors == 0,
        });
        println!("{}", serde_json::to_string(&document)?);
    } else {
        println!("🩺 Gantry Check");
        println!();
        for report in &reports {
            println!("{}", report.agent);
            for check in &report.checks {
                println!("  {} {} - {}", check.status, check.name, check.message);
            }
            println!();
        }
        println!("Summary: {passes} passed, {warnings} warnings, {errors} errors");
        if errors > 0 {
            println!();
            println!("🔴 Check found issues. Fix the errors before deploying.");
        } else if warnings > 0 {
            println!();
            println!("🟡 Check passed with warnings.");
        } else {
            println!();
            println!("🟢 All checks passed!");
        }
    }

    if errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_test_build(paths: &AgentPaths, agent: &str, json: bool) -> Result<()> {
    use gantry::config::AgentConfig;
    use gantry::docker::stage_build_context;

    let config = AgentConfig::load(paths, agent)?;
    let staged = stage_build_context(paths, &config)?;

    if json {
        let files: Vec<String> = staged
            .files
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        let event = serde_json::json!({
            "event": "test-build",
            "agent": agent,
            "files": files,
            "success": true,
        });
        println!("{}", serde_json::to_string(&event)?);
    } else {
        println!("🧪 Test Build: {agent}");
        println!("✓ Staged {} files:", staged.files.len());
        for file in &staged.files {
            println!("    - {}", file.display());
        }
    }

    Ok(())
}

fn cmd_test_dockerfile(paths: &AgentPaths, agent: &str, json: bool) -> Result<()> {
    use gantry::config::AgentConfig;
    use gantry::docker::{load_template, render_dockerfile};

    let config = AgentConfig::load(paths, agent)?;
    let template = load_template(paths)?;
    let rendered = render_dockerfile(&config, &template);

    if json {
        let event = serde_json::json!({
            "event": "test-dockerfile",
            "agent": agent,
            "dockerfile": rendered,
        });
        println!("{}", serde_json::to_string(&event)?);
    } else {
        println!("🧪 Test Dockerfile: {agent}");
        println!();
        println!("{rendered}");
    }

    Ok(())
}

fn cmd_delete(
    paths: &AgentPaths,
    agent: &str,
    target: EnvTarget,
    yes: bool,
    json: bool,
) -> Result<()> {
    use gantry::command::delete_command;
    use gantry::config::AgentConfig;
    use gantry::deploy::load_layers;
    use gantry::resolve::resolve;
    use gantry::runner::{CommandRunner, SystemRunner};
    use is_terminal::IsTerminal;

    let config = AgentConfig::load(paths, agent)?;
    let layers = load_layers(paths, agent)?;
    let region = match &config.cloud_run.gcp_location {
        Some(v) => Some(resolve(v, &layers)?),
        None => None,
    };
    let project = match &config.cloud_run.gcp_project {
        Some(v) => Some(resolve(v, &layers)?),
        None => None,
    };

    let service = format!("{}{}", target.prefix(), config.cloud_run.service_name);

    if !yes {
        if json || !std::io::stdin().is_terminal() {
            anyhow::bail!("refusing to delete {service} without --yes");
        }

        use dialoguer::Confirm;
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete service {service}?"))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let spec = delete_command(&config, region.as_deref(), project.as_deref(), target);
    SystemRunner.run_checked(&spec)?;

    if json {
        let event = serde_json::json!({
            "event": "delete",
            "agent": agent,
            "service": service,
            "success": true,
        });
        println!("{}", serde_json::to_string(&event)?);
    } else {
        println!("✓ Deleted {service}");
    }

    Ok(())
}

fn cmd_detect_changes(
    paths: &AgentPaths,
    given: Vec<String>,
    stdin: bool,
    snapshot: Option<PathBuf>,
    extra_patterns: &[String],
    json: bool,
) -> Result<()> {
    use gantry::changes::{read_paths, select, ChangeSet, GlobalPatterns};
    use gantry::config::agent_names;
    use gantry::snapshot::Snapshot;

    let known = agent_names(paths)?;
    let patterns = GlobalPatterns::default().with_extra(extra_patterns);
    let agents_rel = paths
        .agents_dir
        .strip_prefix(&paths.project_root)
        .unwrap_or(&paths.agents_dir)
        .to_string_lossy()
        .into_owned();

    // First snapshot run has no baseline to diff against: treat everything
    // as touched and write the baseline for next time.
    let mut first_run = false;
    let changed: Vec<String> = if let Some(snapshot_path) = snapshot {
        let current = Snapshot::capture(&paths.project_root)?;
        let mut diff = if snapshot_path.exists() {
            let stored = Snapshot::load(&snapshot_path)?;
            stored.diff(&current)
        } else {
            first_run = true;
            Vec::new()
        };
        current.save(&snapshot_path)?;
        // The snapshot may live inside the tree; its own churn is not a change.
        let snapshot_rel = snapshot_path
            .strip_prefix("./")
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| snapshot_path.clone());
        diff.retain(|path| Path::new(path) != snapshot_rel.as_path());
        diff
    } else if stdin {
        read_paths(std::io::stdin().lock())?
    } else {
        given
    };

    let set = if first_run {
        ChangeSet {
            agents: known.iter().cloned().collect(),
            global_escalation: true,
        }
    } else {
        select(&changed, &known, &agents_rel, &patterns)
    };

    if json {
        println!("{}", serde_json::to_string(&set)?);
    } else {
        println!("🔎 Change Detection");
        if first_run {
            println!("No snapshot baseline; treating all agents as changed");
        } else {
            println!("Changed paths: {}", changed.len());
        }
        if set.global_escalation {
            println!("⚠ Global escalation: a shared file changed");
        }
        if set.agents.is_empty() {
            println!("Agents to deploy: none");
        } else {
            let names: Vec<&str> = set.agents.iter().map(|s| s.as_str()).collect();
            println!("Agents to deploy: {}", names.join(", "));
        }
    }

    Ok(())
}

fn cmd_hooks(
    paths: &AgentPaths,
    agent: &str,
    stage: Option<&str>,
    list: bool,
    json: bool,
) -> Result<()> {
    use gantry::config::AgentConfig;
    use gantry::hooks::{run_stage, HookStage};
    use gantry::runner::SystemRunner;

    let config = AgentConfig::load(paths, agent)?;

    if list {
        if json {
            let event = serde_json::json!({
                "event": "hooks",
                "agent": agent,
                "pre_deploy": config.hooks.pre_deploy,
                "post_deploy": config.hooks.post_deploy,
            });
            println!("{}", serde_json::to_string(&event)?);
        } else {
            println!("🔧 Hooks for {agent}:");
            for stage in [HookStage::PreDeploy, HookStage::PostDeploy] {
                println!("  {}:", stage.label());
                let scripts = stage.scripts(&config);
                if scripts.is_empty() {
                    println!("    (none)");
                }
                for script in scripts {
                    println!("    - {script}");
                }
            }
        }
        return Ok(());
    }

    let stage = stage
        .and_then(HookStage::parse)
        .ok_or_else(|| anyhow::anyhow!("stage must be pre_deploy or post_deploy"))?;

    if !json {
        println!("🔧 Running {} hooks for {agent}...", stage.label());
    }

    let runs = run_stage(
        &config,
        stage,
        EnvTarget::Prod,
        &paths.agent_dir(agent),
        &SystemRunner,
    )?;

    if json {
        let scripts: Vec<&str> = runs.iter().map(|r| r.script.as_str()).collect();
        let event = serde_json::json!({
            "event": "hooks",
            "agent": agent,
            "stage": stage.label(),
            "completed": scripts,
            "success": true,
        });
        println!("{}", serde_json::to_string(&event)?);
    } else {
        for run in &runs {
            println!("  ✓ {}", run.script);
        }
        println!("✓ All {} hooks completed", stage.label());
    }

    Ok(())
}
