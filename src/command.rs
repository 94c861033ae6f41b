//! Deployment command synthesis
//!
//! Builds the gcloud invocation for one agent as a structured token list
//! ([`CommandSpec`]). Tokens are only ever serialized to a single string at
//! the process boundary or for display; nothing here concatenates command
//! text early, so quoting bugs cannot leak into execution.
//!
//! The deployment mode is three independent axes: scope (full vs code-only),
//! run mode (execute vs dry-run), and environment target (prod/dev/stag,
//! which prefixes the service name). A spec is built fresh per agent per
//! invocation and never reused across agents.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::{AgentConfig, SecretsStrategy};
use crate::secrets::{is_env_mutating_flag, ClassifiedFlags, SecretBinding};

/// The external deployment tool
pub const GCLOUD: &str = "gcloud";

/// Which parts of remote state a deploy reconciles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployScope {
    /// Reconcile code, env vars, and secrets with declared config
    Full,
    /// Update only the deployed code; leave remote env/secrets untouched
    CodeOnly,
}

/// Execute the command or render it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    Execute,
    DryRun,
}

/// Target environment; determines the service name prefix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvTarget {
    #[default]
    Prod,
    Dev,
    Stag,
}

impl EnvTarget {
    /// Service name prefix for this target
    pub fn prefix(&self) -> &'static str {
        match self {
            EnvTarget::Prod => "",
            EnvTarget::Dev => "dev-",
            EnvTarget::Stag => "stag-",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EnvTarget::Prod => "prod",
            EnvTarget::Dev => "dev",
            EnvTarget::Stag => "stag",
        }
    }
}

/// One deployment's position on all three axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeploymentMode {
    pub scope: DeployScope,
    pub run: RunMode,
    pub target: EnvTarget,
}

impl DeploymentMode {
    pub fn is_dry_run(&self) -> bool {
        self.run == RunMode::DryRun
    }

    /// Short human form, e.g. "full deploy to dev"
    pub fn summary(&self) -> String {
        let scope = match self.scope {
            DeployScope::Full => "full",
            DeployScope::CodeOnly => "code-only",
        };
        let suffix = match self.run {
            RunMode::Execute => "deploy",
            RunMode::DryRun => "dry-run",
        };
        format!("{scope} {suffix} to {}", self.target.label())
    }
}

/// An external command, fully specified and immutable once built.
///
/// `env` entries are exported into the spawned process only - they never
/// reach the deployed container. `cwd` is the staged build context when one
/// exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        CommandSpec {
            program: program.into(),
            args,
            env: Vec::new(),
            cwd: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = Some(cwd);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn cwd(&self) -> Option<&PathBuf> {
        self.cwd.as_ref()
    }

    /// Single-line shell form, for error messages and verbose output.
    /// Binding tokens carry secret names and versions, never values.
    pub fn render_line(&self) -> String {
        let mut parts = vec![shell_quote(&self.program)];
        parts.extend(self.args.iter().map(|a| shell_quote(a)));
        parts.join(" ")
    }

    /// Multi-line dry-run form with ` \` continuations. Secret binding flags
    /// are rendered as `ENV=<secret:version>` references.
    pub fn preview(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        let mut current = self.program.clone();

        for arg in &self.args {
            let shown = mask_secret_token(arg);
            if shown.starts_with("--") {
                lines.push(current);
                current = format!("    {}", shell_quote(&shown));
            } else {
                current.push(' ');
                current.push_str(&shell_quote(&shown));
            }
        }
        lines.push(current);
        lines.join(" \\\n")
    }
}

/// Build the deploy command for one agent from its resolved, classified
/// flags. Region and project must already be resolved strings. All fallible
/// work (resolution, classification) happens before this point; synthesis
/// either produces the whole command or is never reached.
pub fn synthesize(
    config: &AgentConfig,
    region: Option<&str>,
    project: Option<&str>,
    flags: &ClassifiedFlags,
    mode: &DeploymentMode,
) -> CommandSpec {
    let service = format!("{}{}", mode.target.prefix(), config.cloud_run.service_name);

    let mut args: Vec<String> = vec![
        "run".into(),
        "deploy".into(),
        service,
        "--source".into(),
        ".".into(),
    ];
    if let Some(region) = region {
        args.push("--region".into());
        args.push(region.to_string());
    }
    if let Some(project) = project {
        args.push("--project".into());
        args.push(project.to_string());
    }

    match mode.scope {
        DeployScope::Full => {
            args.extend(flags.plain.iter().cloned());
            args.extend(secret_args(
                &flags.bindings,
                config.cloud_run.secrets_strategy,
            ));
        }
        DeployScope::CodeOnly => {
            // Resource/scaling/networking flags only; nothing that would
            // touch the service's env vars or secrets.
            args.extend(
                flags
                    .plain
                    .iter()
                    .filter(|flag| !is_env_mutating_flag(flag))
                    .cloned(),
            );
        }
    }

    CommandSpec::new(GCLOUD, args).with_env("CLOUDSDK_CORE_DISABLE_PROMPTS", "1")
}

/// Build the service deletion command for one agent.
pub fn delete_command(
    config: &AgentConfig,
    region: Option<&str>,
    project: Option<&str>,
    target: EnvTarget,
) -> CommandSpec {
    let service = format!("{}{}", target.prefix(), config.cloud_run.service_name);
    let mut args: Vec<String> = vec!["run".into(), "services".into(), "delete".into(), service];
    if let Some(region) = region {
        args.push("--region".into());
        args.push(region.to_string());
    }
    if let Some(project) = project {
        args.push("--project".into());
        args.push(project.to_string());
    }
    args.push("--quiet".into());
    CommandSpec::new(GCLOUD, args).with_env("CLOUDSDK_CORE_DISABLE_PROMPTS", "1")
}

/// Secret flags for Full mode. Clear-then-set reconciles the service to
/// exactly the declared bindings; the clear flag precedes the set flag so no
/// orphaned binding survives. Additive merges without clearing.
fn secret_args(bindings: &[SecretBinding], strategy: SecretsStrategy) -> Vec<String> {
    let joined = || {
        bindings
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(",")
    };
    match strategy {
        SecretsStrategy::ClearThenSet => {
            let mut args = vec!["--clear-secrets".to_string()];
            if !bindings.is_empty() {
                args.push(format!("--set-secrets={}", joined()));
            }
            args
        }
        SecretsStrategy::Additive => {
            if bindings.is_empty() {
                Vec::new()
            } else {
                vec![format!("--update-secrets={}", joined())]
            }
        }
    }
}

/// Rewrite a secret flag token for display: each binding becomes
/// `ENV=<secret:version>`. Non-secret tokens pass through.
fn mask_secret_token(token: &str) -> String {
    for prefix in ["--set-secrets=", "--update-secrets="] {
        if let Some(rest) = token.strip_prefix(prefix) {
            let masked: Vec<String> = rest
                .split(',')
                .map(|fragment| match SecretBinding::parse(fragment) {
                    Ok(b) => format!("{}=<{}:{}>", b.env_var, b.secret, b.version),
                    Err(_) => "<unparsed-binding>".to_string(),
                })
                .collect();
            return format!("{prefix}{}", masked.join(","));
        }
    }
    token.to_string()
}

/// Quote a token for shell display when it contains anything outside the
/// safe set. Execution never goes through a shell; this is display only.
fn shell_quote(token: &str) -> String {
    let safe = |c: char| {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '=' | '.' | '/' | ':' | ',' | '@' | '<' | '>' | '$' | '{' | '}')
    };
    if !token.is_empty() && token.chars().all(safe) {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', r"'\''"))
    }
}
