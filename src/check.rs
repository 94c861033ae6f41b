//! Pre-deployment validation
//!
//! Answers "would this agent deploy cleanly?" without touching the cloud:
//! the config parses, required fields are present, every `${...}`
//! placeholder resolves against the current layers, secret bindings parse,
//! the shared build inputs exist, and declared hook scripts are on disk.
//! CI runs this before any deploy so failures surface as check errors
//! instead of mid-pipeline command failures.

use std::fmt;

use serde::Serialize;

use crate::config::{self, AgentConfig, AgentPaths};
use crate::deploy;
use crate::docker::{ENTRYPOINT_FILE, REQUIREMENTS_FILE};
use crate::error::GantryError;
use crate::hooks::HookStage;
use crate::resolve;
use crate::secrets;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warning,
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let icon = match self {
            CheckStatus::Pass => "✓",
            CheckStatus::Warning => "⚠",
            CheckStatus::Error => "✗",
        };
        write!(f, "{icon}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentCheck {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

/// All check results for one agent.
#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub agent: String,
    pub checks: Vec<AgentCheck>,
}

impl CheckReport {
    fn new(agent: &str) -> Self {
        CheckReport {
            agent: agent.to_string(),
            checks: Vec::new(),
        }
    }

    fn add(&mut self, name: &str, status: CheckStatus, message: String) {
        self.checks.push(AgentCheck {
            name: name.to_string(),
            status,
            message,
        });
    }

    fn pass(&mut self, name: &str, message: String) {
        self.add(name, CheckStatus::Pass, message);
    }

    fn warn(&mut self, name: &str, message: String) {
        self.add(name, CheckStatus::Warning, message);
    }

    fn error(&mut self, name: &str, message: String) {
        self.add(name, CheckStatus::Error, message);
    }

    pub fn passes(&self) -> usize {
        self.count(CheckStatus::Pass)
    }

    pub fn warnings(&self) -> usize {
        self.count(CheckStatus::Warning)
    }

    pub fn errors(&self) -> usize {
        self.count(CheckStatus::Error)
    }

    pub fn is_success(&self) -> bool {
        self.errors() == 0
    }

    fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }
}

/// Run every offline check for one agent.
pub fn run_agent_checks(paths: &AgentPaths, name: &str) -> CheckReport {
    let mut report = CheckReport::new(name);

    let config = match AgentConfig::load_with_warnings(paths, name) {
        Ok((config, warnings)) => {
            report.pass("config", "config.yaml parsed".to_string());
            for warning in warnings {
                report.warn("config", warning.to_string());
            }
            config
        }
        Err(e) => {
            report.error("config", e.to_string());
            return report;
        }
    };

    check_target_fields(&config, &mut report);
    check_flags(paths, &config, &mut report);
    check_build_inputs(paths, &mut report);
    check_hook_scripts(paths, &config, &mut report);

    report
}

/// Check every agent under the agents root. Directories whose config fails
/// to load still get a report so CI sees the failure.
pub fn run_all_checks(paths: &AgentPaths) -> Result<Vec<CheckReport>, GantryError> {
    let listing = config::list_agents(paths)?;
    let mut reports: Vec<CheckReport> = listing
        .agents
        .iter()
        .map(|agent| run_agent_checks(paths, &agent.name))
        .collect();
    for skipped in &listing.skipped {
        let mut report = CheckReport::new(&skipped.name);
        report.error("config", skipped.reason.clone());
        reports.push(report);
    }
    reports.sort_by(|a, b| a.agent.cmp(&b.agent));
    Ok(reports)
}

/// CI deploys need an explicit project and region; locally gcloud falls
/// back to its configured defaults, so absence is a warning, not an error.
fn check_target_fields(config: &AgentConfig, report: &mut CheckReport) {
    for (field, value) in [
        ("gcp_project", &config.cloud_run.gcp_project),
        ("gcp_location", &config.cloud_run.gcp_location),
    ] {
        match value {
            Some(v) if !v.trim().is_empty() => {
                report.pass(field, format!("cloud_run.{field} set"));
            }
            _ => report.warn(
                field,
                format!("cloud_run.{field} not set; CI deploys require it"),
            ),
        }
    }
}

fn check_flags(paths: &AgentPaths, config: &AgentConfig, report: &mut CheckReport) {
    let layers = match deploy::load_layers(paths, &config.name) {
        Ok(layers) => layers,
        Err(e) => {
            report.error("layers", e.to_string());
            return;
        }
    };

    let mut to_resolve: Vec<String> = config.cloud_run.additional_flags.clone();
    to_resolve.extend(config.cloud_run.gcp_project.iter().cloned());
    to_resolve.extend(config.cloud_run.gcp_location.iter().cloned());

    let resolved = match resolve::resolve_flags(&to_resolve, &layers) {
        Ok(resolved) => {
            report.pass(
                "variables",
                format!("all placeholders resolve ({} sources)", layers.entry_count()),
            );
            resolved
        }
        Err(e) => {
            report.error("variables", e.to_string());
            return;
        }
    };

    match secrets::classify(&resolved) {
        Ok(flags) => {
            report.pass(
                "secrets",
                format!("{} secret binding(s) parsed", flags.bindings.len()),
            );
            for name in &flags.pruned {
                report.warn(
                    "secrets",
                    format!("{name} is both a plain env var and a secret binding; the binding wins"),
                );
            }
        }
        Err(e) => report.error("secrets", e.to_string()),
    }
}

fn check_build_inputs(paths: &AgentPaths, report: &mut CheckReport) {
    for shared in [ENTRYPOINT_FILE, REQUIREMENTS_FILE] {
        let path = paths.project_root.join(shared);
        if path.is_file() {
            report.pass("build", format!("{shared} present"));
        } else {
            report.error("build", format!("{shared} missing at {}", path.display()));
        }
    }
}

fn check_hook_scripts(paths: &AgentPaths, config: &AgentConfig, report: &mut CheckReport) {
    let agent_dir = paths.agent_dir(&config.name);
    let mut declared = 0;
    for stage in [HookStage::PreDeploy, HookStage::PostDeploy] {
        for script in stage.scripts(config) {
            declared += 1;
            if agent_dir.join(script).is_file() {
                report.pass("hooks", format!("{} {script} present", stage.label()));
            } else {
                report.error("hooks", format!("{} {script} missing", stage.label()));
            }
        }
    }
    if declared == 0 {
        report.pass("hooks", "no hooks declared".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture(config: &str) -> (tempfile::TempDir, AgentPaths) {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("main.py"), "print(1)\n").unwrap();
        fs::write(dir.path().join("requirements.txt"), "flask\n").unwrap();
        let agent = dir.path().join("agents").join("mailer");
        fs::create_dir_all(&agent).unwrap();
        fs::write(agent.join("config.yaml"), config).unwrap();
        let paths = AgentPaths::discover(Some(dir.path().to_path_buf()), None);
        (dir, paths)
    }

    const HEALTHY: &str = "\
cloud_run:
  service_name: mailer-service
  gcp_project: acme-prod
  gcp_location: europe-west1
  additional_flags:
    - --memory=512Mi
";

    #[test]
    fn test_healthy_agent_passes() {
        let (_dir, paths) = fixture(HEALTHY);
        let report = run_agent_checks(&paths, "mailer");
        assert!(report.is_success());
        assert_eq!(report.errors(), 0);
        assert!(report.passes() >= 5);
    }

    #[test]
    fn test_missing_config_is_single_error() {
        let (_dir, paths) = fixture(HEALTHY);
        let report = run_agent_checks(&paths, "ghost");
        assert!(!report.is_success());
        assert_eq!(report.checks.len(), 1);
        assert_eq!(report.checks[0].status, CheckStatus::Error);
    }

    #[test]
    fn test_missing_project_is_warning_not_error() {
        let (_dir, paths) = fixture("cloud_run:\n  service_name: svc\n");
        let report = run_agent_checks(&paths, "mailer");
        assert!(report.is_success());
        assert!(report.warnings() >= 2);
    }

    #[test]
    fn test_undefined_placeholder_is_error() {
        let config = "\
cloud_run:
  service_name: svc
  additional_flags:
    - --set-env-vars=KEY=${NOWHERE}
";
        let (_dir, paths) = fixture(config);
        let report = run_agent_checks(&paths, "mailer");
        assert!(!report.is_success());
        assert!(report
            .checks
            .iter()
            .any(|c| c.name == "variables" && c.status == CheckStatus::Error));
    }

    #[test]
    fn test_malformed_binding_is_error() {
        let config = "\
cloud_run:
  service_name: svc
  additional_flags:
    - --update-secrets=BROKEN
";
        let (_dir, paths) = fixture(config);
        let report = run_agent_checks(&paths, "mailer");
        assert!(report
            .checks
            .iter()
            .any(|c| c.name == "secrets" && c.status == CheckStatus::Error));
    }

    #[test]
    fn test_missing_entrypoint_is_error() {
        let (dir, paths) = fixture(HEALTHY);
        fs::remove_file(dir.path().join("main.py")).unwrap();
        let report = run_agent_checks(&paths, "mailer");
        assert!(!report.is_success());
        assert!(report
            .checks
            .iter()
            .any(|c| c.name == "build" && c.status == CheckStatus::Error));
    }

    #[test]
    fn test_missing_hook_script_is_error() {
        let config = "\
cloud_run:
  service_name: svc
hooks:
  pre_deploy:
    - lint.sh
";
        let (_dir, paths) = fixture(config);
        let report = run_agent_checks(&paths, "mailer");
        assert!(report
            .checks
            .iter()
            .any(|c| c.name == "hooks" && c.status == CheckStatus::Error));
    }

    #[test]
    fn test_run_all_includes_broken_agents() {
        let (dir, paths) = fixture(HEALTHY);
        let broken = dir.path().join("agents").join("broken");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join("config.yaml"), "cloud_run: {}\n").unwrap();

        let reports = run_all_checks(&paths).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].agent, "broken");
        assert!(!reports[0].is_success());
        assert_eq!(reports[1].agent, "mailer");
        assert!(reports[1].is_success());
    }

    #[test]
    fn test_status_icons() {
        assert_eq!(CheckStatus::Pass.to_string(), "✓");
        assert_eq!(CheckStatus::Warning.to_string(), "⚠");
        assert_eq!(CheckStatus::Error.to_string(), "✗");
    }
}
