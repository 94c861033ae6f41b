//! Common test utilities for Gantry CLI tests.
//!
//! `Project` builds an isolated agents repository in a temp directory and
//! runs the compiled gantry binary against it. `with_fake_gcloud` puts a
//! recording shim first on PATH so execute-mode tests never need a real
//! Cloud SDK.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// Result of running one gantry invocation
#[derive(Debug)]
pub struct RunResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// A minimal agents repository: shared entrypoint, requirements, and `.env`.
pub struct Project {
    root: TempDir,
    shim_dir: Option<PathBuf>,
}

impl Project {
    pub fn new() -> Self {
        let root = TempDir::new().expect("Failed to create project temp dir");
        fs::write(root.path().join("main.py"), "print('serve')\n").unwrap();
        fs::write(root.path().join("requirements.txt"), "flask\n").unwrap();
        fs::write(root.path().join(".env"), "").unwrap();
        Project {
            root,
            shim_dir: None,
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Write a file relative to the project root, creating parents.
    pub fn write(&self, relative: &str, content: &str) {
        let full = self.root.path().join(relative);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).expect("Failed to create directories");
        }
        fs::write(&full, content).expect("Failed to write file");
    }

    /// Create `agents/<name>/config.yaml` with the given content.
    pub fn add_agent(&self, name: &str, config: &str) {
        self.write(&format!("agents/{name}/config.yaml"), config);
    }

    /// Install a `gcloud` shim that records each invocation's arguments to
    /// `gcloud-calls.log` and exits 0.
    #[cfg(unix)]
    pub fn with_fake_gcloud(mut self) -> Self {
        use std::os::unix::fs::PermissionsExt;

        let bin = self.root.path().join("test-bin");
        fs::create_dir_all(&bin).unwrap();
        let log = self.root.path().join("gcloud-calls.log");
        let shim = bin.join("gcloud");
        fs::write(&shim, format!("#!/bin/sh\necho \"$@\" >> \"{}\"\n", log.display())).unwrap();
        fs::set_permissions(&shim, fs::Permissions::from_mode(0o755)).unwrap();
        self.shim_dir = Some(bin);
        self
    }

    /// One line per recorded shim invocation.
    #[cfg(unix)]
    pub fn gcloud_calls(&self) -> Vec<String> {
        let log = self.root.path().join("gcloud-calls.log");
        if !log.exists() {
            return Vec::new();
        }
        fs::read_to_string(&log)
            .unwrap()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }

    /// Run gantry from the project root.
    pub fn run(&self, args: &[&str]) -> RunResult {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_gantry"));
        cmd.current_dir(self.root.path()).args(args);

        if let Some(shim) = &self.shim_dir {
            let mut paths = vec![shim.clone()];
            paths.extend(std::env::split_paths(
                &std::env::var_os("PATH").unwrap_or_default(),
            ));
            cmd.env("PATH", std::env::join_paths(paths).unwrap());
        }

        let output = cmd.output().expect("Failed to execute gantry");
        RunResult {
            success: output.status.success(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }

    /// Run gantry with extra environment variables set.
    pub fn run_with_env(&self, args: &[&str], env_vars: &[(&str, &str)]) -> RunResult {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_gantry"));
        cmd.current_dir(self.root.path()).args(args);
        for (key, value) in env_vars {
            cmd.env(key, value);
        }
        let output = cmd.output().expect("Failed to execute gantry");
        RunResult {
            success: output.status.success(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}

/// Agent config with no substitutions or secrets.
pub const PLAIN_CONFIG: &str = "\
description: Plain agent
cloud_run:
  service_name: plain-service
  gcp_project: acme-prod
  gcp_location: us-central1
";

/// Agent config exercising env layering and a secret binding.
pub const SECRET_CONFIG: &str = "\
description: Outbound email agent
cloud_run:
  service_name: mailer-service
  gcp_project: ${GCP_PROJECT}
  gcp_location: europe-west1
  additional_flags:
    - --memory=512Mi
    - --set-env-vars=MODE=${MODE:-live}
    - --update-secrets=SMTP_KEY=smtp-key:2
";
