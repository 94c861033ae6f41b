//! External process execution
//!
//! [`CommandRunner`] is the seam between synthesized [`CommandSpec`] values
//! and the operating system. Production code uses [`SystemRunner`]; unit
//! tests substitute the scripted runner from [`testing`]. Output is always
//! captured whole so concurrent deployments never interleave mid-line and
//! failures can carry their stderr.

use std::process::Command;

use crate::command::CommandSpec;
use crate::error::{GantryError, GantryResult};

/// Captured result of one external command.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Runs fully-specified external commands.
pub trait CommandRunner: Send + Sync {
    /// Run to completion, capturing output. A non-zero exit is not an error
    /// at this layer - callers decide what a failure means for their unit.
    fn run(&self, spec: &CommandSpec) -> GantryResult<RunOutput>;

    /// Run and require exit code zero. The error carries the exact rendered
    /// command and captured stderr for reproduction.
    fn run_checked(&self, spec: &CommandSpec) -> GantryResult<RunOutput> {
        let output = self.run(spec)?;
        if output.success() {
            Ok(output)
        } else {
            Err(GantryError::CommandFailed {
                program: spec.render_line(),
                code: output.code,
                stderr: output.stderr.trim_end().to_string(),
            })
        }
    }
}

/// Production runner backed by `std::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> GantryResult<RunOutput> {
        let mut command = Command::new(spec.program());
        command.args(spec.args());
        for (key, value) in spec.env() {
            command.env(key, value);
        }
        if let Some(cwd) = spec.cwd() {
            command.current_dir(cwd);
        }

        let output = command.output().map_err(|e| GantryError::CommandSpawn {
            program: spec.program().to_string(),
            source: e,
        })?;

        Ok(RunOutput {
            // None means killed by signal; fold it into a non-zero code.
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
