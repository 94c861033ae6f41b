//! Dockerfile rendering and build-context staging
//!
//! Every agent is built from the shared template (project-root
//! `Dockerfile.template` when present, the built-in default otherwise) with
//! three extension points: the `{{AGENT_NAME}}` placeholder, a
//! `# gantry:system-packages` marker line that expands to an apt install
//! layer, and a `# gantry:extra-steps` marker line that expands to the raw
//! `docker.extra_steps` lines. The build context is staged into a temp
//! directory so the checkout itself is never the source argument; `.env*`
//! files never enter the context, and the agent's `.dockerignore` is honored
//! with gitignore semantics.

use std::fs;
use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tempfile::TempDir;

use crate::config::{AgentConfig, AgentPaths};
use crate::error::{GantryError, GantryResult};

/// Shared service entrypoint copied into every build context
pub const ENTRYPOINT_FILE: &str = "main.py";

/// Shared dependency manifest copied into every build context
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Optional template override at the project root
pub const TEMPLATE_FILE: &str = "Dockerfile.template";

const AGENT_NAME_PLACEHOLDER: &str = "{{AGENT_NAME}}";
const SYSTEM_PACKAGES_MARKER: &str = "# gantry:system-packages";
const EXTRA_STEPS_MARKER: &str = "# gantry:extra-steps";

/// Built-in template used when the project has no Dockerfile.template.
pub const DEFAULT_TEMPLATE: &str = "\
FROM python:3.12-slim

WORKDIR /app

# gantry:system-packages

COPY requirements.txt .
RUN pip install --no-cache-dir -r requirements.txt

COPY main.py .
COPY agent/ ./agent/

# gantry:extra-steps

ENV AGENT_NAME={{AGENT_NAME}}
ENV PORT=8080

CMD [\"python\", \"main.py\"]
";

/// Load the project's template, falling back to the built-in default.
pub fn load_template(paths: &AgentPaths) -> GantryResult<String> {
    let path = paths.project_root.join(TEMPLATE_FILE);
    match fs::read_to_string(&path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DEFAULT_TEMPLATE.to_string()),
        Err(e) => Err(e.into()),
    }
}

/// Render the Dockerfile for one agent. Pure string work; markers with
/// nothing to say are removed, not left behind.
pub fn render_dockerfile(config: &AgentConfig, template: &str) -> String {
    let mut lines: Vec<String> = Vec::new();

    for line in template.lines() {
        if line.trim() == SYSTEM_PACKAGES_MARKER {
            if !config.docker.system_packages.is_empty() {
                lines.push(apt_install_layer(&config.docker.system_packages));
            }
        } else if line.trim() == EXTRA_STEPS_MARKER {
            for step in &config.docker.extra_steps {
                lines.push(step.clone());
            }
        } else if line.starts_with("FROM ") {
            match &config.docker.base_image {
                Some(image) => lines.push(format!("FROM {image}")),
                None => lines.push(line.to_string()),
            }
        } else {
            lines.push(line.to_string());
        }
    }

    let mut rendered = lines.join("\n");
    rendered.push('\n');
    rendered.replace(AGENT_NAME_PLACEHOLDER, &config.name)
}

fn apt_install_layer(packages: &[String]) -> String {
    format!(
        "RUN apt-get update && apt-get install -y --no-install-recommends {} \\\n    && rm -rf /var/lib/apt/lists/*",
        packages.join(" ")
    )
}

/// A staged build context. Dropping it removes the directory.
#[derive(Debug)]
pub struct StagedBuild {
    dir: TempDir,
    /// Paths relative to the context root, sorted
    pub files: Vec<PathBuf>,
}

impl StagedBuild {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Stage the build context for one agent: shared entrypoint, shared
/// requirements, the agent directory under `agent/`, and the rendered
/// Dockerfile.
pub fn stage_build_context(paths: &AgentPaths, config: &AgentConfig) -> GantryResult<StagedBuild> {
    let dir = TempDir::new()?;
    let mut files: Vec<PathBuf> = Vec::new();

    for shared in [ENTRYPOINT_FILE, REQUIREMENTS_FILE] {
        let src = paths.project_root.join(shared);
        if !src.is_file() {
            return Err(GantryError::MissingBuildInput {
                agent: config.name.clone(),
                path: src,
            });
        }
        fs::copy(&src, dir.path().join(shared))?;
        files.push(PathBuf::from(shared));
    }

    let agent_src = paths.agent_dir(&config.name);
    if !agent_src.is_dir() {
        return Err(GantryError::MissingBuildInput {
            agent: config.name.clone(),
            path: agent_src,
        });
    }
    let ignore = load_dockerignore(&config.name, &agent_src)?;
    let agent_dst = dir.path().join("agent");
    fs::create_dir(&agent_dst)?;
    copy_agent_tree(
        &agent_src,
        &agent_dst,
        ignore.as_ref(),
        Path::new("agent"),
        &mut files,
    )?;

    let template = load_template(paths)?;
    fs::write(dir.path().join("Dockerfile"), render_dockerfile(config, &template))?;
    files.push(PathBuf::from("Dockerfile"));

    files.sort();
    Ok(StagedBuild { dir, files })
}

/// Parse the agent's .dockerignore into gitignore-semantics patterns.
fn load_dockerignore(agent: &str, agent_dir: &Path) -> GantryResult<Option<Gitignore>> {
    let path = agent_dir.join(".dockerignore");
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut builder = GitignoreBuilder::new(agent_dir);
    for line in content.lines() {
        builder
            .add_line(None, line)
            .map_err(|e| GantryError::SchemaViolation {
                agent: agent.to_string(),
                reason: format!("invalid .dockerignore pattern '{line}': {e}"),
            })?;
    }
    let ignore = builder.build().map_err(|e| GantryError::SchemaViolation {
        agent: agent.to_string(),
        reason: format!("invalid .dockerignore: {e}"),
    })?;
    Ok(Some(ignore))
}

fn copy_agent_tree(
    src: &Path,
    dst: &Path,
    ignore: Option<&Gitignore>,
    rel: &Path,
    files: &mut Vec<PathBuf>,
) -> GantryResult<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        let src_path = entry.path();
        let is_dir = entry.file_type()?.is_dir();

        // Secrets never enter a build context, regardless of ignore rules.
        if !is_dir && (name.starts_with(".env") || name == ".dockerignore") {
            continue;
        }
        if let Some(ignore) = ignore {
            if ignore.matched(&src_path, is_dir).is_ignore() {
                continue;
            }
        }

        let dst_path = dst.join(&name);
        let rel_path = rel.join(&name);
        if is_dir {
            fs::create_dir(&dst_path)?;
            copy_agent_tree(&src_path, &dst_path, ignore, &rel_path, files)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
            files.push(rel_path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DockerSection;

    fn config_named(name: &str, docker: DockerSection) -> AgentConfig {
        AgentConfig {
            name: name.to_string(),
            docker,
            cloud_run: crate::config::CloudRunSection {
                service_name: format!("{name}-service"),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_render_substitutes_agent_name() {
        let config = config_named("email-agent", DockerSection::default());
        let rendered = render_dockerfile(&config, DEFAULT_TEMPLATE);
        assert!(rendered.contains("ENV AGENT_NAME=email-agent"));
        assert!(!rendered.contains(AGENT_NAME_PLACEHOLDER));
    }

    #[test]
    fn test_render_expands_system_packages() {
        let config = config_named(
            "a",
            DockerSection {
                system_packages: vec!["libpq-dev".into(), "curl".into()],
                ..Default::default()
            },
        );
        let rendered = render_dockerfile(&config, DEFAULT_TEMPLATE);
        assert!(rendered.contains("apt-get install -y --no-install-recommends libpq-dev curl"));
        assert!(!rendered.contains(SYSTEM_PACKAGES_MARKER));
    }

    #[test]
    fn test_render_removes_empty_markers() {
        let config = config_named("a", DockerSection::default());
        let rendered = render_dockerfile(&config, DEFAULT_TEMPLATE);
        assert!(!rendered.contains(SYSTEM_PACKAGES_MARKER));
        assert!(!rendered.contains(EXTRA_STEPS_MARKER));
        assert!(!rendered.contains("apt-get"));
    }

    #[test]
    fn test_render_splices_extra_steps() {
        let config = config_named(
            "a",
            DockerSection {
                extra_steps: vec![
                    "RUN mkdir -p /data".into(),
                    "ENV CACHE_DIR=/data".into(),
                ],
                ..Default::default()
            },
        );
        let rendered = render_dockerfile(&config, DEFAULT_TEMPLATE);
        assert!(rendered.contains("RUN mkdir -p /data\nENV CACHE_DIR=/data"));
    }

    #[test]
    fn test_render_overrides_base_image() {
        let config = config_named(
            "a",
            DockerSection {
                base_image: Some("python:3.11-bookworm".into()),
                ..Default::default()
            },
        );
        let rendered = render_dockerfile(&config, DEFAULT_TEMPLATE);
        assert!(rendered.starts_with("FROM python:3.11-bookworm\n"));
        assert!(!rendered.contains("python:3.12-slim"));
    }

    fn project_for_staging(name: &str) -> (tempfile::TempDir, AgentPaths) {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = AgentPaths::discover(Some(dir.path().to_path_buf()), None);
        fs::write(dir.path().join(ENTRYPOINT_FILE), "print('serve')\n").unwrap();
        fs::write(dir.path().join(REQUIREMENTS_FILE), "flask\n").unwrap();
        let agent_dir = paths.agent_dir(name);
        fs::create_dir_all(agent_dir.join("prompts")).unwrap();
        fs::write(agent_dir.join("handler.py"), "def handle(): pass\n").unwrap();
        fs::write(agent_dir.join("prompts/system.txt"), "be helpful\n").unwrap();
        fs::write(agent_dir.join("config.yaml"), "cloud_run:\n  service_name: s\n").unwrap();
        (dir, paths)
    }

    #[test]
    fn test_stage_copies_shared_and_agent_files() {
        let (_dir, paths) = project_for_staging("email-agent");
        let config = config_named("email-agent", DockerSection::default());
        let staged = stage_build_context(&paths, &config).unwrap();

        assert!(staged.path().join("main.py").is_file());
        assert!(staged.path().join("requirements.txt").is_file());
        assert!(staged.path().join("Dockerfile").is_file());
        assert!(staged.path().join("agent/handler.py").is_file());
        assert!(staged.path().join("agent/prompts/system.txt").is_file());
        assert!(staged.files.contains(&PathBuf::from("agent/handler.py")));
        let mut sorted = staged.files.clone();
        sorted.sort();
        assert_eq!(staged.files, sorted);
    }

    #[test]
    fn test_stage_excludes_env_files_and_dockerignore_matches() {
        let (_dir, paths) = project_for_staging("email-agent");
        let agent_dir = paths.agent_dir("email-agent");
        fs::write(agent_dir.join(".env.secrets"), "KEY=value\n").unwrap();
        fs::write(agent_dir.join("debug.log"), "noise\n").unwrap();
        fs::write(agent_dir.join(".dockerignore"), "*.log\n").unwrap();

        let config = config_named("email-agent", DockerSection::default());
        let staged = stage_build_context(&paths, &config).unwrap();

        assert!(!staged.path().join("agent/.env.secrets").exists());
        assert!(!staged.path().join("agent/debug.log").exists());
        assert!(!staged.path().join("agent/.dockerignore").exists());
        assert!(staged.path().join("agent/handler.py").is_file());
    }

    #[test]
    fn test_stage_missing_entrypoint_is_typed_error() {
        let (dir, paths) = project_for_staging("email-agent");
        fs::remove_file(dir.path().join(ENTRYPOINT_FILE)).unwrap();
        let config = config_named("email-agent", DockerSection::default());
        let err = stage_build_context(&paths, &config).unwrap_err();
        assert!(matches!(err, GantryError::MissingBuildInput { ref agent, .. }
            if agent == "email-agent"));
    }

    #[test]
    fn test_stage_uses_template_override() {
        let (dir, paths) = project_for_staging("email-agent");
        fs::write(
            dir.path().join(TEMPLATE_FILE),
            "FROM scratch\n# gantry:extra-steps\nLABEL agent={{AGENT_NAME}}\n",
        )
        .unwrap();
        let config = config_named("email-agent", DockerSection::default());
        let staged = stage_build_context(&paths, &config).unwrap();
        let dockerfile = fs::read_to_string(staged.path().join("Dockerfile")).unwrap();
        assert!(dockerfile.starts_with("FROM scratch\n"));
        assert!(dockerfile.contains("LABEL agent=email-agent"));
    }
}
