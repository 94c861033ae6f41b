//! Secret-manager binding parsing and flag classification
//!
//! Agents declare secret bindings inside `cloud_run.additional_flags` using
//! the gcloud syntax `--update-secrets=ENV_VAR=SECRET_NAME:VERSION`, with
//! comma-separated multi-bindings allowed in one flag. After variable
//! resolution the flags are classified: binding flags become structured
//! [`SecretBinding`] values and everything else stays a plain flag. Env var
//! names that are secret-bound are pruned from literal env-setting flags so
//! a name is never passed simultaneously as a plain value and as a secret
//! reference.
//!
//! Only names and versions ever appear here. Secret *values* live in the
//! cloud secret manager and are never fetched by this tool.

use std::fmt;

use crate::error::{GantryError, GantryResult};

/// Default secret version when a binding omits `:VERSION`.
pub const DEFAULT_SECRET_VERSION: &str = "latest";

const UPDATE_SECRETS_PREFIX: &str = "--update-secrets=";

/// Flag families that mutate the deployed service's environment or secrets.
/// CodeOnly deployments must not carry any of these.
const ENV_MUTATING_FLAGS: &[&str] = &[
    "--set-env-vars",
    "--update-env-vars",
    "--remove-env-vars",
    "--clear-env-vars",
    "--env-vars-file",
    "--update-secrets",
    "--set-secrets",
    "--remove-secrets",
    "--clear-secrets",
];

/// Literal env-setting flags whose `KEY=VALUE` pairs can collide with
/// secret bindings.
const LITERAL_ENV_FLAGS: &[&str] = &["--set-env-vars", "--update-env-vars"];

/// One `ENV_VAR=SECRET_NAME:VERSION` binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretBinding {
    pub env_var: String,
    pub secret: String,
    pub version: String,
}

impl SecretBinding {
    /// Parse a single binding fragment. Strict: exactly one `=`, at most one
    /// `:`, no empty parts. A missing `:VERSION` selects
    /// [`DEFAULT_SECRET_VERSION`].
    pub fn parse(fragment: &str) -> GantryResult<Self> {
        let malformed = |reason: &str| GantryError::MalformedSecretBinding {
            fragment: fragment.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = strip_quotes(fragment.trim());
        let parts: Vec<&str> = trimmed.split('=').collect();
        if parts.len() != 2 {
            return Err(malformed(
                "expected exactly one '=' separating env var from secret reference",
            ));
        }
        let (env_var, secret_ref) = (parts[0], parts[1]);
        if !is_env_var_name(env_var) {
            return Err(malformed("env var name must be alphanumeric/underscore"));
        }
        if secret_ref.is_empty() {
            return Err(malformed("secret reference is empty"));
        }

        let ref_parts: Vec<&str> = secret_ref.split(':').collect();
        let (secret, version) = match ref_parts.as_slice() {
            [secret] => (*secret, DEFAULT_SECRET_VERSION),
            [secret, version] => (*secret, *version),
            _ => {
                return Err(malformed(
                    "expected at most one ':' separating secret name from version",
                ))
            }
        };
        if secret.is_empty() {
            return Err(malformed("secret name is empty"));
        }
        if version.is_empty() {
            return Err(malformed("secret version is empty"));
        }

        Ok(SecretBinding {
            env_var: env_var.to_string(),
            secret: secret.to_string(),
            version: version.to_string(),
        })
    }
}

impl fmt::Display for SecretBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}:{}", self.env_var, self.secret, self.version)
    }
}

/// Result of splitting resolved flags into plain flags and secret bindings.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedFlags {
    /// Non-binding flags, original order, with secret-bound env var names
    /// pruned out of literal env-setting flags.
    pub plain: Vec<String>,
    /// All bindings, in declaration order.
    pub bindings: Vec<SecretBinding>,
    /// Env var names that were pruned from literal env flags because a
    /// binding claims them; callers surface these as warnings.
    pub pruned: Vec<String>,
}

/// Classify resolved `additional_flags`.
pub fn classify(flags: &[String]) -> GantryResult<ClassifiedFlags> {
    let mut plain: Vec<String> = Vec::new();
    let mut bindings: Vec<SecretBinding> = Vec::new();

    for flag in flags {
        let trimmed = strip_quotes(flag.trim());
        if let Some(rest) = trimmed.strip_prefix(UPDATE_SECRETS_PREFIX) {
            for fragment in rest.split(',') {
                bindings.push(SecretBinding::parse(fragment)?);
            }
        } else {
            plain.push(trimmed.to_string());
        }
    }

    let mut pruned = Vec::new();
    if !bindings.is_empty() {
        plain = prune_bound_env_vars(plain, &bindings, &mut pruned);
    }

    Ok(ClassifiedFlags {
        plain,
        bindings,
        pruned,
    })
}

/// True when a flag would mutate the service's env vars or secrets.
pub fn is_env_mutating_flag(flag: &str) -> bool {
    ENV_MUTATING_FLAGS
        .iter()
        .any(|name| flag == *name || flag.starts_with(&format!("{name}=")))
}

/// Drop `KEY=VALUE` pairs from literal env flags when `KEY` is secret-bound.
/// A flag left with no pairs is dropped entirely.
fn prune_bound_env_vars(
    plain: Vec<String>,
    bindings: &[SecretBinding],
    pruned: &mut Vec<String>,
) -> Vec<String> {
    let bound = |key: &str| bindings.iter().any(|b| b.env_var == key);

    plain
        .into_iter()
        .filter_map(|flag| {
            let Some((name, pairs)) = split_literal_env_flag(&flag) else {
                return Some(flag);
            };
            let kept: Vec<&str> = pairs
                .split(',')
                .filter(|pair| {
                    let key = pair.split('=').next().unwrap_or(pair);
                    if bound(key) {
                        pruned.push(key.to_string());
                        false
                    } else {
                        true
                    }
                })
                .collect();
            if kept.is_empty() {
                None
            } else {
                Some(format!("{name}={}", kept.join(",")))
            }
        })
        .collect()
}

fn split_literal_env_flag(flag: &str) -> Option<(&str, &str)> {
    LITERAL_ENV_FLAGS.iter().find_map(|name| {
        flag.strip_prefix(name)
            .and_then(|rest| rest.strip_prefix('='))
            .map(|pairs| (*name, pairs))
    })
}

fn is_env_var_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Strip one level of matching single or double quotes. Config authors often
/// quote whole flags in YAML.
fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}
