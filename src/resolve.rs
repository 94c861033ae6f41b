//! Shell-style variable substitution over environment layers
//!
//! Flags in agent configuration may reference variables as `${NAME}` or
//! `${NAME:-default}`. Resolution is a single left-to-right pass: each
//! placeholder is looked up across the passed-in [`LayerStack`] (highest rank
//! wins) and replaced; substituted values are never re-scanned, so expansion
//! cannot recurse. The resolver itself reads no process environment - every
//! source it consults arrives as an explicit layer.
//!
//! An undefined variable with no inline default is a hard error. Leaving the
//! literal `${NAME}` token in a deploy command would ship garbage to the
//! cloud API, so the agent's deployment aborts instead.

use crate::envfile::LayerStack;
use crate::error::{GantryError, GantryResult};

/// Substitute every `${NAME}` / `${NAME:-default}` placeholder in `raw`.
///
/// Strings without placeholders pass through unchanged, making resolution
/// idempotent on already-resolved input. Brace contents that are not a valid
/// identifier (alphanumeric/underscore) are left untouched.
pub fn resolve(raw: &str, layers: &LayerStack) -> GantryResult<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find('}') else {
            // Unterminated brace: not a placeholder.
            out.push_str(&rest[start..]);
            return Ok(out);
        };

        let body = &after[..end];
        match split_placeholder(body) {
            Some((name, default)) => match layers.lookup(name) {
                Some(value) => out.push_str(value),
                None => match default {
                    Some(d) => out.push_str(d),
                    None => {
                        return Err(GantryError::UndefinedVariable {
                            name: name.to_string(),
                            context: raw.to_string(),
                        })
                    }
                },
            },
            // Not an identifier (e.g. "${not valid}"): keep the literal text.
            None => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Resolve every flag string independently, preserving order.
pub fn resolve_flags(flags: &[String], layers: &LayerStack) -> GantryResult<Vec<String>> {
    flags.iter().map(|flag| resolve(flag, layers)).collect()
}

/// Split a brace body into `(name, inline_default)`.
///
/// `NAME` yields `(NAME, None)`; `NAME:-default` yields `(NAME,
/// Some(default))`, where the default may be empty. Returns `None` when the
/// name part is not a valid identifier.
fn split_placeholder(body: &str) -> Option<(&str, Option<&str>)> {
    let (name, default) = match body.find(":-") {
        Some(idx) => (&body[..idx], Some(&body[idx + 2..])),
        None => (body, None),
    };
    if is_identifier(name) {
        Some((name, default))
    } else {
        None
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
