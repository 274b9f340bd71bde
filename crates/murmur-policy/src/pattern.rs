// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use regex::Regex;
use serde_json::Value;

use crate::PolicyError;

/// Characters that may legally follow a `prefix:*` command prefix.
/// `rm:*` matches `rm -rf x` and `rm/…` but never `rmdir` — and never a bare
/// `rm` with nothing after it.
const PREFIX_SEPARATORS: [char; 7] = [' ', '\t', ';', '|', '&', '/', '-'];

/// JSON argument fields that pattern matching inspects.
pub const MATCHED_FIELDS: [&str; 5] = ["command", "file_path", "path", "url", "executable"];

/// Fields whose values are lexical paths and get `.`/`..` resolution before
/// glob matching.
const PATH_FIELDS: [&str; 2] = ["file_path", "path"];

// ── Tool patterns ─────────────────────────────────────────────────────────────

/// A compiled tool-name pattern.
///
/// Admits `*` (match anything), trailing-`*` prefix wildcards (`mcp_*`) and
/// `|` alternation (`Read|Write`).  Matching is case-sensitive and anchored.
#[derive(Debug, Clone)]
pub struct ToolPattern {
    raw: String,
    regex: Regex,
}

impl ToolPattern {
    pub fn compile(raw: &str) -> Result<Self, PolicyError> {
        if raw.is_empty() {
            return Err(PolicyError::InvalidPattern {
                pattern: raw.to_string(),
                reason: "empty tool pattern".into(),
            });
        }
        let alternatives: Vec<String> = raw.split('|').map(glob_fragment_to_regex).collect();
        let source = format!("^(?:{})$", alternatives.join("|"));
        let regex = Regex::new(&source).map_err(|e| PolicyError::InvalidPattern {
            pattern: raw.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            raw: raw.to_string(),
            regex,
        })
    }

    pub fn matches(&self, tool_name: &str) -> bool {
        self.regex.is_match(tool_name)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Convert one alternation arm: `*` matches anything, everything else is
/// literal.
fn glob_fragment_to_regex(fragment: &str) -> String {
    let mut re = String::new();
    for ch in fragment.chars() {
        match ch {
            '*' => re.push_str(".*"),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re
}

// ── Argument patterns ─────────────────────────────────────────────────────────

/// A compiled argument pattern, applied to the named JSON fields of a tool
/// invocation.
#[derive(Debug, Clone)]
pub enum ArgPattern {
    /// `prefix:*` — the value must start with `prefix` immediately followed
    /// by a separator character.
    Prefix { raw: String, prefix: String },
    /// Shell-style glob (`*`, `**`, `?`), anchored; path fields are
    /// normalized before matching.
    Glob { raw: String, regex: Regex },
    /// Anything else: exact value equality.
    Literal { raw: String },
}

impl ArgPattern {
    pub fn compile(raw: &str) -> Result<Self, PolicyError> {
        if let Some(prefix) = raw.strip_suffix(":*") {
            if prefix.is_empty() {
                return Err(PolicyError::InvalidPattern {
                    pattern: raw.to_string(),
                    reason: "empty prefix".into(),
                });
            }
            return Ok(ArgPattern::Prefix {
                raw: raw.to_string(),
                prefix: prefix.to_string(),
            });
        }
        if raw.contains('*') || raw.contains('?') {
            let regex = glob_to_regex(raw).map_err(|e| PolicyError::InvalidPattern {
                pattern: raw.to_string(),
                reason: e.to_string(),
            })?;
            return Ok(ArgPattern::Glob {
                raw: raw.to_string(),
                regex,
            });
        }
        Ok(ArgPattern::Literal {
            raw: raw.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            ArgPattern::Prefix { raw, .. }
            | ArgPattern::Glob { raw, .. }
            | ArgPattern::Literal { raw } => raw,
        }
    }

    /// Match one named field value.  Case-sensitive throughout.
    pub fn matches_field(&self, field: &str, value: &str) -> bool {
        match self {
            ArgPattern::Prefix { prefix, .. } => match value.strip_prefix(prefix.as_str()) {
                Some(rest) => rest
                    .chars()
                    .next()
                    .map(|c| PREFIX_SEPARATORS.contains(&c))
                    .unwrap_or(false),
                None => false,
            },
            ArgPattern::Glob { regex, .. } => {
                if PATH_FIELDS.contains(&field) {
                    regex.is_match(&normalize_path(value))
                } else {
                    regex.is_match(value)
                }
            }
            ArgPattern::Literal { raw } => value == raw,
        }
    }

    /// Match against the parsed JSON arguments: true when any inspected
    /// field matches.
    pub fn matches_args(&self, args: &Value) -> bool {
        let Some(obj) = args.as_object() else {
            return false;
        };
        MATCHED_FIELDS.iter().any(|field| {
            obj.get(*field)
                .and_then(Value::as_str)
                .map(|v| self.matches_field(field, v))
                .unwrap_or(false)
        })
    }

    /// Fallback for unparseable arguments: plain substring on the raw text.
    pub fn matches_raw(&self, raw_text: &str) -> bool {
        raw_text.contains(self.as_str())
    }
}

/// Convert a glob to an anchored regex: `**` crosses separators, `*` and
/// `?` stop at `/`.
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    re.push_str(".*");
                } else {
                    re.push_str("[^/]*");
                }
            }
            '?' => re.push_str("[^/]"),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re)
}

// ── Path normalization ────────────────────────────────────────────────────────

/// Lexically resolve `.` and `..` components.  Purely textual — the
/// filesystem is never consulted — and idempotent.  `..` at the root of an
/// absolute path clamps at the root, so `/var/../../etc` resolves to `/etc`.
pub fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                if let Some(last) = parts.last() {
                    if *last == ".." {
                        parts.push("..");
                    } else {
                        parts.pop();
                    }
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

// ── Canonical JSON ────────────────────────────────────────────────────────────

/// Render a JSON value with object keys sorted recursively.  Used for
/// session-memory keys and any payload that must be byte-stable.
pub fn to_canonical_json(value: &Value) -> String {
    fn canonicalize(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: std::collections::BTreeMap<_, _> =
                    map.iter().map(|(k, v)| (k.clone(), canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
            other => other.clone(),
        }
    }
    canonicalize(value).to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
