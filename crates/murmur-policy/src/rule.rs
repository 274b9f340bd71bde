// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::fmt;

use serde_json::Value;

use crate::pattern::{ArgPattern, ToolPattern};
use crate::PolicyError;

/// What a matching rule decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Allow,
    Deny,
    /// Deny that no later scope, override, mode, or delegate can relax.
    FinalDeny,
    /// Allow that bypasses deny rules (but never final-deny).
    Override,
    /// Force the approval flow even when an allow rule would match.
    Ask,
}

/// One permission rule: a tool pattern plus an optional argument pattern.
///
/// Textual form `Tool(arg_pattern)` or bare `Tool`; round-trips through
/// `Display`.
#[derive(Debug, Clone)]
pub struct PermissionRule {
    pub kind: RuleKind,
    tool: ToolPattern,
    arg: Option<ArgPattern>,
}

impl PermissionRule {
    /// Parse `Tool(arg)` or `Tool`.  Patterns are compiled here, at config
    /// build time; a malformed pattern fails the parse, never a later check.
    pub fn parse(kind: RuleKind, text: &str) -> Result<Self, PolicyError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PolicyError::InvalidRule(text.to_string()));
        }
        let (tool_part, arg_part) = match text.find('(') {
            Some(open) => {
                if !text.ends_with(')') {
                    return Err(PolicyError::InvalidRule(text.to_string()));
                }
                let inner = &text[open + 1..text.len() - 1];
                if inner.is_empty() {
                    return Err(PolicyError::InvalidRule(text.to_string()));
                }
                (&text[..open], Some(inner))
            }
            None => (text, None),
        };
        Ok(Self {
            kind,
            tool: ToolPattern::compile(tool_part)?,
            arg: arg_part.map(ArgPattern::compile).transpose()?,
        })
    }

    /// Whether the rule matches a `(tool, arguments)` pair.
    ///
    /// `args` is the parsed argument object when the raw text was valid
    /// JSON.  When parsing failed, the argument pattern falls back to a
    /// plain substring match on the raw text.
    pub fn matches(&self, tool_name: &str, args: Option<&Value>, raw_args: &str) -> bool {
        if !self.tool.matches(tool_name) {
            return false;
        }
        match &self.arg {
            None => true,
            Some(pattern) => match args {
                Some(parsed) => pattern.matches_args(parsed),
                None => pattern.matches_raw(raw_args),
            },
        }
    }
}

impl fmt::Display for PermissionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            Some(arg) => write!(f, "{}({})", self.tool.as_str(), arg.as_str()),
            None => write!(f, "{}", self.tool.as_str()),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
