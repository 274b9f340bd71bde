// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use crate::rule::{PermissionRule, RuleKind};
use crate::PolicyError;

/// What to do when no rule, mode, or delegate produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultAction {
    Allow,
    Deny,
    Ask,
}

/// The effective permission configuration for one scope.
///
/// Scopes nest: a child scope's configuration is merged over its parent's
/// with [`PermissionConfiguration::merge`], and the merged result is
/// materialized once at scope entry — checks never re-walk the scope chain.
#[derive(Debug, Clone, Default)]
pub struct PermissionConfiguration {
    pub allow: Vec<PermissionRule>,
    pub deny: Vec<PermissionRule>,
    pub final_deny: Vec<PermissionRule>,
    pub overrides: Vec<PermissionRule>,
    /// Rules that force the approval flow even when an allow rule would
    /// otherwise match.
    pub ask: Vec<PermissionRule>,
    pub default_action: Option<DefaultAction>,
    pub enable_session_memory: bool,
}

impl PermissionConfiguration {
    /// Builder-style helpers; patterns compile here and surface errors
    /// immediately.
    pub fn allow_rule(mut self, text: &str) -> Result<Self, PolicyError> {
        self.allow.push(PermissionRule::parse(RuleKind::Allow, text)?);
        Ok(self)
    }

    pub fn deny_rule(mut self, text: &str) -> Result<Self, PolicyError> {
        self.deny.push(PermissionRule::parse(RuleKind::Deny, text)?);
        Ok(self)
    }

    pub fn final_deny_rule(mut self, text: &str) -> Result<Self, PolicyError> {
        self.final_deny
            .push(PermissionRule::parse(RuleKind::FinalDeny, text)?);
        Ok(self)
    }

    pub fn override_rule(mut self, text: &str) -> Result<Self, PolicyError> {
        self.overrides
            .push(PermissionRule::parse(RuleKind::Override, text)?);
        Ok(self)
    }

    pub fn ask_rule(mut self, text: &str) -> Result<Self, PolicyError> {
        self.ask.push(PermissionRule::parse(RuleKind::Ask, text)?);
        Ok(self)
    }

    pub fn with_default_action(mut self, action: DefaultAction) -> Self {
        self.default_action = Some(action);
        self
    }

    pub fn with_session_memory(mut self) -> Self {
        self.enable_session_memory = true;
        self
    }

    /// Merge an inner (more specific) scope over `self`.
    ///
    /// Inner rules are prepended so they are consulted first; the inner
    /// default action replaces the outer one when set; `final_deny` only
    /// ever accumulates — an inner scope cannot relax an outer final deny.
    pub fn merge(&self, inner: &PermissionConfiguration) -> PermissionConfiguration {
        let prepend = |inner_rules: &[PermissionRule], outer_rules: &[PermissionRule]| {
            let mut merged = inner_rules.to_vec();
            merged.extend_from_slice(outer_rules);
            merged
        };
        PermissionConfiguration {
            allow: prepend(&inner.allow, &self.allow),
            deny: prepend(&inner.deny, &self.deny),
            final_deny: prepend(&inner.final_deny, &self.final_deny),
            overrides: prepend(&inner.overrides, &self.overrides),
            ask: prepend(&inner.ask, &self.ask),
            default_action: inner.default_action.or(self.default_action),
            enable_session_memory: inner.enable_session_memory || self.enable_session_memory,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(allow: &[&str], deny: &[&str]) -> PermissionConfiguration {
        let mut c = PermissionConfiguration::default();
        for a in allow {
            c = c.allow_rule(a).unwrap();
        }
        for d in deny {
            c = c.deny_rule(d).unwrap();
        }
        c
    }

    #[test]
    fn merge_prepends_inner_rules() {
        let outer = cfg(&["Bash"], &[]);
        let inner = cfg(&["Write"], &[]);
        let merged = outer.merge(&inner);
        assert_eq!(merged.allow.len(), 2);
        assert_eq!(merged.allow[0].to_string(), "Write");
        assert_eq!(merged.allow[1].to_string(), "Bash");
    }

    #[test]
    fn merge_inner_default_replaces_outer() {
        let outer = cfg(&[], &[]).with_default_action(DefaultAction::Deny);
        let inner = cfg(&[], &[]).with_default_action(DefaultAction::Allow);
        assert_eq!(
            outer.merge(&inner).default_action,
            Some(DefaultAction::Allow)
        );
    }

    #[test]
    fn merge_keeps_outer_default_when_inner_unset() {
        let outer = cfg(&[], &[]).with_default_action(DefaultAction::Deny);
        let inner = cfg(&[], &[]);
        assert_eq!(
            outer.merge(&inner).default_action,
            Some(DefaultAction::Deny)
        );
    }

    #[test]
    fn merge_prepends_ask_rules() {
        let outer = PermissionConfiguration::default().ask_rule("Bash").unwrap();
        let inner = PermissionConfiguration::default()
            .ask_rule("Write(/etc/*)")
            .unwrap();
        let merged = outer.merge(&inner);
        assert_eq!(merged.ask.len(), 2);
        assert_eq!(merged.ask[0].to_string(), "Write(/etc/*)");
    }

    #[test]
    fn merge_accumulates_final_deny() {
        let outer = PermissionConfiguration::default()
            .final_deny_rule("Bash(sudo:*)")
            .unwrap();
        let inner = PermissionConfiguration::default()
            .final_deny_rule("Write(/etc/*)")
            .unwrap();
        let merged = outer.merge(&inner);
        assert_eq!(merged.final_deny.len(), 2);
    }

    #[test]
    fn merge_is_associative_in_rule_order() {
        let a = cfg(&["A"], &[]);
        let b = cfg(&["B"], &[]);
        let c = cfg(&["C"], &[]);
        let left = a.merge(&b).merge(&c);
        let right = a.merge(&b.merge(&c));
        let order = |cfg: &PermissionConfiguration| {
            cfg.allow.iter().map(|r| r.to_string()).collect::<Vec<_>>()
        };
        assert_eq!(order(&left), order(&right));
        assert_eq!(order(&left), vec!["C", "B", "A"]);
    }

    #[test]
    fn merge_session_memory_is_sticky() {
        let outer = PermissionConfiguration::default().with_session_memory();
        let inner = PermissionConfiguration::default();
        assert!(outer.merge(&inner).enable_session_memory);
        assert!(inner.merge(&outer).enable_session_memory);
    }
}
