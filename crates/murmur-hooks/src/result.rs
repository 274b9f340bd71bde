// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

/// What a single hook handler decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookResult {
    /// No opinion; keep going.
    Continue,
    /// Explicitly allow the pending action.
    Allow,
    /// Allow, substituting this JSON text for the tool input.
    AllowWithModifiedInput(String),
    /// Keep going and append a context message for the model.
    AddContext(String),
    /// Refuse the pending action.
    Block(Option<String>),
    /// Refuse the pending action (permission flavour of `Block`).
    Deny(Option<String>),
    /// Escalate to the approval flow.
    Ask,
    /// End the whole turn.
    Stop {
        reason: String,
        output: Option<String>,
    },
    /// Replace the tool output with this text.
    ReplaceOutput(String),
    /// Drop the tool output from the transcript.
    SuppressOutput,
    /// Keep going with a rewritten user prompt.
    ContinueWithModifiedPrompt(String),
}

impl HookResult {
    /// `true` when the pending action may still run.
    pub fn allows_execution(&self) -> bool {
        !matches!(
            self,
            HookResult::Block(_) | HookResult::Deny(_) | HookResult::Ask | HookResult::Stop { .. }
        )
    }

    /// `true` when the result rewrites input, output, prompt, or context.
    pub fn modifies_data(&self) -> bool {
        matches!(
            self,
            HookResult::AllowWithModifiedInput(_)
                | HookResult::AddContext(_)
                | HookResult::ReplaceOutput(_)
                | HookResult::SuppressOutput
                | HookResult::ContinueWithModifiedPrompt(_)
        )
    }

    /// `true` when the result ends the turn.
    pub fn stops_agent(&self) -> bool {
        matches!(self, HookResult::Stop { .. })
    }
}

/// Decision of an aggregated tier, ordered by dominance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookDecision {
    #[default]
    Continue,
    Allow,
    AllowWithModifiedInput,
    Ask,
    Block,
    Stop,
}

impl HookDecision {
    /// Dominance rank: stop > block/deny > ask > modified-input allow >
    /// allow > continue.
    fn rank(self) -> u8 {
        match self {
            HookDecision::Continue => 0,
            HookDecision::Allow => 1,
            HookDecision::AllowWithModifiedInput => 2,
            HookDecision::Ask => 3,
            HookDecision::Block => 4,
            HookDecision::Stop => 5,
        }
    }

    pub fn is_blocking(self) -> bool {
        matches!(self, HookDecision::Block | HookDecision::Stop)
    }
}

/// The combined outcome of one or more hook results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedHookResult {
    pub decision: HookDecision,
    /// Last input modification wins.
    pub modified_input: Option<String>,
    /// Last prompt modification wins.
    pub modified_prompt: Option<String>,
    /// Last output replacement wins.
    pub replaced_output: Option<String>,
    /// Context messages accumulate in handler order.
    pub context_messages: Vec<String>,
    /// Reasons accumulate from every blocking result.
    pub reasons: Vec<String>,
    pub suppress_output: bool,
    /// Output attached to a `Stop`, if any.
    pub stop_output: Option<String>,
}

impl AggregatedHookResult {
    /// Fold one handler result into the aggregate.
    pub fn absorb(&mut self, result: &HookResult) {
        let candidate = match result {
            HookResult::Continue => HookDecision::Continue,
            HookResult::Allow => HookDecision::Allow,
            HookResult::AllowWithModifiedInput(input) => {
                self.modified_input = Some(input.clone());
                HookDecision::AllowWithModifiedInput
            }
            HookResult::AddContext(msg) => {
                self.context_messages.push(msg.clone());
                HookDecision::Continue
            }
            HookResult::Block(reason) | HookResult::Deny(reason) => {
                if let Some(r) = reason {
                    self.reasons.push(r.clone());
                }
                HookDecision::Block
            }
            HookResult::Ask => HookDecision::Ask,
            HookResult::Stop { reason, output } => {
                self.reasons.push(reason.clone());
                if output.is_some() {
                    self.stop_output = output.clone();
                }
                HookDecision::Stop
            }
            HookResult::ReplaceOutput(out) => {
                self.replaced_output = Some(out.clone());
                HookDecision::Continue
            }
            HookResult::SuppressOutput => {
                self.suppress_output = true;
                HookDecision::Continue
            }
            HookResult::ContinueWithModifiedPrompt(prompt) => {
                self.modified_prompt = Some(prompt.clone());
                HookDecision::Continue
            }
        };
        if candidate.rank() > self.decision.rank() {
            self.decision = candidate;
        }
    }

    /// Aggregate a whole tier of results.
    pub fn from_results(results: &[HookResult]) -> Self {
        let mut agg = AggregatedHookResult::default();
        for r in results {
            agg.absorb(r);
        }
        agg
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continue_is_default_aggregate() {
        let agg = AggregatedHookResult::from_results(&[
            HookResult::Continue,
            HookResult::Continue,
        ]);
        assert_eq!(agg.decision, HookDecision::Continue);
        assert!(agg.reasons.is_empty());
    }

    #[test]
    fn block_dominates_allow() {
        let agg = AggregatedHookResult::from_results(&[
            HookResult::Allow,
            HookResult::Block(Some("nope".into())),
            HookResult::Continue,
        ]);
        assert_eq!(agg.decision, HookDecision::Block);
        assert_eq!(agg.reasons, vec!["nope"]);
    }

    #[test]
    fn stop_dominates_everything() {
        let agg = AggregatedHookResult::from_results(&[
            HookResult::Block(Some("b".into())),
            HookResult::Stop {
                reason: "done".into(),
                output: Some("final".into()),
            },
            HookResult::Allow,
        ]);
        assert_eq!(agg.decision, HookDecision::Stop);
        assert_eq!(agg.stop_output.as_deref(), Some("final"));
        // Reasons from all blocking results accumulate.
        assert_eq!(agg.reasons, vec!["b", "done"]);
    }

    #[test]
    fn ask_dominates_modified_input() {
        let agg = AggregatedHookResult::from_results(&[
            HookResult::AllowWithModifiedInput("{}".into()),
            HookResult::Ask,
        ]);
        assert_eq!(agg.decision, HookDecision::Ask);
        // The modification is still recorded even though ask won.
        assert!(agg.modified_input.is_some());
    }

    #[test]
    fn last_modification_wins() {
        let agg = AggregatedHookResult::from_results(&[
            HookResult::AllowWithModifiedInput("first".into()),
            HookResult::AllowWithModifiedInput("second".into()),
        ]);
        assert_eq!(agg.modified_input.as_deref(), Some("second"));
    }

    #[test]
    fn context_messages_accumulate_in_order() {
        let agg = AggregatedHookResult::from_results(&[
            HookResult::AddContext("a".into()),
            HookResult::AddContext("b".into()),
        ]);
        assert_eq!(agg.context_messages, vec!["a", "b"]);
        assert_eq!(agg.decision, HookDecision::Continue);
    }

    #[test]
    fn suppress_and_replace_are_recorded() {
        let agg = AggregatedHookResult::from_results(&[
            HookResult::SuppressOutput,
            HookResult::ReplaceOutput("patched".into()),
        ]);
        assert!(agg.suppress_output);
        assert_eq!(agg.replaced_output.as_deref(), Some("patched"));
    }

    #[test]
    fn result_predicates() {
        assert!(HookResult::Continue.allows_execution());
        assert!(HookResult::AllowWithModifiedInput("{}".into()).allows_execution());
        assert!(!HookResult::Block(None).allows_execution());
        assert!(!HookResult::Ask.allows_execution());

        assert!(HookResult::ReplaceOutput("x".into()).modifies_data());
        assert!(HookResult::AddContext("c".into()).modifies_data());
        assert!(!HookResult::Allow.modifies_data());

        assert!(HookResult::Stop {
            reason: "r".into(),
            output: None
        }
        .stops_agent());
        assert!(!HookResult::Deny(None).stops_agent());
    }

    #[test]
    fn deny_and_block_aggregate_identically() {
        let a = AggregatedHookResult::from_results(&[HookResult::Deny(Some("d".into()))]);
        let b = AggregatedHookResult::from_results(&[HookResult::Block(Some("d".into()))]);
        assert_eq!(a.decision, b.decision);
        assert_eq!(a.reasons, b.reasons);
    }
}
