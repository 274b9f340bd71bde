// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;
use std::sync::Arc;

use murmur_config::{ConfigError, ModelConfiguration, ToolAccess};
use murmur_model::LanguageModelProvider;
use murmur_policy::PermissionConfiguration;

/// Construction-time options for one agent.
///
/// Consumed once when the agent is assembled; there is no runtime mutation
/// surface.  [`validate`](AgentOptions::validate) must pass before the
/// options are used — it rejects out-of-range sampling parameters.
pub struct AgentOptions {
    /// System instructions prepended to every model turn.
    pub instructions: String,
    pub tools: ToolAccess,
    pub model_provider: Option<Arc<dyn LanguageModelProvider>>,
    pub model_configuration: ModelConfiguration,
    pub working_directory: Option<PathBuf>,
    /// Optional skill identifiers resolved by the embedding application.
    pub skills: Option<Vec<String>>,
    pub permission_configuration: PermissionConfiguration,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            instructions: String::new(),
            tools: ToolAccess::default(),
            model_provider: None,
            model_configuration: ModelConfiguration::default(),
            working_directory: None,
            skills: None,
            permission_configuration: PermissionConfiguration::default(),
        }
    }
}

impl AgentOptions {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: ToolAccess) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_model_provider(mut self, provider: Arc<dyn LanguageModelProvider>) -> Self {
        self.model_provider = Some(provider);
        self
    }

    pub fn with_model_configuration(mut self, configuration: ModelConfiguration) -> Self {
        self.model_configuration = configuration;
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_permissions(mut self, configuration: PermissionConfiguration) -> Self {
        self.permission_configuration = configuration;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model_configuration.validate()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(AgentOptions::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_temperature_is_rejected() {
        let opts = AgentOptions::new("be helpful").with_model_configuration(ModelConfiguration {
            temperature: Some(3.0),
            ..Default::default()
        });
        assert!(opts.validate().is_err());
    }

    #[test]
    fn out_of_range_top_p_is_rejected() {
        let opts = AgentOptions::default().with_model_configuration(ModelConfiguration {
            top_p: Some(-0.5),
            ..Default::default()
        });
        assert!(opts.validate().is_err());
    }

    #[test]
    fn builder_sets_fields() {
        let opts = AgentOptions::new("instructions")
            .with_tools(ToolAccess::Custom {
                tools: vec!["echo".into()],
            })
            .with_working_directory("/tmp/agent");
        assert_eq!(opts.instructions, "instructions");
        assert!(opts.tools.admits("echo"));
        assert_eq!(opts.working_directory.unwrap(), PathBuf::from("/tmp/agent"));
    }
}
