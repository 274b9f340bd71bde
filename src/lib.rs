// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Murmur — a framework for composing, running, and federating LLM-driven
//! agents.
//!
//! The workspace decomposes into focused crates, re-exported here:
//!
//! - [`config`]: construction-time configuration and validation
//! - [`model`]: the language-model provider seam and test mocks
//! - [`tools`]: the tool contract and registry
//! - [`policy`]: the permission engine
//! - [`hooks`]: the hook chain
//! - [`core`]: tool pipeline, turn runner, event bus, step combinators
//! - [`fabric`]: addresses, discovery, communities, process agents

pub use murmur_config as config;
pub use murmur_core as core;
pub use murmur_fabric as fabric;
pub use murmur_hooks as hooks;
pub use murmur_model as model;
pub use murmur_policy as policy;
pub use murmur_tools as tools;
