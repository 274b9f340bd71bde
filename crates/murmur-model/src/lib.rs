// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The language-model seam.
//!
//! The execution core consumes [`LanguageModelProvider`] and nothing else:
//! model choice, tokenization, and prompt construction live behind this
//! trait.  The crate ships two deterministic in-process providers
//! ([`MockProvider`], [`ScriptedMockProvider`]) so every model-touching test
//! runs without network access.
mod mock;
mod provider;
mod types;

pub use mock::{MockProvider, ScriptedMockProvider};
pub use provider::{LanguageModelProvider, ResponseStream};
pub use types::{CompletionRequest, Message, ResponseEvent, Role};
