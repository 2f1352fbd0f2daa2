//! `ember-complete` is the code-completion request pipeline for the Ember
//! editor's Fireworks-style inference backend.
//!
//! It turns an editor's surrounding source text into a model-specific
//! infilling prompt, dispatches `n` concurrent streaming inference requests
//! under a strict per-request timeout and stop-sequence policy, and converts
//! the raw token streams back into structured completion candidates —
//! including the experimental dynamic-multiline mode and the incremental
//! hot-streak delivery mode. Editor integration, authentication, and
//! telemetry are external collaborators consumed through the narrow
//! interfaces exposed here.

mod client;
mod config;
mod error;
pub mod fetch;
mod languages;
mod model;
mod prompt;
mod provider;
mod text;
mod types;

pub use client::{CodeCompletionsClient, CompletionTextStream, HttpCompletionsClient};
pub use config::{
    create_provider_config, CompletionTimeouts, ContextSizeHints, ProviderConfig,
    PROVIDER_IDENTIFIER,
};
pub use error::CompletionError;
pub use languages::{language_profile, LanguageProfile};
pub use model::{CodeModel, ModelFamily};
pub use provider::{CompletionTracer, FireworksProvider, InlineCompletionProvider};
pub use types::{
    CompletionParams, ContextSnippet, Document, DocumentContext, InlineCompletionItem, Message,
    ProviderOptions, Speaker, StopReason,
};
