//! Resolving a user-facing model identifier into a provider factory.

use std::sync::Arc;
use std::time::Duration;

use crate::client::CodeCompletionsClient;
use crate::error::CompletionError;
use crate::model::{CodeModel, CHARS_PER_TOKEN};
use crate::provider::FireworksProvider;
use crate::types::ProviderOptions;

pub const PROVIDER_IDENTIFIER: &str = "fireworks";

/// Caller-supplied timeout overrides, applied per generation mode. A zero
/// override is the cooperative way to disable a mode without branching call
/// sites.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompletionTimeouts {
    pub multiline: Option<Duration>,
    pub singleline: Option<Duration>,
}

/// Character budgets the caller should aim for when gathering file context,
/// derived from the resolved model's context window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextSizeHints {
    pub total_file_context_chars: usize,
    pub prefix_chars: usize,
    pub suffix_chars: usize,
}

/// A stateless factory stamping out one [`FireworksProvider`] per completion
/// request. Long-lived: created once at configuration time and reused.
#[derive(Clone)]
pub struct ProviderConfig {
    client: Arc<dyn CodeCompletionsClient>,
    model: CodeModel,
    timeouts: CompletionTimeouts,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("model", &self.model)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl ProviderConfig {
    /// Stable identifier used by callers for UI and telemetry.
    pub fn identifier(&self) -> &'static str {
        PROVIDER_IDENTIFIER
    }

    /// The resolved model id (still the hybrid meta-model when configured
    /// so; per-request resolution happens inside the provider).
    pub fn model(&self) -> CodeModel {
        self.model
    }

    pub fn context_size_hints(&self) -> ContextSizeHints {
        let total_chars = (self.model.max_context_tokens() * CHARS_PER_TOKEN) as usize;
        ContextSizeHints {
            total_file_context_chars: total_chars * 9 / 10,
            prefix_chars: total_chars * 6 / 10,
            suffix_chars: total_chars / 10,
        }
    }

    pub fn create(&self, options: ProviderOptions) -> FireworksProvider {
        FireworksProvider::new(
            Arc::clone(&self.client),
            self.model,
            options,
            self.timeouts,
            self.model.max_context_tokens(),
        )
    }
}

/// Resolve the configured model string and build the provider factory.
///
/// Empty or unset input falls back to the hybrid meta-model; unknown model
/// strings fail fast with an error naming the offending string, never a
/// silent default.
pub fn create_provider_config(
    client: Arc<dyn CodeCompletionsClient>,
    model: Option<&str>,
    timeouts: CompletionTimeouts,
) -> Result<ProviderConfig, CompletionError> {
    let model = match model {
        None | Some("") => CodeModel::StarCoderHybrid,
        Some(id) => {
            CodeModel::parse(id).ok_or_else(|| CompletionError::UnknownModel(id.to_string()))?
        }
    };
    Ok(ProviderConfig {
        client,
        model,
        timeouts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CompletionTextStream;
    use crate::types::CompletionParams;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct NoopClient;

    #[async_trait]
    impl CodeCompletionsClient for NoopClient {
        async fn complete_stream(
            &self,
            _params: &CompletionParams,
            _cancel: CancellationToken,
        ) -> Result<CompletionTextStream, CompletionError> {
            Ok(Box::pin(futures::stream::empty::<
                Result<String, CompletionError>,
            >()))
        }
    }

    fn client() -> Arc<dyn CodeCompletionsClient> {
        Arc::new(NoopClient)
    }

    #[test]
    fn empty_or_unset_model_resolves_to_hybrid() {
        let config =
            create_provider_config(client(), None, CompletionTimeouts::default()).unwrap();
        assert_eq!(config.model(), CodeModel::StarCoderHybrid);

        let config =
            create_provider_config(client(), Some(""), CompletionTimeouts::default()).unwrap();
        assert_eq!(config.model(), CodeModel::StarCoderHybrid);
    }

    #[test]
    fn known_model_strings_resolve() {
        let config = create_provider_config(
            client(),
            Some("llama-code-13b"),
            CompletionTimeouts::default(),
        )
        .unwrap();
        assert_eq!(config.model(), CodeModel::LlamaCode13b);
        assert_eq!(config.identifier(), "fireworks");
    }

    #[test]
    fn unknown_model_string_fails_naming_the_offender() {
        let err = create_provider_config(
            client(),
            Some("starcoder-900b"),
            CompletionTimeouts::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompletionError::UnknownModel(_)));
        assert!(err.to_string().contains("starcoder-900b"));
    }

    #[test]
    fn context_size_hints_derive_from_the_token_budget() {
        let config =
            create_provider_config(client(), Some("starcoder-7b"), CompletionTimeouts::default())
                .unwrap();
        let hints = config.context_size_hints();
        // 2048 tokens at 4 chars/token.
        assert_eq!(hints.total_file_context_chars, 8192 * 9 / 10);
        assert_eq!(hints.prefix_chars, 8192 * 6 / 10);
        assert_eq!(hints.suffix_chars, 8192 / 10);
    }
}
