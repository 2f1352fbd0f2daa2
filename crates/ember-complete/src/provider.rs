//! The Fireworks-family completion provider: model resolution, request
//! parameter presets, and fan-out across `n` concurrent samples.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::CodeCompletionsClient;
use crate::config::CompletionTimeouts;
use crate::fetch::{
    fetch_and_process_completions, fetch_and_process_dynamic_multiline_completions,
};
use crate::model::{CodeModel, CHARS_PER_TOKEN, MAX_RESPONSE_TOKENS};
use crate::prompt::build_prompt;
use crate::types::{
    CompletionParams, ContextSnippet, DocumentContext, InlineCompletionItem, Message,
    ProviderOptions, Speaker,
};

const SINGLE_LINE_TIMEOUT: Duration = Duration::from_millis(5_000);
const MULTI_LINE_TIMEOUT: Duration = Duration::from_millis(15_000);
const SINGLE_LINE_MAX_TOKENS: u32 = 30;
const SINGLE_LINE_STOP_SEQUENCES: [&str; 1] = ["\n"];
const MULTI_LINE_STOP_SEQUENCES: [&str; 2] = ["\n\n", "\n\r\n"];
const TEMPERATURE: f32 = 0.2;
const TOP_K: u32 = 0;

/// Debug-only observer of the final request parameters and the aggregated
/// results. Never on the success path's control flow.
pub trait CompletionTracer: Send + Sync {
    fn params(&self, params: &CompletionParams);
    fn result(&self, completions: &[InlineCompletionItem]);
}

/// The capability surface a completion backend family exposes to the editor
/// layer. Only the Fireworks family lives in this crate; sibling backends
/// implement the same object-safe contract.
#[async_trait::async_trait]
pub trait InlineCompletionProvider: Send + Sync {
    /// Assemble the model-specific infilling prompt.
    fn create_prompt(&self, snippets: &[ContextSnippet]) -> String;

    /// Strip backend sentinels from raw model output.
    fn post_process(&self, text: &str) -> String;

    /// Dispatch the request fan-out. Resolves once all samples have settled
    /// or been cancelled.
    async fn generate(
        &self,
        cancel: CancellationToken,
        snippets: &[ContextSnippet],
        on_completion_ready: &(dyn Fn(Vec<InlineCompletionItem>) + Sync),
        on_hot_streak_ready: &(dyn Fn(DocumentContext, InlineCompletionItem) + Sync),
        tracer: Option<&dyn CompletionTracer>,
    );
}

/// Per-request notes (sample failures, degradations) held back until the
/// aggregate result is ready, then flushed in one batch.
struct DiagnosticsBuffer {
    entries: Mutex<Vec<String>>,
}

impl DiagnosticsBuffer {
    fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, note: String) {
        lock(&self.entries).push(note);
    }

    fn flush(&self) {
        for note in lock(&self.entries).drain(..) {
            debug!("{note}");
        }
    }
}

// A poisoned lock still holds consistent data for our push/drain usage.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// One provider instance per completion request, stamped out by
/// [`crate::ProviderConfig::create`].
pub struct FireworksProvider {
    client: Arc<dyn CodeCompletionsClient>,
    model: CodeModel,
    options: ProviderOptions,
    timeouts: CompletionTimeouts,
    /// Hard character budget for the assembled prompt.
    prompt_chars: usize,
}

impl FireworksProvider {
    pub(crate) fn new(
        client: Arc<dyn CodeCompletionsClient>,
        model: CodeModel,
        options: ProviderOptions,
        timeouts: CompletionTimeouts,
        max_context_tokens: u32,
    ) -> Self {
        let prompt_chars =
            (max_context_tokens.saturating_sub(MAX_RESPONSE_TOKENS) * CHARS_PER_TOKEN) as usize;
        Self {
            client,
            model,
            options,
            timeouts,
            prompt_chars,
        }
    }

    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    /// Assemble the infilling prompt for this request.
    pub fn create_prompt(&self, snippets: &[ContextSnippet]) -> String {
        build_prompt(self.model, &self.options, snippets, self.prompt_chars)
    }

    /// Strip the resolved model family's end-of-text sentinel.
    pub fn post_process(&self, text: &str) -> String {
        self.model
            .resolve(self.options.multiline)
            .family()
            .strip_end_of_text(text)
    }

    /// Build the final request parameters once, via explicit precedence:
    /// mode preset, then the dynamic-multiline override, then the configured
    /// timeout override.
    fn request_params(&self, prompt: String, extended: bool) -> CompletionParams {
        let model = self.model.resolve(self.options.multiline);
        let (preset_timeout, max_tokens, preset_stops): (Duration, u32, &[&str]) = if extended {
            (
                MULTI_LINE_TIMEOUT,
                MAX_RESPONSE_TOKENS,
                &MULTI_LINE_STOP_SEQUENCES,
            )
        } else {
            (
                SINGLE_LINE_TIMEOUT,
                SINGLE_LINE_MAX_TOKENS,
                &SINGLE_LINE_STOP_SEQUENCES,
            )
        };

        // Dynamic multiline lets the model run past blank lines so a whole
        // syntax block can be captured in one generation.
        let stop_sequences = if self.options.dynamic_multiline {
            Vec::new()
        } else {
            preset_stops.iter().map(|stop| stop.to_string()).collect()
        };

        let timeout = if extended {
            self.timeouts.multiline.unwrap_or(preset_timeout)
        } else {
            self.timeouts.singleline.unwrap_or(preset_timeout)
        };

        CompletionParams {
            messages: vec![Message {
                speaker: Speaker::Human,
                text: prompt,
            }],
            model: model.backend_id().to_string(),
            temperature: TEMPERATURE,
            top_k: TOP_K,
            max_tokens_to_sample: max_tokens,
            stop_sequences,
            timeout,
        }
    }

    /// Dispatch exactly `n` concurrent sample fetches and deliver the
    /// aggregated result.
    ///
    /// `on_completion_ready` fires at most once, after every sample has
    /// settled, with the items of the samples that succeeded; cancellation
    /// suppresses it entirely. `on_hot_streak_ready` fires zero or more
    /// times while streams are still open. A resolved timeout of zero
    /// completes immediately with an empty result and no network activity.
    pub async fn generate_completions<F, H>(
        &self,
        cancel: CancellationToken,
        snippets: &[ContextSnippet],
        on_completion_ready: F,
        on_hot_streak_ready: H,
        tracer: Option<&dyn CompletionTracer>,
    ) where
        F: FnOnce(Vec<InlineCompletionItem>) + Send,
        H: FnMut(DocumentContext, InlineCompletionItem) + Send,
    {
        let extended =
            self.options.multiline || self.options.dynamic_multiline || self.options.hot_streak;
        let prompt = self.create_prompt(snippets);
        let params = self.request_params(prompt, extended);

        if params.timeout.is_zero() {
            on_completion_ready(Vec::new());
            return;
        }

        if let Some(tracer) = tracer {
            tracer.params(&params);
        }

        let family = self.model.resolve(self.options.multiline).family();
        let post_process = move |text: &str| family.strip_end_of_text(text);

        let diagnostics = DiagnosticsBuffer::new();
        let completions: Mutex<Vec<InlineCompletionItem>> = Mutex::new(Vec::new());
        let on_sample = |item: InlineCompletionItem| lock(&completions).push(item);
        let hot_streak_callback = Mutex::new(on_hot_streak_ready);
        let on_hot_streak = |context: DocumentContext, item: InlineCompletionItem| {
            let mut callback = lock(&hot_streak_callback);
            (*callback)(context, item);
        };

        let fetches = (0..self.options.n).map(|sample| {
            let params = &params;
            let cancel = &cancel;
            let post_process = &post_process;
            let on_sample = &on_sample;
            let on_hot_streak = &on_hot_streak;
            let diagnostics = &diagnostics;
            async move {
                let result = if self.options.dynamic_multiline {
                    fetch_and_process_dynamic_multiline_completions(
                        self.client.as_ref(),
                        params,
                        cancel,
                        post_process,
                        &self.options,
                        on_sample,
                        on_hot_streak,
                    )
                    .await
                } else {
                    fetch_and_process_completions(
                        self.client.as_ref(),
                        params,
                        cancel,
                        post_process,
                        &self.options,
                        on_sample,
                        on_hot_streak,
                    )
                    .await
                };
                if let Err(err) = result {
                    diagnostics.record(format!("completion sample {sample} failed: {err}"));
                }
            }
        });
        join_all(fetches).await;

        if cancel.is_cancelled() {
            return;
        }

        diagnostics.flush();
        let completions = match completions.into_inner() {
            Ok(items) => items,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(tracer) = tracer {
            tracer.result(&completions);
        }
        on_completion_ready(completions);
    }
}

#[async_trait::async_trait]
impl InlineCompletionProvider for FireworksProvider {
    fn create_prompt(&self, snippets: &[ContextSnippet]) -> String {
        FireworksProvider::create_prompt(self, snippets)
    }

    fn post_process(&self, text: &str) -> String {
        FireworksProvider::post_process(self, text)
    }

    async fn generate(
        &self,
        cancel: CancellationToken,
        snippets: &[ContextSnippet],
        on_completion_ready: &(dyn Fn(Vec<InlineCompletionItem>) + Sync),
        on_hot_streak_ready: &(dyn Fn(DocumentContext, InlineCompletionItem) + Sync),
        tracer: Option<&dyn CompletionTracer>,
    ) {
        self.generate_completions(
            cancel,
            snippets,
            |items| on_completion_ready(items),
            |context, item| on_hot_streak_ready(context, item),
            tracer,
        )
        .await;
    }
}
