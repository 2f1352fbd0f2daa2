//! Streaming fetch/process pipeline turning raw token deltas into
//! structured completion candidates.
//!
//! Two entry points with the same shape: [`fetch_and_process_completions`]
//! trusts the request's stop sequences to bound the generation, while
//! [`fetch_and_process_dynamic_multiline_completions`] runs without stop
//! sequences and re-evaluates mid-stream whether the completion should keep
//! extending. Both issue exactly one streaming request and deliver one
//! structured item through the per-sample callback; hot-streak mode
//! additionally delivers incremental items while the stream is still open.

use std::ops::ControlFlow;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::client::CodeCompletionsClient;
use crate::error::CompletionError;
use crate::text::{find_stop_sequence, indentation, multiline_block_end, opens_block};
use crate::types::{
    CompletionParams, DocumentContext, InlineCompletionItem, ProviderOptions, StopReason,
};

/// Post-processing applied to raw model output before items are built.
pub type PostProcessFn<'a> = &'a (dyn Fn(&str) -> String + Sync);
/// Per-sample delivery of the finished completion item.
pub type CompletionReadyFn<'a> = &'a (dyn Fn(InlineCompletionItem) + Sync);
/// Incremental delivery of hot-streak items with a revised document context.
pub type HotStreakReadyFn<'a> = &'a (dyn Fn(DocumentContext, InlineCompletionItem) + Sync);

/// Issue one streaming request bounded by the request's stop sequences and
/// deliver one processed completion item.
pub async fn fetch_and_process_completions(
    client: &dyn CodeCompletionsClient,
    params: &CompletionParams,
    cancel: &CancellationToken,
    post_process: PostProcessFn<'_>,
    options: &ProviderOptions,
    on_completion_ready: CompletionReadyFn<'_>,
    on_hot_streak_ready: HotStreakReadyFn<'_>,
) -> Result<(), CompletionError> {
    let mode = options.hot_streak.then(|| {
        if options.multiline {
            PrimaryMode::Block
        } else {
            PrimaryMode::SingleLine
        }
    });
    run_pipeline(
        client,
        params,
        cancel,
        post_process,
        options,
        on_completion_ready,
        on_hot_streak_ready,
        mode,
    )
    .await
}

/// Issue one streaming request without stop sequences, deciding mid-stream
/// where the completion naturally ends: a single line when the cursor line
/// opens no block, otherwise the whole syntax block opened at the cursor.
pub async fn fetch_and_process_dynamic_multiline_completions(
    client: &dyn CodeCompletionsClient,
    params: &CompletionParams,
    cancel: &CancellationToken,
    post_process: PostProcessFn<'_>,
    options: &ProviderOptions,
    on_completion_ready: CompletionReadyFn<'_>,
    on_hot_streak_ready: HotStreakReadyFn<'_>,
) -> Result<(), CompletionError> {
    run_pipeline(
        client,
        params,
        cancel,
        post_process,
        options,
        on_completion_ready,
        on_hot_streak_ready,
        Some(PrimaryMode::Dynamic),
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn run_pipeline(
    client: &dyn CodeCompletionsClient,
    params: &CompletionParams,
    cancel: &CancellationToken,
    post_process: PostProcessFn<'_>,
    options: &ProviderOptions,
    on_completion_ready: CompletionReadyFn<'_>,
    on_hot_streak_ready: HotStreakReadyFn<'_>,
    mode: Option<PrimaryMode>,
) -> Result<(), CompletionError> {
    // A child token per sample: finishing (or dropping) this sample early
    // aborts its stream without cancelling sibling samples.
    let cancel = cancel.child_token();
    let _guard = cancel.clone().drop_guard();

    let mut stream = client.complete_stream(params, cancel.clone()).await?;

    let mut processor =
        mode.map(|mode| StreamProcessor::new(mode, options, post_process, on_hot_streak_ready));

    let mut raw = String::new();
    let mut stop_reason = StopReason::StreamEnd;

    while let Some(delta) = stream.next().await {
        raw.push_str(&delta?);

        // Backends are expected to honor stop sequences; enforce them here
        // as well so a permissive backend cannot overrun the preset.
        if let Some(cut) = find_stop_sequence(&raw, &params.stop_sequences) {
            raw.truncate(cut);
            stop_reason = StopReason::StopSequence;
            break;
        }

        if let Some(processor) = processor.as_mut() {
            if processor.feed(&raw).is_break() {
                break;
            }
        }
    }
    drop(stream);

    let item = match processor {
        Some(processor) => processor.finish(&raw, stop_reason),
        None => InlineCompletionItem {
            insert_text: post_process(&raw).trim_end().to_string(),
            stop_reason,
        },
    };
    on_completion_ready(item);
    Ok(())
}

/// How the primary completion candidate is carved out of the stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PrimaryMode {
    /// Ends at the first completed line.
    SingleLine,
    /// Ends when the block opened at the cursor closes.
    Block,
    /// Decide between the two shapes from the first completed line.
    Dynamic,
}

/// Incremental processor over the accumulated raw text: finds the primary
/// completion, then (in hot-streak mode) turns every further completed line
/// into an additional candidate with an advanced document context.
struct StreamProcessor<'a> {
    mode: PrimaryMode,
    hot_streak: bool,
    opening_indent: usize,
    cursor_line: &'a str,
    doc_context: &'a DocumentContext,
    post_process: PostProcessFn<'a>,
    on_hot_streak_ready: HotStreakReadyFn<'a>,
    primary: Option<InlineCompletionItem>,
    /// Bytes of the raw text already delivered (primary plus hot lines).
    delivered: usize,
}

impl<'a> StreamProcessor<'a> {
    fn new(
        mode: PrimaryMode,
        options: &'a ProviderOptions,
        post_process: PostProcessFn<'a>,
        on_hot_streak_ready: HotStreakReadyFn<'a>,
    ) -> Self {
        let cursor_line = options
            .doc_context
            .prefix
            .rsplit('\n')
            .next()
            .unwrap_or_default();
        Self {
            mode,
            hot_streak: options.hot_streak,
            opening_indent: indentation(cursor_line),
            cursor_line,
            doc_context: &options.doc_context,
            post_process,
            on_hot_streak_ready,
            primary: None,
            delivered: 0,
        }
    }

    /// Returns `Break` once the stream is no longer needed.
    fn feed(&mut self, raw: &str) -> ControlFlow<()> {
        if self.primary.is_none() {
            let Some(end) = self.primary_end(raw) else {
                return ControlFlow::Continue(());
            };
            let text = (self.post_process)(&raw[..end]);
            self.primary = Some(InlineCompletionItem {
                insert_text: text.trim_end().to_string(),
                stop_reason: StopReason::Truncation,
            });
            self.delivered = end;
            if !self.hot_streak {
                return ControlFlow::Break(());
            }
        }
        self.emit_completed_lines(raw);
        ControlFlow::Continue(())
    }

    fn primary_end(&self, raw: &str) -> Option<usize> {
        match self.mode {
            PrimaryMode::SingleLine => raw.find('\n'),
            PrimaryMode::Block => multiline_block_end(raw, self.opening_indent),
            PrimaryMode::Dynamic => {
                let first_newline = raw.find('\n')?;
                let first_line = format!("{}{}", self.cursor_line, &raw[..first_newline]);
                if opens_block(&first_line) {
                    multiline_block_end(raw, self.opening_indent)
                } else {
                    Some(first_newline)
                }
            }
        }
    }

    fn emit_completed_lines(&mut self, raw: &str) {
        // Stop-sequence truncation can shorten `raw` below what was already
        // scanned when a sequence spans a chunk boundary.
        self.delivered = self.delivered.min(raw.len());

        while let Some(len) = raw[self.delivered..].find('\n') {
            let line_start = self.delivered;
            let line_end = line_start + len;
            self.delivered = line_end + 1;
            let line = raw[line_start..line_end].trim_end_matches('\r');
            self.emit_hot_item(line, &raw[..self.delivered]);
        }
    }

    fn emit_hot_item(&self, line: &str, consumed: &str) {
        let text = (self.post_process)(line);
        let text = text.trim_end();
        if text.trim().is_empty() {
            return;
        }
        let context = DocumentContext {
            prefix: format!("{}{}", self.doc_context.prefix, consumed),
            suffix: self.doc_context.suffix.clone(),
        };
        (self.on_hot_streak_ready)(
            context,
            InlineCompletionItem {
                insert_text: text.to_string(),
                stop_reason: StopReason::HotStreak,
            },
        );
    }

    fn finish(mut self, raw: &str, stop_reason: StopReason) -> InlineCompletionItem {
        match self.primary.take() {
            Some(item) => {
                if self.hot_streak {
                    self.emit_completed_lines(raw);
                    // The stream is done, so a trailing unterminated line is
                    // final text, not a partial one.
                    let rest = raw[self.delivered..].trim_end_matches('\r');
                    if !rest.is_empty() {
                        self.emit_hot_item(rest, raw);
                    }
                }
                item
            }
            None => InlineCompletionItem {
                insert_text: (self.post_process)(raw).trim_end().to_string(),
                stop_reason,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CompletionTextStream;
    use crate::model::ModelFamily;
    use crate::types::{Document, Message, Speaker};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedClient {
        deltas: Vec<&'static str>,
    }

    #[async_trait]
    impl CodeCompletionsClient for ScriptedClient {
        async fn complete_stream(
            &self,
            _params: &CompletionParams,
            _cancel: CancellationToken,
        ) -> Result<CompletionTextStream, CompletionError> {
            let deltas: Vec<Result<String, CompletionError>> =
                self.deltas.iter().map(|delta| Ok(delta.to_string())).collect();
            Ok(Box::pin(futures::stream::iter(deltas)))
        }
    }

    fn params(stop_sequences: &[&str]) -> CompletionParams {
        CompletionParams {
            messages: vec![Message {
                speaker: Speaker::Human,
                text: "prompt".to_string(),
            }],
            model: "fireworks/starcoder-7b-w8a16".to_string(),
            temperature: 0.2,
            top_k: 0,
            max_tokens_to_sample: 256,
            stop_sequences: stop_sequences.iter().map(|stop| stop.to_string()).collect(),
            timeout: Duration::from_secs(1),
        }
    }

    fn options(prefix: &str, multiline: bool, hot_streak: bool) -> ProviderOptions {
        ProviderOptions {
            document: Document {
                file_name: "a.ts".to_string(),
                language_id: "typescript".to_string(),
            },
            doc_context: DocumentContext {
                prefix: prefix.to_string(),
                suffix: String::new(),
            },
            n: 1,
            multiline,
            dynamic_multiline: false,
            hot_streak,
        }
    }

    async fn run(
        deltas: Vec<&'static str>,
        params: CompletionParams,
        options: ProviderOptions,
        family: ModelFamily,
    ) -> (Vec<InlineCompletionItem>, Vec<(String, String)>) {
        let client = ScriptedClient { deltas };
        let items: Mutex<Vec<InlineCompletionItem>> = Mutex::new(Vec::new());
        let hot_items: Mutex<Vec<(String, String)>> = Mutex::new(Vec::new());
        let post_process = move |text: &str| family.strip_end_of_text(text);
        let on_ready = |item: InlineCompletionItem| items.lock().unwrap().push(item);
        let on_hot = |context: DocumentContext, item: InlineCompletionItem| {
            hot_items
                .lock()
                .unwrap()
                .push((context.prefix, item.insert_text));
        };
        fetch_and_process_completions(
            &client,
            &params,
            &CancellationToken::new(),
            &post_process,
            &options,
            &on_ready,
            &on_hot,
        )
        .await
        .unwrap();
        (items.into_inner().unwrap(), hot_items.into_inner().unwrap())
    }

    #[tokio::test]
    async fn delivers_exactly_one_item_per_sample() {
        let (items, hot_items) = run(
            vec!["foo(", ");"],
            params(&["\n"]),
            options("const x = ", false, false),
            ModelFamily::StarCoder,
        )
        .await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].insert_text, "foo();");
        assert_eq!(items[0].stop_reason, StopReason::StreamEnd);
        assert!(hot_items.is_empty());
    }

    #[tokio::test]
    async fn end_of_text_sentinel_is_stripped_from_the_item() {
        let (items, _) = run(
            vec!["foo();", "<|endoftext|>"],
            params(&["\n"]),
            options("const x = ", false, false),
            ModelFamily::StarCoder,
        )
        .await;
        assert_eq!(items[0].insert_text, "foo();");
    }

    #[tokio::test]
    async fn a_stop_sequence_spanning_chunks_truncates_safely() {
        // "\n\n" arrives split across two deltas after a hot-streak primary
        // has already been carved out.
        let (items, hot_items) = run(
            vec!["foo\n", "\nbar"],
            params(&["\n\n"]),
            options("x = 1\n", false, true),
            ModelFamily::StarCoder,
        )
        .await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].insert_text, "foo");
        assert_eq!(items[0].stop_reason, StopReason::Truncation);
        assert!(hot_items.is_empty());
    }
}
