use std::time::Duration;

use serde::Serialize;

/// Identity of the document a completion request is anchored in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    pub file_name: String,
    /// Editor language id, e.g. `typescript` or `python`.
    pub language_id: String,
}

/// The prefix/suffix text window around the cursor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentContext {
    pub prefix: String,
    pub suffix: String,
}

/// Per-request configuration, constructed once by the caller for every
/// keystroke-triggered completion request and discarded after the request
/// settles or is cancelled.
#[derive(Clone, Debug)]
pub struct ProviderOptions {
    pub document: Document,
    pub doc_context: DocumentContext,
    /// Number of independent samples to fetch concurrently.
    pub n: usize,
    pub multiline: bool,
    /// Experimental mode that lets the model run past blank lines so a full
    /// syntax block can be captured in one generation.
    pub dynamic_multiline: bool,
    /// Deliver additional candidates for text beyond the primary completion
    /// without issuing a new backend request.
    pub hot_streak: bool,
}

/// An auxiliary code fragment inserted into the prompt for grounding.
/// Ordered most-relevant-first by the caller; this crate only decides how
/// many fit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContextSnippet {
    Symbol { symbol: String, content: String },
    File { file_name: String, content: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Human,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Message {
    pub speaker: Speaker,
    pub text: String,
}

/// The resolved per-call backend request. Built once via explicit precedence
/// rules (mode preset, then the dynamic-multiline override, then the
/// configured timeout override) and immutable from dispatch onwards.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionParams {
    pub messages: Vec<Message>,
    /// Concrete backend model id, e.g. `fireworks/starcoder-7b-w8a16`.
    pub model: String,
    pub temperature: f32,
    pub top_k: u32,
    pub max_tokens_to_sample: u32,
    /// Empty means the model may run unbounded (dynamic multiline).
    pub stop_sequences: Vec<String>,
    pub timeout: Duration,
}

/// Why a completion ended where it did. Carried as analytics metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// A configured stop sequence was hit.
    StopSequence,
    /// The backend closed the stream.
    StreamEnd,
    /// Cut by mid-stream processing rather than by the backend.
    Truncation,
    /// Delivered incrementally past the primary completion.
    HotStreak,
}

/// A structured completion candidate produced from a raw token stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineCompletionItem {
    pub insert_text: String,
    pub stop_reason: StopReason,
}
