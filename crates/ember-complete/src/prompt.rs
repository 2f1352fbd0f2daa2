//! Model-specific infilling prompt assembly.

use tracing::debug;

use crate::languages::{language_profile, DEFAULT_COMMENT_START};
use crate::model::{CodeModel, ModelFamily};
use crate::text::{head_and_tail, suffix_after_first_newline};
use crate::types::{ContextSnippet, ProviderOptions};

const OPENING_CODE_TAG: &str = "<CODE5711>";
const CLOSING_CODE_TAG: &str = "</CODE5711>";

/// Produce the longest prompt that fits `prompt_chars` while including as
/// many leading context snippets as possible, in the order supplied.
///
/// Greedy growth with one-step lookahead: each round tentatively adds one
/// more snippet and keeps the previous candidate as soon as the new one no
/// longer fits. The zero-snippet candidate is returned even when it exceeds
/// the budget; callers truncate downstream rather than losing the request.
pub(crate) fn build_prompt(
    model: CodeModel,
    options: &ProviderOptions,
    snippets: &[ContextSnippet],
    prompt_chars: usize,
) -> String {
    let comment_start = language_profile(&options.document.language_id)
        .map(|profile| profile.comment_start)
        .unwrap_or(DEFAULT_COMMENT_START);

    let mut intro_blocks: Vec<String> = Vec::new();
    // StarCoder has a dedicated filename token instead of a header comment.
    if model.family() != ModelFamily::StarCoder {
        intro_blocks.push(format!("Path: {}", options.document.file_name));
    }

    let mut accepted: Option<String> = None;
    for included in 0..=snippets.len() {
        if included > 0 {
            intro_blocks.push(render_snippet(&snippets[included - 1]));
        }
        let intro = render_intro(&intro_blocks, comment_start);
        let candidate = model.family().render_infilling(
            model,
            &options.document.file_name,
            &intro,
            &options.doc_context.prefix,
            suffix_after_first_newline(&options.doc_context.suffix),
        );
        match accepted {
            None => accepted = Some(candidate),
            Some(prompt) => {
                if candidate.len() >= prompt_chars {
                    return prompt;
                }
                accepted = Some(candidate);
            }
        }
    }
    accepted.unwrap_or_default()
}

fn render_snippet(snippet: &ContextSnippet) -> String {
    match snippet {
        ContextSnippet::Symbol { symbol, content } => {
            format!("Additional documentation for `{symbol}`:\n\n{content}")
        }
        ContextSnippet::File { file_name, content } => {
            format!("Here is a reference snippet of code from {file_name}:\n\n{content}")
        }
    }
}

fn render_intro(blocks: &[String], comment_start: &str) -> String {
    if blocks.is_empty() {
        return String::new();
    }
    let mut intro = blocks
        .join("\n\n")
        .lines()
        .map(|line| format!("{comment_start}{line}"))
        .collect::<Vec<_>>()
        .join("\n");
    intro.push('\n');
    intro
}

impl ModelFamily {
    /// Render the family's infilling template.
    fn render_infilling(
        self,
        model: CodeModel,
        file_name: &str,
        intro: &str,
        prefix: &str,
        suffix: &str,
    ) -> String {
        match self {
            ModelFamily::StarCoder => format!(
                "<filename>{file_name}<fim_prefix>{intro}{prefix}<fim_suffix>{suffix}<fim_middle>"
            ),
            ModelFamily::LlamaCode => format!("<PRE> {intro}{prefix} <SUF>{suffix} <MID>"),
            ModelFamily::Instruct => {
                let (head, tail) = head_and_tail(prefix);
                // Do not ask the model to re-emit a block opener it already has.
                let infill_block = if tail.trim_end().ends_with('{') {
                    tail.trim_end()
                } else {
                    tail
                };
                format!(
                    "<s>[INST] Below is the code from file path {file_name}. Review the code \
                     outside the XML tags to detect the functionality, formats, style, patterns, \
                     and logics in use. Then, use what you detect and reuse methods/libraries to \
                     complete and enclose completed code only inside XML tags precisely without \
                     duplicating existing implementations. Here is the code:\n\
                     ```\n\
                     {intro}{head}{OPENING_CODE_TAG}{CLOSING_CODE_TAG}{suffix}\n\
                     ```[/INST]\n {OPENING_CODE_TAG}{infill_block}"
                )
            }
            ModelFamily::Other => {
                debug!(model = %model, "no infilling template for model; using prefix-only prompt");
                format!("{intro}{prefix}")
            }
        }
    }
}
