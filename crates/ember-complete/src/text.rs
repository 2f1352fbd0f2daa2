//! Pure text helpers shared by the prompt builder and the stream processor.
//! Kept free of I/O so each rule is independently testable.

/// Keep only the suffix text after its first line break.
///
/// The remainder of the cursor line would be duplicated by the evaluated
/// backend models, so it is dropped from infilling prompts.
pub(crate) fn suffix_after_first_newline(suffix: &str) -> &str {
    match suffix.find('\n') {
        Some(idx) => &suffix[idx..],
        None => "",
    }
}

/// Split a prefix into everything before its final two lines (`head`) and
/// those final two lines (`tail`): the line being typed plus the one above
/// it, which typically carries the block opener.
pub(crate) fn head_and_tail(prefix: &str) -> (&str, &str) {
    let Some(before_current) = prefix.rfind('\n') else {
        return ("", prefix);
    };
    let split = match prefix[..before_current].rfind('\n') {
        Some(idx) => idx + 1,
        None => 0,
    };
    (&prefix[..split], &prefix[split..])
}

/// Indentation width of `line`, counting spaces and tabs as one column each.
pub(crate) fn indentation(line: &str) -> usize {
    line.len() - line.trim_start_matches([' ', '\t']).len()
}

/// Whether the text on the cursor line opens a syntactic block, meaning a
/// completion may legitimately extend over multiple lines.
pub(crate) fn opens_block(line: &str) -> bool {
    let trimmed = line.trim_end();
    trimmed.ends_with('{')
        || trimmed.ends_with('(')
        || trimmed.ends_with('[')
        || trimmed.ends_with(':')
        || trimmed.ends_with("=>")
}

/// Earliest byte offset of any stop sequence in `text`.
pub(crate) fn find_stop_sequence(text: &str, stop_sequences: &[String]) -> Option<usize> {
    stop_sequences
        .iter()
        .filter_map(|stop| text.find(stop.as_str()))
        .min()
}

/// Byte offset at which a multi-line completion stops belonging to the block
/// opened at `opening_indent`, or `None` while every complete line seen so
/// far is still inside the block.
///
/// The first line continues the cursor line and is always kept. A later
/// non-blank line ends the block once its indentation returns to
/// `opening_indent` or less; a line consisting only of closing punctuation
/// at that level is kept and ends the block after itself. Only lines
/// terminated by a newline are judged, so a partially streamed line never
/// cuts the block early.
pub(crate) fn multiline_block_end(text: &str, opening_indent: usize) -> Option<usize> {
    let mut offset = text.find('\n')? + 1;

    loop {
        let rest = &text[offset..];
        let len = rest.find('\n')?;
        let line_end = offset + len;
        let line = rest[..len].trim_end_matches('\r');

        if line.trim().is_empty() {
            offset = line_end + 1;
            continue;
        }

        if indentation(line) <= opening_indent {
            return if is_closing_line(line) {
                Some(line_end)
            } else {
                // Cut before this line's preceding newline.
                Some(offset - 1)
            };
        }

        offset = line_end + 1;
    }
}

fn is_closing_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| matches!(c, '}' | ')' | ']' | ';' | ','))
}
