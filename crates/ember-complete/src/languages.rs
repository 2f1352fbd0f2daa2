/// Comment-syntax metadata for a source language, used when embedding
/// contextual snippets into a prompt as line comments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LanguageProfile {
    pub comment_start: &'static str,
}

/// Fallback marker for languages without a profile.
pub(crate) const DEFAULT_COMMENT_START: &str = "// ";

/// Look up the profile for an editor language id.
///
/// Pure lookup with no failure mode: unknown languages return `None` and
/// callers fall back to [`DEFAULT_COMMENT_START`].
pub fn language_profile(language_id: &str) -> Option<LanguageProfile> {
    let comment_start = match language_id {
        "c" | "cpp" | "csharp" | "dart" | "go" | "java" | "javascript" | "javascriptreact"
        | "kotlin" | "php" | "rust" | "scala" | "swift" | "typescript" | "typescriptreact" => "// ",
        "elixir" | "perl" | "python" | "r" | "ruby" | "shellscript" | "yaml" => "# ",
        "elm" | "haskell" | "lua" | "sql" => "-- ",
        "clojure" | "commonlisp" | "scheme" => ";; ",
        "erlang" => "% ",
        _ => return None,
    };
    Some(LanguageProfile { comment_start })
}
