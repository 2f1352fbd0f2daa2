use std::fmt;

/// Tokens the backend may spend on the generated completion.
pub(crate) const MAX_RESPONSE_TOKENS: u32 = 256;

/// Fixed characters-per-token ratio used to convert token budgets into
/// character budgets for prompt assembly.
pub(crate) const CHARS_PER_TOKEN: u32 = 4;

const EOT_STARCODER: &str = "<|endoftext|>";
const EOT_LLAMA_CODE: &str = " <EOT>";

/// User-facing model identifiers supported by the Fireworks code-completion
/// backend, plus the `starcoder-hybrid` meta-model that resolves to a
/// concrete model per request shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CodeModel {
    StarCoderHybrid,
    StarCoder16b,
    StarCoder7b,
    StarCoder3b,
    StarCoder1b,
    WizardCoder15b,
    LlamaCode7b,
    LlamaCode13b,
    LlamaCode13bInstruct,
    Mistral7bInstruct4k,
}

impl CodeModel {
    pub(crate) const ALL: [CodeModel; 10] = [
        CodeModel::StarCoderHybrid,
        CodeModel::StarCoder16b,
        CodeModel::StarCoder7b,
        CodeModel::StarCoder3b,
        CodeModel::StarCoder1b,
        CodeModel::WizardCoder15b,
        CodeModel::LlamaCode7b,
        CodeModel::LlamaCode13b,
        CodeModel::LlamaCode13bInstruct,
        CodeModel::Mistral7bInstruct4k,
    ];

    pub fn parse(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|model| model.as_str() == id)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StarCoderHybrid => "starcoder-hybrid",
            Self::StarCoder16b => "starcoder-16b",
            Self::StarCoder7b => "starcoder-7b",
            Self::StarCoder3b => "starcoder-3b",
            Self::StarCoder1b => "starcoder-1b",
            Self::WizardCoder15b => "wizardcoder-15b",
            Self::LlamaCode7b => "llama-code-7b",
            Self::LlamaCode13b => "llama-code-13b",
            Self::LlamaCode13bInstruct => "llama-code-13b-instruct",
            Self::Mistral7bInstruct4k => "mistral-7b-instruct-4k",
        }
    }

    /// The concrete backend model id sent over the wire.
    pub fn backend_id(self) -> &'static str {
        match self {
            // The hybrid meta-model is resolved through `resolve` before any
            // request is built; this arm keeps the function total.
            Self::StarCoderHybrid | Self::StarCoder7b => "fireworks/starcoder-7b-w8a16",
            Self::StarCoder16b => "fireworks/starcoder-16b-w8a16",
            Self::StarCoder3b => "fireworks/starcoder-3b-w8a16",
            Self::StarCoder1b => "fireworks/starcoder-1b-w8a16",
            Self::WizardCoder15b => "fireworks/accounts/fireworks/models/wizardcoder-15b",
            Self::LlamaCode7b => "fireworks/accounts/fireworks/models/llama-v2-7b-code",
            Self::LlamaCode13b => "fireworks/accounts/fireworks/models/llama-v2-13b-code",
            Self::LlamaCode13bInstruct => {
                "fireworks/accounts/fireworks/models/llama-v2-13b-code-instruct"
            }
            Self::Mistral7bInstruct4k => "fireworks/accounts/fireworks/models/mistral-7b-instruct-4k",
        }
    }

    /// Resolve the hybrid meta-model for a concrete request shape: multiline
    /// generation tolerates the larger model's per-token cost.
    pub fn resolve(self, multiline: bool) -> Self {
        match self {
            Self::StarCoderHybrid => {
                if multiline {
                    Self::StarCoder16b
                } else {
                    Self::StarCoder7b
                }
            }
            other => other,
        }
    }

    /// Family dispatch. Order matters: the StarCoder prefix is checked
    /// first, then the Llama-code prefix, then exact-match special cases.
    pub fn family(self) -> ModelFamily {
        let id = self.as_str();
        if id.starts_with("starcoder") {
            ModelFamily::StarCoder
        } else if id.starts_with("llama-code") {
            ModelFamily::LlamaCode
        } else if id == "mistral-7b-instruct-4k" {
            ModelFamily::Instruct
        } else {
            ModelFamily::Other
        }
    }

    /// Context-window token budget. Families share a budget; anything
    /// unmapped gets a conservative 1200 tokens so forward-compatible model
    /// ids keep working.
    pub fn max_context_tokens(self) -> u32 {
        match self.family() {
            ModelFamily::StarCoder | ModelFamily::LlamaCode | ModelFamily::Instruct => 2048,
            ModelFamily::Other => 1200,
        }
    }
}

impl fmt::Display for CodeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model families, each carrying its template-rendering and sentinel
/// stripping behavior. Resolved once at provider construction, not
/// re-derived per call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelFamily {
    StarCoder,
    LlamaCode,
    Instruct,
    Other,
}

impl ModelFamily {
    /// Strip the family's end-of-text sentinel from raw model output.
    /// A no-op for families without one.
    pub fn strip_end_of_text(self, text: &str) -> String {
        match self {
            Self::StarCoder => text.replacen(EOT_STARCODER, "", 1),
            Self::LlamaCode => text.replacen(EOT_LLAMA_CODE, "", 1),
            Self::Instruct | Self::Other => text.to_string(),
        }
    }
}
