use thiserror::Error;

/// Structural error: the grammar itself is broken.
///
/// These are fatal: unlike parse failures they are never consumed by
/// ordered choice or optional pointers, and they abort the whole operation.
#[derive(Error, Debug)]
pub enum GrammarError {
    /// A `Descriptor::rule` reference names a rule the descriptor set does
    /// not define
    #[error("rule `{0}' is not defined")]
    UnknownRule(String),

    /// A `regexp` option does not compile
    #[error("invalid regular expression /{pattern}/: {source}")]
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },

    /// An option was applied to a descriptor that cannot honor it
    #[error("option `{option}' cannot apply to `{descriptor}'")]
    InvalidOption {
        option: &'static str,
        descriptor: String,
    },

    /// A repetition's element parser matched without consuming input
    #[error("zero-length match in repetition of {0}")]
    EmptyRepetition(String),

    /// A custom parser reported an offset outside the input, or behind its
    /// starting point
    #[error("custom parser `{0}' returned an out-of-range offset")]
    CustomParserRange(String),
}
