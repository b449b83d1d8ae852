use crate::compiler::GrammarError;
use std::fmt;
use thiserror::Error;

/// Internal failure record threaded through the engine.
///
/// Failures are recoverable: ordered choice, optional pointers and the
/// left-recursion machinery consume them. The engine keeps the failure with
/// the furthest offset and surfaces it as a [`ParseError`] when the whole
/// parse fails.
#[derive(Debug, Clone)]
pub(crate) struct Failure {
    pub(crate) offset: usize,
    pub(crate) message: String,
}

impl Failure {
    pub(crate) fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Error raised when a subject does not match the compiled grammar
#[derive(Debug, Clone)]
pub struct ParseError<'a> {
    /// The subject the grammar was matched against
    input: &'a [u8],

    /// Byte offset of the failure in the subject
    offset: usize,

    /// Human-readable description of what was expected
    message: String,
}

impl<'a> ParseError<'a> {
    pub(crate) fn new(input: &'a [u8], offset: usize, message: String) -> Self {
        Self {
            input,
            offset,
            message,
        }
    }

    /// Get the byte offset the error occurred at
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Get the error's message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the 1-based line and column of the error
    pub fn line_col(&self) -> (usize, usize) {
        let upto = self.offset.min(self.input.len());
        let mut line = 1;
        let mut start = 0;
        for (i, &b) in self.input[..upto].iter().enumerate() {
            if b == b'\n' {
                line += 1;
                start = i + 1;
            }
        }
        (line, upto - start + 1)
    }
}

impl<'a> fmt::Display for ParseError<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (line, col) = self.line_col();

        // Cut the failing line out of the subject
        let upto = self.offset.min(self.input.len());
        let start = upto - (col - 1);
        let end = self.input[upto..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| upto + i)
            .unwrap_or(self.input.len());

        let head = String::from_utf8_lossy(&self.input[start..upto]);
        let tail = String::from_utf8_lossy(&self.input[upto..end]);

        write!(
            f,
            "Syntax error at line {}:{}: {}\n{}<!--here--!>{}",
            line, col, self.message, head, tail
        )
    }
}

impl<'a> std::error::Error for ParseError<'a> {}

/// Error raised when a value cannot be rendered back to text
#[derive(Error, Debug)]
#[error("{0}")]
pub struct EmitError(pub(crate) String);

impl EmitError {
    /// Create an emit error; also the constructor custom parsers use to
    /// report their own emit failures
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<std::io::Error> for EmitError {
    fn from(err: std::io::Error) -> Self {
        Self(format!("write failed: {}", err))
    }
}

/// Any failure the engine can surface to a caller
#[derive(Debug)]
pub enum Error<'a> {
    /// The subject does not match the grammar (recoverable, input problem)
    Syntax(ParseError<'a>),

    /// A value could not be rendered back to text
    Emit(EmitError),

    /// The grammar itself is broken (fatal, descriptor problem)
    Grammar(GrammarError),
}

impl<'a> fmt::Display for Error<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Syntax(err) => write!(f, "{}", err),
            Self::Emit(err) => write!(f, "{}", err),
            Self::Grammar(err) => write!(f, "{}", err),
        }
    }
}

impl<'a> std::error::Error for Error<'a> {}

impl<'a> From<GrammarError> for Error<'a> {
    fn from(err: GrammarError) -> Self {
        Self::Grammar(err)
    }
}

impl<'a> From<EmitError> for Error<'a> {
    fn from(err: EmitError) -> Self {
        Self::Emit(err)
    }
}
