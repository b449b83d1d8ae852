//! # Runtime
//!
//! This module drives [compiled grammars](`crate::compiler::Grammar`)
//! against byte slices and renders parsed [values](`Value`) back to text.
//! Per-call state (the packrat table, the recursion set, the furthest-error
//! record) lives inside the call, so one compiled grammar can serve any
//! number of concurrent parses.

mod data;
mod emit;
mod errors;
mod executor;
mod primitives;
pub mod skip;

pub use data::*;
pub use errors::{EmitError, Error, ParseError};

use crate::compiler::{Descriptor, Grammar};
use executor::{Executor, Fault};
use skip::Skipper;
use std::io::Write;
use std::sync::Arc;

/// Per-call parsing options
#[derive(Clone)]
pub struct Options {
    /// Whitespace policy applied at field boundaries and around repetition
    /// delimiters; `None` disables skipping entirely
    pub skip: Option<Skipper>,

    /// Memoize every (rule, offset) result. Without it only rules that can
    /// left-recurse go through the table.
    pub packrat: bool,

    /// Trace every node invocation on stderr
    pub debug: bool,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the whitespace policy
    pub fn skip(mut self, skip: Skipper) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Disables whitespace skipping
    pub fn no_skip(mut self) -> Self {
        self.skip = None;
        self
    }

    /// Sets the [`packrat`][Self#structfield.packrat] field
    pub fn packrat(mut self, value: bool) -> Self {
        self.packrat = value;
        self
    }

    /// Sets the [`debug`][Self#structfield.debug] field
    pub fn debug(mut self, value: bool) -> Self {
        self.debug = value;
        self
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            skip: Some(skip::whitespace()),
            packrat: false,
            debug: false,
        }
    }
}

impl Grammar {
    /// Match a subject against the compiled grammar.
    ///
    /// On success, returns the offset after the match and the parsed value;
    /// trailing input is left to the caller (pair a grammar with a negative
    /// lookahead when it must reach end of input). On failure, returns the
    /// failure that made it furthest into the subject.
    pub fn parse<'i>(&self, input: &'i [u8], options: &Options) -> Result<(usize, Value), Error<'i>> {
        let mut executor = Executor::new(self, input, options);

        match executor.drive(self.root(), 0) {
            Ok((offset, value)) => Ok((offset, value)),
            Err(Fault::Fatal(err)) => Err(Error::Grammar(err)),
            Err(Fault::Syntax(failure)) => {
                let failure = executor.strongest(failure);
                Err(Error::Syntax(ParseError::new(
                    input,
                    failure.offset,
                    failure.message,
                )))
            }
        }
    }
}

/// Compile a descriptor and parse a subject in one call.
///
/// Compilation is cheap but not free; callers parsing repeatedly should
/// compile once and reuse the [`Grammar`].
pub fn parse<'i>(
    descriptor: &Arc<Descriptor>,
    input: &'i [u8],
    options: &Options,
) -> Result<(usize, Value), Error<'i>> {
    let grammar = Grammar::compile_descriptor(descriptor)?;
    grammar.parse(input, options)
}

/// Compile a descriptor and render a value back to text in one call
pub fn emit(
    out: &mut dyn Write,
    descriptor: &Arc<Descriptor>,
    value: &Value,
) -> Result<(), Error<'static>> {
    let grammar = Grammar::compile_descriptor(descriptor)?;
    grammar.emit(out, value).map_err(Error::Emit)
}

/// Compile a descriptor and render a value onto a byte buffer in one call
pub fn append(
    buffer: Vec<u8>,
    descriptor: &Arc<Descriptor>,
    value: &Value,
) -> Result<Vec<u8>, Error<'static>> {
    let grammar = Grammar::compile_descriptor(descriptor)?;
    grammar.append(buffer, value).map_err(Error::Emit)
}
