//! The parse engine.
//!
//! `Executor::drive` is the only way a parser node gets invoked: it skips
//! whitespace, consults the packrat table, and dispatches. The table is
//! keyed by (node id, offset) and doubles as the left-recursion engine:
//! when a node re-enters itself at the same offset, a failure seed is
//! installed and the rule is re-parsed until its result stops advancing
//! (iterative seed growing).

use crate::compiler::{
    CompiledField, CustomFailure, Grammar, GrammarError, LrState, NodeKind, NodeRef, ParserNode,
    FIELD_FOLLOWED_BY, FIELD_NOT_ANY,
};

use super::data::Value;
use super::errors::Failure;
use super::primitives;
use super::skip::Skipper;
use super::Options;

use std::collections::{HashMap, HashSet};

/// Message of the failure seed installed when left recursion is detected
const SEED_MESSAGE: &str = "Left recursion seed";

/// A failure the engine can propagate
pub(crate) enum Fault {
    /// Recoverable: ordered choice, optional pointers and repetition
    /// consume these
    Syntax(Failure),

    /// Fatal: the grammar is broken, abort the whole parse
    Fatal(GrammarError),
}

pub(crate) type Step = Result<(usize, Value), Fault>;

enum MemoState {
    /// Inserted before the first descent; hitting it means recursion
    Probing,

    /// Left-recursion seed installed, iteration in progress
    Seeded,

    /// Authoritative, reusable any number of times
    Final,
}

struct MemoEntry {
    state: MemoState,

    /// 0 until left recursion is observed beneath the owning invocation
    level: u32,

    result: Result<(usize, Value), Failure>,
}

pub(crate) struct Executor<'g, 'i> {
    grammar: &'g Grammar,
    input: &'i [u8],
    skip: Option<Skipper>,
    packrat: bool,
    debug: bool,

    memo: HashMap<(u64, usize), MemoEntry>,

    /// Offsets at which left recursion was observed during this parse
    recursion_seen: HashSet<usize>,

    /// The failure furthest into the input seen so far
    furthest: Option<Failure>,
}

impl<'g, 'i> Executor<'g, 'i> {
    pub(crate) fn new(grammar: &'g Grammar, input: &'i [u8], options: &Options) -> Self {
        Self {
            grammar,
            input,
            skip: options.skip.clone(),
            packrat: options.packrat,
            debug: options.debug,
            memo: HashMap::new(),
            recursion_seen: HashSet::new(),
            furthest: None,
        }
    }

    /// Pick the better of the propagated failure and the furthest record
    pub(crate) fn strongest(&mut self, failure: Failure) -> Failure {
        match self.furthest.take() {
            Some(best) if best.offset > failure.offset => best,
            _ => failure,
        }
    }

    fn skip_ws(&self, offset: usize) -> usize {
        match &self.skip {
            Some(skip) => {
                let next = skip(self.input, offset);
                if next >= offset && next <= self.input.len() {
                    next
                } else {
                    offset
                }
            }
            None => offset,
        }
    }

    /// Record a recoverable failure and wrap it for propagation
    fn fail(&mut self, failure: Failure) -> Fault {
        let further = self
            .furthest
            .as_ref()
            .map_or(true, |best| failure.offset > best.offset);
        if further {
            self.furthest = Some(failure.clone());
        }

        Fault::Syntax(failure)
    }

    /// Invoke a node at an offset.
    ///
    /// The packrat table is consulted *here*, before dispatching; nodes
    /// never query it themselves. Rules proven non-left-recursive bypass
    /// the table entirely when packrat is off.
    pub(crate) fn drive(&mut self, node: NodeRef, offset: usize) -> Step {
        let grammar = self.grammar;
        let node = grammar.resolve(node);
        let offset = self.skip_ws(offset);
        let parser = grammar.node(node);

        if parser.lr == LrState::NonRecursive && !self.packrat {
            return self.run(parser, offset);
        }

        let key = (parser.id, offset);
        if let Some(entry) = self.memo.get_mut(&key) {
            match entry.state {
                MemoState::Final | MemoState::Seeded => {
                    return match entry.result.clone() {
                        Ok(ok) => Ok(ok),
                        Err(failure) => Err(Fault::Syntax(failure)),
                    };
                }
                MemoState::Probing => {
                    // The node re-entered itself at this offset: install the
                    // failure seed and answer with it
                    entry.state = MemoState::Seeded;
                    entry.level = 1;
                    entry.result = Err(Failure::new(offset, SEED_MESSAGE));
                    self.recursion_seen.insert(offset);
                    return Err(Fault::Syntax(Failure::new(offset, SEED_MESSAGE)));
                }
            }
        }

        self.memo.insert(
            key,
            MemoEntry {
                state: MemoState::Probing,
                level: 0,
                result: Err(Failure::new(offset, SEED_MESSAGE)),
            },
        );

        let first = self.run(parser, offset);

        if let Err(Fault::Fatal(_)) = first {
            self.memo.remove(&key);
            return first;
        }

        let level = self.memo.get(&key).map(|entry| entry.level).unwrap_or(0);

        if level == 0 {
            // No left recursion happened beneath this invocation. The entry
            // is reusable only if packrat is on and no *other* rule saw
            // recursion here; otherwise later traversals must re-explore.
            if self.packrat && !self.recursion_seen.contains(&offset) {
                if let Some(entry) = self.memo.get_mut(&key) {
                    entry.state = MemoState::Final;
                    entry.result = soften(&first);
                }
            } else {
                self.memo.remove(&key);
            }
            return first;
        }

        // Left recursion was observed: grow the seed until it stops
        // advancing. A failed first attempt still seeds the iteration.
        self.recursion_seen.insert(offset);

        let mut seed: Result<(usize, Value), Failure> = match first {
            Ok(ok) => Ok(ok),
            Err(Fault::Syntax(failure)) => Err(failure),
            // Fatal faults returned above
            Err(fault) => return Err(fault),
        };

        loop {
            if let Some(entry) = self.memo.get_mut(&key) {
                entry.state = MemoState::Seeded;
                entry.result = seed.clone();
            }

            match self.run(parser, offset) {
                Err(Fault::Fatal(e)) => {
                    self.memo.remove(&key);
                    return Err(Fault::Fatal(e));
                }
                // A failed re-parse keeps the seed
                Err(Fault::Syntax(_)) => break,
                Ok((end, value)) => {
                    let grew = match &seed {
                        Ok((seed_end, _)) => end > *seed_end,
                        Err(_) => true,
                    };
                    if grew {
                        seed = Ok((end, value));
                    } else {
                        break;
                    }
                }
            }
        }

        if let Some(entry) = self.memo.get_mut(&key) {
            entry.state = MemoState::Final;
            entry.result = seed.clone();
        }

        match seed {
            Ok(ok) => Ok(ok),
            Err(failure) => Err(Fault::Syntax(failure)),
        }
    }

    fn run(&mut self, parser: &'g ParserNode, offset: usize) -> Step {
        let result = self.dispatch(parser, offset);

        if self.debug {
            match &result {
                Ok((end, _)) => eprintln!(
                    "OK [{} -> {}] {}{}",
                    offset,
                    end,
                    if parser.is_terminal() { "" } else { "+" },
                    parser.name
                ),
                Err(_) => eprintln!("ER [{}] {}", offset, parser.name),
            }
        }

        result
    }

    fn dispatch(&mut self, parser: &'g ParserNode, offset: usize) -> Step {
        let input = self.input;

        match &parser.kind {
            NodeKind::Literal { bytes, message } => {
                if primitives::str_at(input, offset, bytes) {
                    Ok((offset + bytes.len(), Value::Str(bytes.clone())))
                } else {
                    Err(self.fail(Failure::new(offset, message.clone())))
                }
            }

            NodeKind::Regex { regex, message, .. } => match regex.find(&input[offset..]) {
                Some(m) => Ok((offset + m.end(), Value::Str(m.as_bytes().to_vec()))),
                None => Err(self.fail(Failure::new(offset, message.clone()))),
            },

            NodeKind::Int { bits } => {
                // A 32-bit slot also accepts a character literal
                if *bits == 32 && offset < input.len() && input[offset] == b'\'' {
                    match primitives::parse_char_literal(input, offset) {
                        Ok((code, end)) => Ok((end, Value::Int(i64::from(code as i32)))),
                        Err(failure) => Err(self.fail(failure)),
                    }
                } else {
                    match primitives::parse_int(input, offset, *bits) {
                        Ok((value, end)) => Ok((end, Value::Int(value))),
                        Err(failure) => Err(self.fail(failure)),
                    }
                }
            }

            NodeKind::Uint { bits } => match primitives::parse_uint(input, offset, *bits) {
                Ok((value, end)) => Ok((end, Value::Uint(value))),
                Err(failure) => Err(self.fail(failure)),
            },

            NodeKind::Float { bits } => match primitives::parse_float(input, offset, *bits) {
                Ok((value, end)) => Ok((end, Value::Float(value))),
                Err(failure) => Err(self.fail(failure)),
            },

            NodeKind::Bool => match primitives::parse_bool(input, offset) {
                Ok((value, end)) => Ok((end, Value::Bool(value))),
                Err(failure) => Err(self.fail(failure)),
            },

            NodeKind::QuotedStr => match primitives::parse_quoted(input, offset) {
                Ok((bytes, end)) => Ok((end, Value::Str(bytes))),
                Err(failure) => Err(self.fail(failure)),
            },

            NodeKind::Position { signed } => Ok((
                offset,
                if *signed {
                    Value::Int(offset as i64)
                } else {
                    Value::Uint(offset as u64)
                },
            )),

            NodeKind::Custom { parser: custom } => match custom.parse(input, offset) {
                Ok((end, value)) => {
                    if end > input.len() || end < offset {
                        return Err(Fault::Fatal(GrammarError::CustomParserRange(
                            parser.name.clone(),
                        )));
                    }
                    Ok((end, value))
                }
                Err(CustomFailure::Located { offset, message }) => {
                    Err(self.fail(Failure::new(offset, message)))
                }
                Err(CustomFailure::Message(message)) => {
                    Err(self.fail(Failure::new(offset, message)))
                }
            },

            NodeKind::Sequence { fields } => {
                let mut slots = Vec::new();
                let mut loc = offset;

                for field in fields {
                    let (next, value) = self.parse_field(field, loc)?;
                    if field.slot.is_some() {
                        slots.push(
                            value.unwrap_or_else(|| self.grammar.default_value(field.parser)),
                        );
                    }
                    loc = next;
                }

                Ok((loc, Value::Record(slots)))
            }

            NodeKind::FirstOf { fields } => {
                let mut best = Failure::new(offset, "No choices in first of");

                for (index, field) in fields.iter().enumerate() {
                    match self.parse_field(field, offset) {
                        Ok((next, value)) => {
                            let payload = value
                                .unwrap_or_else(|| self.grammar.default_value(field.parser));
                            return Ok((
                                next,
                                Value::Choice(Some((index as u32, Box::new(payload)))),
                            ));
                        }
                        Err(Fault::Fatal(e)) => return Err(Fault::Fatal(e)),
                        // The furthest branch failure wins; ties go to the
                        // later branch
                        Err(Fault::Syntax(failure)) => {
                            if failure.offset >= best.offset {
                                best = failure;
                            }
                        }
                    }
                }

                Err(self.fail(best))
            }

            NodeKind::Repeat {
                item,
                min,
                delimiter,
            } => {
                let mut items = Vec::new();
                let mut loc = offset;

                loop {
                    match self.drive(*item, loc) {
                        Err(Fault::Fatal(e)) => return Err(Fault::Fatal(e)),
                        Err(Fault::Syntax(failure)) => {
                            return if items.len() >= *min {
                                Ok((loc, Value::List(items)))
                            } else {
                                Err(Fault::Syntax(failure))
                            };
                        }
                        Ok((next, value)) => {
                            if next <= loc {
                                return Err(Fault::Fatal(GrammarError::EmptyRepetition(
                                    parser.name.clone(),
                                )));
                            }

                            loc = next;
                            items.push(value);

                            if let Some(delimiter) = delimiter {
                                let at = self.skip_ws(loc);

                                if primitives::str_at(input, at, delimiter) {
                                    loc = self.skip_ws(at + delimiter.len());
                                } else {
                                    // At least one element is in; a missing
                                    // delimiter just ends the repetition
                                    return Ok((at, Value::List(items)));
                                }
                            }
                        }
                    }
                }
            }

            NodeKind::Pointer { target, optional } => match self.drive(*target, offset) {
                Ok((end, value)) => Ok((end, Value::Ptr(Some(Box::new(value))))),
                Err(Fault::Fatal(e)) => Err(Fault::Fatal(e)),
                Err(failure) => {
                    if *optional {
                        Ok((offset, Value::Ptr(None)))
                    } else {
                        Err(failure)
                    }
                }
            },

            NodeKind::Proxy { .. } => unreachable!("proxies are resolved before dispatch"),
        }
    }

    /// Run one field of a sequence or ordered choice.
    ///
    /// Lookahead fields restore the offset regardless of outcome; `!`
    /// inverts success and failure. Ordinary fields run their post-parse
    /// callback and then skip whitespace.
    fn parse_field(
        &mut self,
        field: &CompiledField,
        offset: usize,
    ) -> Result<(usize, Option<Value>), Fault> {
        let result = self.drive(field.parser, offset);

        if field.flags & FIELD_NOT_ANY != 0 {
            return match result {
                Ok(_) => {
                    let name = self
                        .grammar
                        .node(self.grammar.resolve(field.parser))
                        .name
                        .clone();
                    Err(self.fail(Failure::new(offset, format!("Unexpected input: {}", name))))
                }
                Err(Fault::Fatal(e)) => Err(Fault::Fatal(e)),
                Err(Fault::Syntax(_)) => Ok((offset, None)),
            };
        }

        if field.flags & FIELD_FOLLOWED_BY != 0 {
            let (_, value) = result?;
            return Ok((offset, Some(value)));
        }

        let (end, value) = result?;

        if let Some(callback) = &field.set {
            if let Err(message) = callback.call(&value) {
                return Err(self.fail(Failure::new(end, format!("Set failed: {}", message))));
            }
        }

        Ok((self.skip_ws(end), Some(value)))
    }
}

fn soften(step: &Step) -> Result<(usize, Value), Failure> {
    match step {
        Ok(ok) => Ok(ok.clone()),
        Err(Fault::Syntax(failure)) => Err(failure.clone()),
        Err(Fault::Fatal(_)) => unreachable!("fatal faults are never memoized"),
    }
}
