use super::descriptor::{Callback, CustomParser};
use crate::runtime::Value;
use regex::bytes::Regex;
use std::sync::Arc;

/// Index of a parser node inside a [`Grammar`]'s arena
pub(crate) type NodeRef = u32;

/// Flag: the field is a negative lookahead (`parse:"!"`)
pub(crate) const FIELD_NOT_ANY: u8 = 1;

/// Flag: the field is a positive lookahead (`parse:"&"`)
pub(crate) const FIELD_FOLLOWED_BY: u8 = 2;

/// A compiled grammar: an arena of parser nodes plus the root.
///
/// Immutable once `compile` returns (the left-recursion analysis runs inside
/// compilation), so a single compiled grammar can serve any number of
/// concurrent parse calls; all per-call state lives in the call.
#[derive(Debug)]
pub struct Grammar {
    nodes: Vec<ParserNode>,
    root: NodeRef,
}

impl Grammar {
    pub(crate) fn assemble(nodes: Vec<ParserNode>, root: NodeRef) -> Self {
        Self { nodes, root }
    }

    pub(crate) fn root(&self) -> NodeRef {
        self.root
    }

    pub(crate) fn node(&self, node: NodeRef) -> &ParserNode {
        &self.nodes[node as usize]
    }

    /// Follow proxy indirections down to the concrete node
    pub(crate) fn resolve(&self, mut node: NodeRef) -> NodeRef {
        loop {
            match &self.node(node).kind {
                NodeKind::Proxy { target } => node = *target,
                _ => return node,
            }
        }
    }

    /// Zero value for the storage a node fills, used for slots whose field
    /// never ran (negative lookahead) and for anonymous choice branches
    pub(crate) fn default_value(&self, node: NodeRef) -> Value {
        match &self.node(self.resolve(node)).kind {
            NodeKind::Bool => Value::Bool(false),
            NodeKind::Int { .. } => Value::Int(0),
            NodeKind::Position { signed: true } => Value::Int(0),
            NodeKind::Uint { .. } => Value::Uint(0),
            NodeKind::Position { signed: false } => Value::Uint(0),
            NodeKind::Float { .. } => Value::Float(0.0),
            NodeKind::Literal { .. }
            | NodeKind::Regex { .. }
            | NodeKind::QuotedStr
            | NodeKind::Custom { .. } => Value::Str(Vec::new()),
            NodeKind::Sequence { fields } => Value::Record(
                fields
                    .iter()
                    .filter(|f| f.slot.is_some())
                    .map(|f| self.default_value(f.parser))
                    .collect(),
            ),
            NodeKind::FirstOf { .. } => Value::Choice(None),
            NodeKind::Repeat { .. } => Value::List(Vec::new()),
            NodeKind::Pointer { .. } => Value::Ptr(None),
            NodeKind::Proxy { .. } => unreachable!("proxies resolve to concrete nodes"),
        }
    }
}

/// Left-recursion classification of a node, set by the analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LrState {
    Unknown,
    NonRecursive,
    Recursive,
}

/// One compiled parser node
#[derive(Debug)]
pub(crate) struct ParserNode {
    /// Process-wide unique identifier; the packrat table key
    pub(crate) id: u64,

    /// Diagnostic name
    pub(crate) name: String,

    /// Left-recursion classification
    pub(crate) lr: LrState,

    pub(crate) kind: NodeKind,
}

impl ParserNode {
    /// A terminal node has no child parsers
    pub(crate) fn is_terminal(&self) -> bool {
        !matches!(
            self.kind,
            NodeKind::Sequence { .. }
                | NodeKind::FirstOf { .. }
                | NodeKind::Repeat { .. }
                | NodeKind::Pointer { .. }
                | NodeKind::Proxy { .. }
        )
    }
}

/// The parser-node variants
pub(crate) enum NodeKind {
    /// Exact byte sequence
    Literal { bytes: Vec<u8>, message: String },

    /// Anchored regular expression
    Regex {
        pattern: String,
        regex: Regex,
        message: String,
    },

    /// Signed integer of the given width; 32-bit slots also accept
    /// single-quoted character literals
    Int { bits: u32 },

    /// Unsigned integer of the given width
    Uint { bits: u32 },

    /// Float of the given width
    Float { bits: u32 },

    /// `true` / `false` token
    Bool,

    /// Raw (backtick) or interpreted (double-quoted) string
    QuotedStr,

    /// Captures the byte offset without consuming input
    Position { signed: bool },

    /// User-implemented parser hook
    Custom { parser: Arc<dyn CustomParser> },

    /// Fields parsed left to right
    Sequence { fields: Vec<CompiledField> },

    /// Ordered choice; stores the winning branch index
    FirstOf { fields: Vec<CompiledField> },

    /// Repetition with optional delimiter literal
    Repeat {
        item: NodeRef,
        min: usize,
        delimiter: Option<Vec<u8>>,
    },

    /// Owned indirection, possibly optional
    Pointer { target: NodeRef, optional: bool },

    /// Placeholder inserted while a cyclic descriptor compiles; rewired to
    /// the concrete node afterwards
    Proxy { target: NodeRef },
}

impl std::fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Literal { bytes, message } => f
                .debug_struct("Literal")
                .field("bytes", bytes)
                .field("message", message)
                .finish(),
            NodeKind::Regex {
                pattern,
                regex,
                message,
            } => f
                .debug_struct("Regex")
                .field("pattern", pattern)
                .field("regex", regex)
                .field("message", message)
                .finish(),
            NodeKind::Int { bits } => f.debug_struct("Int").field("bits", bits).finish(),
            NodeKind::Uint { bits } => f.debug_struct("Uint").field("bits", bits).finish(),
            NodeKind::Float { bits } => f.debug_struct("Float").field("bits", bits).finish(),
            NodeKind::Bool => f.debug_struct("Bool").finish(),
            NodeKind::QuotedStr => f.debug_struct("QuotedStr").finish(),
            NodeKind::Position { signed } => {
                f.debug_struct("Position").field("signed", signed).finish()
            }
            NodeKind::Custom { .. } => f.debug_struct("Custom").finish_non_exhaustive(),
            NodeKind::Sequence { fields } => f
                .debug_struct("Sequence")
                .field("fields", fields)
                .finish(),
            NodeKind::FirstOf { fields } => {
                f.debug_struct("FirstOf").field("fields", fields).finish()
            }
            NodeKind::Repeat {
                item,
                min,
                delimiter,
            } => f
                .debug_struct("Repeat")
                .field("item", item)
                .field("min", min)
                .field("delimiter", delimiter)
                .finish(),
            NodeKind::Pointer { target, optional } => f
                .debug_struct("Pointer")
                .field("target", target)
                .field("optional", optional)
                .finish(),
            NodeKind::Proxy { target } => {
                f.debug_struct("Proxy").field("target", target).finish()
            }
        }
    }
}

/// One compiled field of a sequence or ordered choice
#[derive(Debug)]
pub(crate) struct CompiledField {
    /// Field name, `_` when anonymous
    pub(crate) name: String,

    /// Storage slot index; `None` for anonymous fields
    pub(crate) slot: Option<u32>,

    pub(crate) parser: NodeRef,

    /// `FIELD_NOT_ANY` / `FIELD_FOLLOWED_BY`
    pub(crate) flags: u8,

    /// Post-parse callback from the `set` option
    pub(crate) set: Option<Callback>,
}
