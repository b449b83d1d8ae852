use crate::runtime::{EmitError, Value};
use std::fmt;
use std::io;
use std::sync::Arc;

/// A node of the declarative grammar tree.
///
/// Descriptors describe the *shape* of the values a grammar produces; the
/// compiler turns a descriptor tree into parser nodes. Constructors return
/// `Arc<Descriptor>` so trees can share subtrees freely.
pub struct Descriptor {
    name: String,
    kind: DescriptorKind,
}

/// The variants a [`Descriptor`] can take
pub enum DescriptorKind {
    /// Quoted string by default; a `literal` or `regexp` field option turns
    /// the slot into the corresponding terminal
    Str,

    /// Signed integer slot of the given bit width
    Int { bits: u32 },

    /// Unsigned integer slot of the given bit width
    Uint { bits: u32 },

    /// Floating point slot of the given bit width
    Float { bits: u32 },

    /// Boolean token slot
    Bool,

    /// Sequence of fields, parsed left to right
    Record { fields: Vec<Field> },

    /// Ordered choice over fields; the first matching field wins and its
    /// index is stored as the branch tag
    Choice { fields: Vec<Field> },

    /// Repetition; `parse:"+"` and `delimiter` field options configure it
    List { item: Arc<Descriptor> },

    /// Owned indirection; `parse:"?"` makes it optional
    Ptr { target: Arc<Descriptor> },

    /// User-implemented parser hook
    Custom { parser: Arc<dyn CustomParser> },

    /// Named reference, resolved against a [`DescriptorSet`]; this is how
    /// recursive grammars are expressed
    Rule { name: String },
}

impl Descriptor {
    fn build(name: impl Into<String>, kind: DescriptorKind) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            kind,
        })
    }

    /// Quoted string slot (raw or interpreted form)
    pub fn string() -> Arc<Self> {
        Self::build("string", DescriptorKind::Str)
    }

    /// Signed 8-bit integer slot
    pub fn int8() -> Arc<Self> {
        Self::build("i8", DescriptorKind::Int { bits: 8 })
    }

    /// Signed 16-bit integer slot
    pub fn int16() -> Arc<Self> {
        Self::build("i16", DescriptorKind::Int { bits: 16 })
    }

    /// Signed 32-bit integer slot; also accepts single-quoted character
    /// literals
    pub fn int32() -> Arc<Self> {
        Self::build("i32", DescriptorKind::Int { bits: 32 })
    }

    /// Signed 64-bit integer slot
    pub fn int64() -> Arc<Self> {
        Self::build("i64", DescriptorKind::Int { bits: 64 })
    }

    /// Unsigned 8-bit integer slot
    pub fn uint8() -> Arc<Self> {
        Self::build("u8", DescriptorKind::Uint { bits: 8 })
    }

    /// Unsigned 16-bit integer slot
    pub fn uint16() -> Arc<Self> {
        Self::build("u16", DescriptorKind::Uint { bits: 16 })
    }

    /// Unsigned 32-bit integer slot
    pub fn uint32() -> Arc<Self> {
        Self::build("u32", DescriptorKind::Uint { bits: 32 })
    }

    /// Unsigned 64-bit integer slot
    pub fn uint64() -> Arc<Self> {
        Self::build("u64", DescriptorKind::Uint { bits: 64 })
    }

    /// 32-bit float slot
    pub fn float32() -> Arc<Self> {
        Self::build("f32", DescriptorKind::Float { bits: 32 })
    }

    /// 64-bit float slot
    pub fn float64() -> Arc<Self> {
        Self::build("f64", DescriptorKind::Float { bits: 64 })
    }

    /// Boolean slot
    pub fn boolean() -> Arc<Self> {
        Self::build("bool", DescriptorKind::Bool)
    }

    /// Sequence of fields
    pub fn record(name: impl Into<String>, fields: Vec<Field>) -> Arc<Self> {
        Self::build(name, DescriptorKind::Record { fields })
    }

    /// Ordered choice over fields
    pub fn choice(name: impl Into<String>, fields: Vec<Field>) -> Arc<Self> {
        Self::build(name, DescriptorKind::Choice { fields })
    }

    /// Repetition over an item descriptor
    pub fn list(item: Arc<Descriptor>) -> Arc<Self> {
        Self::build("list", DescriptorKind::List { item })
    }

    /// Owned indirection over a target descriptor
    pub fn ptr(target: Arc<Descriptor>) -> Arc<Self> {
        Self::build("ptr", DescriptorKind::Ptr { target })
    }

    /// User-implemented parser hook
    pub fn custom(name: impl Into<String>, parser: impl CustomParser + 'static) -> Arc<Self> {
        Self::build(
            name,
            DescriptorKind::Custom {
                parser: Arc::new(parser),
            },
        )
    }

    /// Named reference into a [`DescriptorSet`]
    pub fn rule(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        Self::build(
            name.clone(),
            DescriptorKind::Rule { name },
        )
    }

    /// Get the descriptor's diagnostic name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the descriptor's variant
    pub fn kind(&self) -> &DescriptorKind {
        &self.kind
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Descriptor({})", self.name)
    }
}

/// One slot of a record or choice descriptor.
///
/// A field couples a descriptor with the small textual options of the
/// grammar language (`literal`, `regexp`, `parse:"…"`, `delimiter`, `set`).
/// Anonymous fields participate in parsing and emitting but carry no
/// storage.
pub struct Field {
    pub(crate) name: Option<String>,
    pub(crate) descriptor: Arc<Descriptor>,
    pub(crate) options: FieldOptions,
}

impl Field {
    /// Named field over a descriptor
    pub fn new(name: impl Into<String>, descriptor: Arc<Descriptor>) -> Self {
        Self {
            name: Some(name.into()),
            descriptor,
            options: FieldOptions::default(),
        }
    }

    /// Anonymous field over a descriptor (no storage)
    pub fn anon(descriptor: Arc<Descriptor>) -> Self {
        Self {
            name: None,
            descriptor,
            options: FieldOptions::default(),
        }
    }

    /// Named string field matching an anchored regular expression
    pub fn regexp(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(name, Descriptor::string()).with_regexp(pattern)
    }

    /// Anonymous exact-literal field; emitting writes the literal back
    pub fn literal(literal: impl Into<String>) -> Self {
        Self::anon(Descriptor::string()).with_literal(literal)
    }

    /// Match an exact literal (`literal` option)
    pub fn with_literal(mut self, literal: impl Into<String>) -> Self {
        self.options.literal = Some(literal.into());
        self
    }

    /// Match an anchored regular expression (`regexp` option)
    pub fn with_regexp(mut self, pattern: impl Into<String>) -> Self {
        self.options.regexp = Some(pattern.into());
        self
    }

    /// Repetition with zero minimum (`parse:"*"`, the default for lists)
    pub fn zero_or_more(mut self) -> Self {
        self.options.mode = Some(ParseMode::ZeroOrMore);
        self
    }

    /// Repetition with one minimum (`parse:"+"`)
    pub fn one_or_more(mut self) -> Self {
        self.options.mode = Some(ParseMode::OneOrMore);
        self
    }

    /// Optional pointer (`parse:"?"`)
    pub fn optional(mut self) -> Self {
        self.options.mode = Some(ParseMode::Optional);
        self
    }

    /// Positive lookahead (`parse:"&"`): test without consuming
    pub fn followed_by(mut self) -> Self {
        self.options.mode = Some(ParseMode::FollowedBy);
        self
    }

    /// Negative lookahead (`parse:"!"`): succeed only when the child fails
    pub fn not_any(mut self) -> Self {
        self.options.mode = Some(ParseMode::NotAny);
        self
    }

    /// Omit the field from the grammar entirely (`parse:"skip"`)
    pub fn skip(mut self) -> Self {
        self.options.mode = Some(ParseMode::Skip);
        self
    }

    /// Capture the current byte offset into an integer slot (`parse:"#"`)
    pub fn position(mut self) -> Self {
        self.options.mode = Some(ParseMode::Position);
        self
    }

    /// Literal separating repetition elements (`delimiter` option)
    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.options.delimiter = Some(delimiter.into());
        self
    }

    /// Post-parse callback (`set` option), invoked with the parsed value on
    /// field success; an error aborts the parse at the field's end offset
    pub fn set(
        mut self,
        name: impl Into<String>,
        callback: impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.options.set = Some(Callback {
            name: name.into(),
            callback: Arc::new(callback),
        });
        self
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn descriptor(&self) -> &Arc<Descriptor> {
        &self.descriptor
    }

    pub(crate) fn options(&self) -> &FieldOptions {
        &self.options
    }
}

/// The option map attached to a field (the grammar language's struct tags)
#[derive(Default, Clone)]
pub struct FieldOptions {
    pub(crate) literal: Option<String>,
    pub(crate) regexp: Option<String>,
    pub(crate) mode: Option<ParseMode>,
    pub(crate) delimiter: Option<String>,
    pub(crate) set: Option<Callback>,
}

/// The `parse:"…"` option values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseMode {
    /// `*`: repetition, min 0
    ZeroOrMore,
    /// `+`: repetition, min 1
    OneOrMore,
    /// `?`: optional pointer
    Optional,
    /// `&`: positive lookahead
    FollowedBy,
    /// `!`: negative lookahead
    NotAny,
    /// `skip`: omit from the grammar
    Skip,
    /// `#`: capture the byte offset
    Position,
}

/// Post-parse callback attached to a field through the `set` option
#[derive(Clone)]
pub struct Callback {
    pub(crate) name: String,
    pub(crate) callback: Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>,
}

impl Callback {
    pub(crate) fn call(&self, value: &Value) -> Result<(), String> {
        (self.callback)(value)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Callback({})", self.name)
    }
}

/// Failure reported by a [`CustomParser`]
#[derive(Debug)]
pub enum CustomFailure {
    /// Structured failure: the engine adopts the offset and message verbatim
    Located { offset: usize, message: String },

    /// Bare message; the engine anchors it at the call offset
    Message(String),
}

/// User-implemented parser capability.
///
/// A descriptor built with [`Descriptor::custom`] short-circuits compilation
/// to a node that delegates both directions to this trait.
pub trait CustomParser: Send + Sync {
    /// Recognize input starting at `offset`; return the new offset and the
    /// produced value
    fn parse(&self, input: &[u8], offset: usize) -> Result<(usize, Value), CustomFailure>;

    /// Render a previously parsed value back to text
    fn emit(&self, out: &mut dyn io::Write, value: &Value) -> Result<(), EmitError>;
}

/// Name-keyed rule registry, the unit recursive grammars are defined in.
///
/// `Descriptor::rule("expr")` references resolve against the set given to
/// [`Grammar::compile`](`crate::compiler::Grammar::compile`).
#[derive(Default)]
pub struct DescriptorSet {
    rules: Vec<(String, Arc<Descriptor>)>,
}

impl DescriptorSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Define (or redefine) a rule
    pub fn define(&mut self, name: impl Into<String>, descriptor: Arc<Descriptor>) -> &mut Self {
        let name = name.into();
        if let Some(slot) = self.rules.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = descriptor;
        } else {
            self.rules.push((name, descriptor));
        }
        self
    }

    /// Look a rule up by name
    pub fn get(&self, name: &str) -> Option<&Arc<Descriptor>> {
        self.rules
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d)
    }
}
