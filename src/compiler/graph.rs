use super::analysis;
use super::data::*;
use super::descriptor::{Descriptor, DescriptorKind, DescriptorSet, Field, FieldOptions, ParseMode};
use super::errors::GrammarError;
use lazy_static::lazy_static;
use regex::bytes::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Parser identifiers are unique process-wide and stable for the lifetime of
/// the compiled grammar
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

lazy_static! {
    /// Shared cache of compiled patterns; consulted only while compiling, so
    /// parse calls never touch the lock
    static ref PATTERNS: Mutex<HashMap<String, Regex>> = Mutex::new(HashMap::new());
}

/// Compile an anchored pattern, reusing the process-wide cache
pub(crate) fn compile_pattern(pattern: &str) -> Result<Regex, GrammarError> {
    let mut cache = match PATTERNS.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    if let Some(regex) = cache.get(pattern) {
        return Ok(regex.clone());
    }

    let regex =
        Regex::new(&format!("^(?:{})", pattern)).map_err(|source| GrammarError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })?;

    cache.insert(pattern.to_string(), regex.clone());
    Ok(regex)
}

impl Grammar {
    /// Compile the named rule of a descriptor set.
    ///
    /// This is the entry point for recursive grammars: `Descriptor::rule`
    /// references anywhere below `root` resolve against `set`.
    pub fn compile(set: &DescriptorSet, root: &str) -> Result<Self, GrammarError> {
        let descriptor = set
            .get(root)
            .cloned()
            .ok_or_else(|| GrammarError::UnknownRule(root.to_string()))?;

        Builder::build(Some(set), &descriptor)
    }

    /// Compile a standalone descriptor tree (no rule references)
    pub fn compile_descriptor(descriptor: &Arc<Descriptor>) -> Result<Self, GrammarError> {
        Builder::build(None, descriptor)
    }
}

/// The subset of field options that shapes the compiled node; two fields
/// sharing a descriptor and these options share one node.
///
/// Only the options the descriptor kind consumes take part in the key. A
/// record referenced both directly and through an optional pointer must
/// resolve to one node, or cyclic grammars would split into duplicates.
#[derive(PartialEq, Eq, Hash, Clone, Default)]
struct NodeOptions {
    literal: Option<String>,
    regexp: Option<String>,
    mode: Option<ParseMode>,
    delimiter: Option<String>,
}

impl NodeOptions {
    fn of(descriptor: &Descriptor, options: &FieldOptions) -> Self {
        let mut key = NodeOptions::default();

        match descriptor.kind() {
            DescriptorKind::Str => {
                key.literal = options.literal.clone();
                key.regexp = options.regexp.clone();
            }
            DescriptorKind::Int { .. } | DescriptorKind::Uint { .. } => {
                if options.mode == Some(ParseMode::Position) {
                    key.mode = options.mode;
                }
            }
            DescriptorKind::List { .. } => {
                if let Some(mode @ (ParseMode::ZeroOrMore | ParseMode::OneOrMore)) = options.mode {
                    key.mode = Some(mode);
                }
                key.delimiter = options.delimiter.clone();
            }
            // The whole option set travels through a pointer to its target
            DescriptorKind::Ptr { .. } => {
                key.literal = options.literal.clone();
                key.regexp = options.regexp.clone();
                key.delimiter = options.delimiter.clone();
                if let Some(
                    mode @ (ParseMode::ZeroOrMore
                    | ParseMode::OneOrMore
                    | ParseMode::Optional
                    | ParseMode::Position),
                ) = options.mode
                {
                    key.mode = Some(mode);
                }
            }
            _ => {}
        }

        key
    }
}

type CacheKey = (usize, NodeOptions);

/// Placeholder target of a proxy that is still being compiled
const PENDING: NodeRef = NodeRef::MAX;

struct Builder<'a> {
    set: Option<&'a DescriptorSet>,
    nodes: Vec<ParserNode>,
    cache: HashMap<CacheKey, NodeRef>,
}

impl<'a> Builder<'a> {
    fn build(
        set: Option<&'a DescriptorSet>,
        descriptor: &Arc<Descriptor>,
    ) -> Result<Grammar, GrammarError> {
        let mut builder = Builder {
            set,
            nodes: Vec::new(),
            cache: HashMap::new(),
        };

        let root = builder.descriptor(descriptor, &FieldOptions::default())?;
        analysis::classify(&mut builder.nodes);

        Ok(Grammar::assemble(builder.nodes, root))
    }

    fn push(&mut self, name: impl Into<String>, kind: NodeKind) -> NodeRef {
        let node = self.nodes.len() as NodeRef;
        self.nodes.push(ParserNode {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            lr: LrState::Unknown,
            kind,
        });
        node
    }

    /// Memoized compilation of one (descriptor, options) pair.
    ///
    /// A proxy placeholder is inserted into the cache before descending into
    /// children, so a descriptor that (transitively) references itself finds
    /// the proxy and the cycle is broken. Once the concrete node exists the
    /// proxy is rewired to forward to it and the cache entry is replaced;
    /// references already taken keep going through the proxy.
    fn descriptor(
        &mut self,
        descriptor: &Arc<Descriptor>,
        options: &FieldOptions,
    ) -> Result<NodeRef, GrammarError> {
        if let DescriptorKind::Rule { name } = descriptor.kind() {
            let resolved = self
                .set
                .and_then(|set| set.get(name))
                .cloned()
                .ok_or_else(|| GrammarError::UnknownRule(name.clone()))?;
            return self.descriptor(&resolved, options);
        }

        let key = (
            Arc::as_ptr(descriptor) as *const () as usize,
            NodeOptions::of(descriptor, options),
        );

        if let Some(&cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let proxy = self.push(
            format!("proxy({})", descriptor.name()),
            NodeKind::Proxy { target: PENDING },
        );
        self.cache.insert(key.clone(), proxy);

        let node = match self.kind(descriptor, options) {
            Ok(node) => node,
            Err(err) => {
                self.cache.remove(&key);
                return Err(err);
            }
        };

        self.nodes[proxy as usize].kind = NodeKind::Proxy { target: node };
        self.cache.insert(key, node);

        Ok(node)
    }

    fn kind(
        &mut self,
        descriptor: &Arc<Descriptor>,
        options: &FieldOptions,
    ) -> Result<NodeRef, GrammarError> {
        match descriptor.kind() {
            DescriptorKind::Str => {
                if let Some(pattern) = &options.regexp {
                    let regex = compile_pattern(pattern)?;
                    Ok(self.push(
                        format!("/{}/", pattern),
                        NodeKind::Regex {
                            pattern: pattern.clone(),
                            regex,
                            message: format!("Waiting for /{}/", pattern),
                        },
                    ))
                } else if let Some(literal) = &options.literal {
                    Ok(self.push(
                        format!("'{}'", literal),
                        NodeKind::Literal {
                            bytes: literal.clone().into_bytes(),
                            message: format!("Waiting for '{}'", literal),
                        },
                    ))
                } else {
                    Ok(self.push("string", NodeKind::QuotedStr))
                }
            }

            DescriptorKind::Int { bits } => {
                self.reject_text_options(descriptor, options)?;
                if options.mode == Some(ParseMode::Position) {
                    Ok(self.push("position", NodeKind::Position { signed: true }))
                } else {
                    Ok(self.push(descriptor.name(), NodeKind::Int { bits: *bits }))
                }
            }

            DescriptorKind::Uint { bits } => {
                self.reject_text_options(descriptor, options)?;
                if options.mode == Some(ParseMode::Position) {
                    Ok(self.push("position", NodeKind::Position { signed: false }))
                } else {
                    Ok(self.push(descriptor.name(), NodeKind::Uint { bits: *bits }))
                }
            }

            DescriptorKind::Float { bits } => {
                self.reject_text_options(descriptor, options)?;
                Ok(self.push(descriptor.name(), NodeKind::Float { bits: *bits }))
            }

            DescriptorKind::Bool => {
                self.reject_text_options(descriptor, options)?;
                Ok(self.push("bool", NodeKind::Bool))
            }

            DescriptorKind::Record { fields } => {
                let fields = self.fields(fields)?;
                Ok(self.push(descriptor.name(), NodeKind::Sequence { fields }))
            }

            DescriptorKind::Choice { fields } => {
                let fields = self.fields(fields)?;
                Ok(self.push(descriptor.name(), NodeKind::FirstOf { fields }))
            }

            DescriptorKind::List { item } => {
                let min = if options.mode == Some(ParseMode::OneOrMore) {
                    1
                } else {
                    0
                };
                let delimiter = options.delimiter.clone().map(String::into_bytes);

                // Elements are compiled bare; their own options live on the
                // item descriptor's fields
                let item = self.descriptor(item, &FieldOptions::default())?;

                let name = format!("[{}]", self.nodes[self.resolve_built(item) as usize].name);
                Ok(self.push(
                    name,
                    NodeKind::Repeat {
                        item,
                        min,
                        delimiter,
                    },
                ))
            }

            DescriptorKind::Ptr { target } => {
                // The whole option set travels through the pointer, so
                // `*string` with a `regexp` option compiles the inner regex
                let target = self.descriptor(target, options)?;
                let optional = options.mode == Some(ParseMode::Optional);
                let name = format!("*{}", self.nodes[self.resolve_built(target) as usize].name);
                Ok(self.push(name, NodeKind::Pointer { target, optional }))
            }

            DescriptorKind::Custom { parser } => Ok(self.push(
                descriptor.name(),
                NodeKind::Custom {
                    parser: parser.clone(),
                },
            )),

            DescriptorKind::Rule { .. } => {
                unreachable!("rule references are resolved before node construction")
            }
        }
    }

    fn fields(&mut self, fields: &[Field]) -> Result<Vec<CompiledField>, GrammarError> {
        let mut compiled = Vec::new();
        let mut next_slot = 0u32;

        for field in fields {
            if field.options().mode == Some(ParseMode::Skip) {
                continue;
            }

            let mut flags = 0u8;
            match field.options().mode {
                Some(ParseMode::NotAny) => flags |= FIELD_NOT_ANY,
                Some(ParseMode::FollowedBy) => flags |= FIELD_FOLLOWED_BY,
                _ => {}
            }

            let slot = field.name().map(|_| {
                let slot = next_slot;
                next_slot += 1;
                slot
            });

            let parser = self.descriptor(field.descriptor(), field.options())?;

            compiled.push(CompiledField {
                name: field.name().unwrap_or("_").to_string(),
                slot,
                parser,
                flags,
                set: field.options().set.clone(),
            });
        }

        Ok(compiled)
    }

    /// `literal` and `regexp` only make sense for string slots (possibly
    /// behind a pointer)
    fn reject_text_options(
        &self,
        descriptor: &Arc<Descriptor>,
        options: &FieldOptions,
    ) -> Result<(), GrammarError> {
        let option = if options.literal.is_some() {
            "literal"
        } else if options.regexp.is_some() {
            "regexp"
        } else {
            return Ok(());
        };

        Err(GrammarError::InvalidOption {
            option,
            descriptor: descriptor.name().to_string(),
        })
    }

    /// Builder-time proxy resolution, for diagnostic names
    fn resolve_built(&self, mut node: NodeRef) -> NodeRef {
        loop {
            match &self.nodes[node as usize].kind {
                NodeKind::Proxy { target } if *target != PENDING => node = *target,
                _ => return node,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn pattern_cache_round_trips() {
        let a = compile_pattern("[0-9]+").unwrap();
        let b = compile_pattern("[0-9]+").unwrap();
        assert_eq!(a.as_str(), b.as_str());
        assert!(a.is_match(b"42"));
        assert!(!a.is_match(b"x42"));
    }

    #[test]
    fn patterns_anchor_the_whole_alternation() {
        let re = compile_pattern("foo|bar").unwrap();
        assert!(re.find(b"bar").is_some());
        assert!(re.find(b"xbar").is_none());
    }

    #[test]
    fn invalid_pattern_is_a_grammar_error() {
        assert_matches!(
            compile_pattern("[unclosed"),
            Err(GrammarError::InvalidRegex { .. })
        );
    }

    #[test]
    fn unknown_rule_is_a_grammar_error() {
        let set = DescriptorSet::new();
        assert_matches!(
            Grammar::compile(&set, "missing"),
            Err(GrammarError::UnknownRule(name)) if name == "missing"
        );

        let loose = Descriptor::record("r", vec![Field::new("x", Descriptor::rule("nowhere"))]);
        assert_matches!(
            Grammar::compile_descriptor(&loose),
            Err(GrammarError::UnknownRule(_))
        );
    }

    #[test]
    fn text_options_on_numeric_slots_are_rejected() {
        let bad = Descriptor::record(
            "r",
            vec![Field::new("n", Descriptor::int64()).with_regexp("[0-9]+")],
        );
        assert_matches!(
            Grammar::compile_descriptor(&bad),
            Err(GrammarError::InvalidOption { option: "regexp", .. })
        );
    }

    #[test]
    fn shared_descriptors_share_nodes() {
        let num = Descriptor::int64();
        let twice = Descriptor::record(
            "pair",
            vec![
                Field::new("a", num.clone()),
                Field::new("b", num),
            ],
        );

        let grammar = Grammar::compile_descriptor(&twice).unwrap();
        let root = grammar.resolve(grammar.root());
        match &grammar.node(root).kind {
            NodeKind::Sequence { fields } => {
                let a = grammar.resolve(fields[0].parser);
                let b = grammar.resolve(fields[1].parser);
                assert_eq!(grammar.node(a).id, grammar.node(b).id);
            }
            _ => panic!("root should compile to a sequence"),
        }
    }

    #[test]
    fn recursive_rules_compile_through_proxies() {
        let mut set = DescriptorSet::new();
        set.define(
            "chain",
            Descriptor::record(
                "chain",
                vec![
                    Field::regexp("head", "[0-9]"),
                    Field::new("rest", Descriptor::ptr(Descriptor::rule("chain"))).optional(),
                ],
            ),
        );

        let grammar = Grammar::compile(&set, "chain").unwrap();
        // The self-reference must resolve to the same concrete node
        let root = grammar.resolve(grammar.root());
        match &grammar.node(root).kind {
            NodeKind::Sequence { fields } => match &grammar.node(grammar.resolve(fields[1].parser)).kind {
                NodeKind::Pointer { target, optional } => {
                    assert!(*optional);
                    assert_eq!(grammar.resolve(*target), root);
                }
                _ => panic!("rest should compile to a pointer"),
            },
            _ => panic!("chain should compile to a sequence"),
        }
    }
}
