//! Rendering values back to text.
//!
//! Every compiled node knows how to emit the storage it fills. Anonymous
//! fields have no storage: the emitter walks through pointer wrappers until
//! it reaches a literal and writes that literal; any other terminator is an
//! emit error.

use crate::compiler::{CompiledField, Grammar, NodeKind, NodeRef, FIELD_FOLLOWED_BY, FIELD_NOT_ANY};

use super::data::Value;
use super::errors::EmitError;

use bstr::decode_utf8;
use std::io::Write;

impl Grammar {
    /// Render a parsed value back to text
    pub fn emit(&self, out: &mut dyn Write, value: &Value) -> Result<(), EmitError> {
        emit_node(self, self.root(), value, out)
    }

    /// Render a parsed value onto the end of a byte buffer
    pub fn append(&self, mut buffer: Vec<u8>, value: &Value) -> Result<Vec<u8>, EmitError> {
        self.emit(&mut buffer, value)?;
        Ok(buffer)
    }
}

fn emit_node(
    grammar: &Grammar,
    node: NodeRef,
    value: &Value,
    out: &mut dyn Write,
) -> Result<(), EmitError> {
    let node = grammar.resolve(node);
    let parser = grammar.node(node);

    match &parser.kind {
        NodeKind::Literal { bytes, .. } => {
            out.write_all(bytes)?;
            Ok(())
        }

        NodeKind::Regex { pattern, regex, .. } => match value {
            Value::Str(bytes) => {
                // The stored bytes must still match, over their whole length
                let valid = regex
                    .find(bytes)
                    .map_or(false, |m| m.end() == bytes.len());
                if !valid {
                    return Err(EmitError::new(format!(
                        "value `{}' does not match regex /{}/",
                        String::from_utf8_lossy(bytes),
                        pattern
                    )));
                }
                out.write_all(bytes)?;
                Ok(())
            }
            _ => Err(mismatch(parser.name.as_str(), value)),
        },

        NodeKind::Int { .. } => match value {
            Value::Int(v) => {
                write!(out, "{}", v)?;
                Ok(())
            }
            _ => Err(mismatch(parser.name.as_str(), value)),
        },

        NodeKind::Uint { .. } => match value {
            Value::Uint(v) => {
                write!(out, "{}", v)?;
                Ok(())
            }
            _ => Err(mismatch(parser.name.as_str(), value)),
        },

        NodeKind::Float { bits } => match value {
            Value::Float(v) => {
                if *bits == 32 {
                    write!(out, "{}", *v as f32)?;
                } else {
                    write!(out, "{}", v)?;
                }
                Ok(())
            }
            _ => Err(mismatch(parser.name.as_str(), value)),
        },

        NodeKind::Bool => match value {
            Value::Bool(v) => {
                out.write_all(if *v { "true" } else { "false" }.as_bytes())?;
                Ok(())
            }
            _ => Err(mismatch(parser.name.as_str(), value)),
        },

        NodeKind::QuotedStr => match value {
            Value::Str(bytes) => quote_bytes(out, bytes),
            _ => Err(mismatch(parser.name.as_str(), value)),
        },

        // Position captures consume nothing and emit nothing
        NodeKind::Position { .. } => Ok(()),

        NodeKind::Custom { parser } => parser.emit(out, value),

        NodeKind::Sequence { fields } => match value {
            Value::Record(slots) => {
                for field in fields {
                    let slot = field.slot.and_then(|i| slots.get(i as usize));
                    emit_field(grammar, field, slot, out)?;
                }
                Ok(())
            }
            _ => Err(mismatch(parser.name.as_str(), value)),
        },

        NodeKind::FirstOf { fields } => match value {
            Value::Choice(Some((branch, payload))) => {
                let field = fields.get(*branch as usize).ok_or_else(|| {
                    EmitError::new(format!(
                        "branch {} is not present in {}",
                        branch, parser.name
                    ))
                })?;
                emit_field(grammar, field, Some(payload.as_ref()), out)
            }
            Value::Choice(None) => Err(EmitError::new("branch is not chosen")),
            _ => Err(mismatch(parser.name.as_str(), value)),
        },

        NodeKind::Repeat {
            item,
            min,
            delimiter,
        } => match value {
            Value::List(items) => {
                if items.len() < *min {
                    return Err(EmitError::new("not enough elements in repetition"));
                }

                for (index, element) in items.iter().enumerate() {
                    if index > 0 {
                        if let Some(delimiter) = delimiter {
                            out.write_all(delimiter)?;
                        }
                    }
                    emit_node(grammar, *item, element, out)?;
                }

                Ok(())
            }
            _ => Err(mismatch(parser.name.as_str(), value)),
        },

        NodeKind::Pointer { target, optional } => match value {
            Value::Ptr(Some(inner)) => emit_node(grammar, *target, inner, out),
            Value::Ptr(None) => {
                if *optional {
                    Ok(())
                } else {
                    Err(EmitError::new("not-optional value is empty"))
                }
            }
            _ => Err(mismatch(parser.name.as_str(), value)),
        },

        NodeKind::Proxy { .. } => unreachable!("proxies are resolved before emit"),
    }
}

fn emit_field(
    grammar: &Grammar,
    field: &CompiledField,
    value: Option<&Value>,
    out: &mut dyn Write,
) -> Result<(), EmitError> {
    // Lookahead fields consumed nothing
    if field.flags & (FIELD_NOT_ANY | FIELD_FOLLOWED_BY) != 0 {
        return Ok(());
    }

    if field.slot.is_none() {
        return emit_anonymous(grammar, field.parser, out);
    }

    match value {
        Some(value) => emit_node(grammar, field.parser, value, out),
        None => Err(EmitError::new(format!(
            "no stored value for field `{}'",
            field.name
        ))),
    }
}

/// Walk an anonymous field through pointer wrappers down to its literal
fn emit_anonymous(
    grammar: &Grammar,
    mut node: NodeRef,
    out: &mut dyn Write,
) -> Result<(), EmitError> {
    loop {
        match &grammar.node(grammar.resolve(node)).kind {
            NodeKind::Pointer { target, .. } => node = *target,
            NodeKind::Literal { bytes, .. } => {
                out.write_all(bytes)?;
                return Ok(());
            }
            _ => {
                return Err(EmitError::new(
                    "anonymous field does not reduce to a literal",
                ))
            }
        }
    }
}

/// Render a byte string in interpreted form. Bytes that are not part of
/// valid UTF-8 re-escape as `\xHH`, so arbitrary byte strings survive the
/// round trip.
fn quote_bytes(out: &mut dyn Write, bytes: &[u8]) -> Result<(), EmitError> {
    out.write_all(b"\"")?;

    let mut rest = bytes;
    while !rest.is_empty() {
        let (ch, size) = decode_utf8(rest);
        match ch {
            Some('"') => out.write_all(b"\\\"")?,
            Some('\\') => out.write_all(b"\\\\")?,
            Some('\n') => out.write_all(b"\\n")?,
            Some('\r') => out.write_all(b"\\r")?,
            Some('\t') => out.write_all(b"\\t")?,
            Some('\x07') => out.write_all(b"\\a")?,
            Some('\x08') => out.write_all(b"\\b")?,
            Some('\x0b') => out.write_all(b"\\v")?,
            Some('\x0c') => out.write_all(b"\\f")?,
            Some(c) if (c as u32) < 0x20 || c == '\x7f' => {
                write!(out, "\\x{:02x}", c as u32)?;
            }
            Some(c) => write!(out, "{}", c)?,
            None => {
                for &b in &rest[..size] {
                    write!(out, "\\x{:02x}", b)?;
                }
            }
        }
        rest = &rest[size..];
    }

    out.write_all(b"\"")?;
    Ok(())
}

fn mismatch(name: &str, value: &Value) -> EmitError {
    EmitError::new(format!("value {:?} does not fit parser {}", value, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{Descriptor, Field};
    use crate::runtime::Options;
    use assert_matches::assert_matches;

    fn render(grammar: &Grammar, value: &Value) -> String {
        let bytes = grammar.append(Vec::new(), value).unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn primitives_render_back() {
        let g = Grammar::compile_descriptor(&Descriptor::int64()).unwrap();
        assert_eq!(render(&g, &Value::Int(-42)), "-42");

        let g = Grammar::compile_descriptor(&Descriptor::uint64()).unwrap();
        assert_eq!(render(&g, &Value::Uint(63)), "63");

        let g = Grammar::compile_descriptor(&Descriptor::boolean()).unwrap();
        assert_eq!(render(&g, &Value::Bool(true)), "true");

        let g = Grammar::compile_descriptor(&Descriptor::float64()).unwrap();
        assert_eq!(render(&g, &Value::Float(1.5)), "1.5");
    }

    #[test]
    fn strings_escape_and_reparse() {
        let g = Grammar::compile_descriptor(&Descriptor::string()).unwrap();

        let original = Value::Str(b"a\"b\\c\nd\xff".to_vec());
        let text = render(&g, &original);
        assert_eq!(text, "\"a\\\"b\\\\c\\nd\\xff\"");

        let (_, reparsed) = g.parse(text.as_bytes(), &Options::default()).unwrap();
        assert_eq!(reparsed, original);
    }

    #[test]
    fn regex_emit_validates_the_stored_value() {
        let d = Descriptor::record("r", vec![Field::regexp("word", "[a-z]+")]);
        let g = Grammar::compile_descriptor(&d).unwrap();

        let ok = Value::Record(vec![Value::Str(b"hello".to_vec())]);
        assert_eq!(render(&g, &ok), "hello");

        let bad = Value::Record(vec![Value::Str(b"hello!".to_vec())]);
        assert_matches!(g.emit(&mut Vec::new(), &bad), Err(_));
    }

    #[test]
    fn anonymous_literals_are_recovered() {
        let d = Descriptor::record(
            "pair",
            vec![
                Field::regexp("key", "[a-z]+"),
                Field::literal("="),
                Field::regexp("value", "[0-9]+"),
            ],
        );
        let g = Grammar::compile_descriptor(&d).unwrap();

        let v = Value::Record(vec![
            Value::Str(b"port".to_vec()),
            Value::Str(b"8080".to_vec()),
        ]);
        assert_eq!(render(&g, &v), "port=8080");
    }

    #[test]
    fn anonymous_non_literals_are_emit_errors() {
        let d = Descriptor::record("r", vec![Field::anon(Descriptor::string()).with_regexp("x")]);
        let g = Grammar::compile_descriptor(&d).unwrap();

        assert_matches!(
            g.emit(&mut Vec::new(), &Value::Record(vec![])),
            Err(err) if err.to_string().contains("anonymous field")
        );
    }

    #[test]
    fn choice_emit_needs_a_branch() {
        let d = Descriptor::choice(
            "v",
            vec![
                Field::new("num", Descriptor::int64()),
                Field::new("flag", Descriptor::boolean()),
            ],
        );
        let g = Grammar::compile_descriptor(&d).unwrap();

        let chosen = Value::Choice(Some((1, Box::new(Value::Bool(false)))));
        assert_eq!(render(&g, &chosen), "false");

        assert_matches!(
            g.emit(&mut Vec::new(), &Value::Choice(None)),
            Err(err) if err.to_string() == "branch is not chosen"
        );
    }

    #[test]
    fn empty_pointers() {
        let optional = Descriptor::record(
            "r",
            vec![Field::new("v", Descriptor::ptr(Descriptor::int64())).optional()],
        );
        let g = Grammar::compile_descriptor(&optional).unwrap();
        assert_eq!(render(&g, &Value::Record(vec![Value::Ptr(None)])), "");

        let required = Descriptor::record(
            "r",
            vec![Field::new("v", Descriptor::ptr(Descriptor::int64()))],
        );
        let g = Grammar::compile_descriptor(&required).unwrap();
        assert_matches!(
            g.emit(&mut Vec::new(), &Value::Record(vec![Value::Ptr(None)])),
            Err(err) if err.to_string() == "not-optional value is empty"
        );
    }

    #[test]
    fn repetition_enforces_the_minimum() {
        let d = Descriptor::record(
            "r",
            vec![Field::new(
                "nums",
                Descriptor::list(Descriptor::int64()),
            )
            .one_or_more()
            .delimiter(",")],
        );
        let g = Grammar::compile_descriptor(&d).unwrap();

        let v = Value::Record(vec![Value::List(vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
        ])]);
        assert_eq!(render(&g, &v), "1,2,3");

        assert_matches!(
            g.emit(&mut Vec::new(), &Value::Record(vec![Value::List(vec![])])),
            Err(err) if err.to_string() == "not enough elements in repetition"
        );
    }
}
