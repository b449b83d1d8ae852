//! Static left-recursion analysis.
//!
//! Classifies every parser node as provably non-left-recursive or
//! (possibly) left-recursive. The runtime bypasses the packrat table for
//! provably safe rules; every other rule goes through the memoization
//! machinery, which doubles as the left-recursion engine.

use super::data::{CompiledField, LrState, NodeKind, NodeRef, ParserNode, FIELD_FOLLOWED_BY, FIELD_NOT_ANY};
use std::collections::HashMap;

/// Classify every node that is still unknown after compilation
pub(crate) fn classify(nodes: &mut [ParserNode]) {
    let mut nullables = HashMap::new();
    for node in 0..nodes.len() {
        if nodes[node].lr == LrState::Unknown {
            check(nodes, &mut nullables, node as NodeRef, &mut Vec::new());
        }
    }
}

/// Walk the left spine below `node`, carrying the set of ancestors currently
/// on the spine. Finding `node` among its own left-spine descendants marks
/// the whole spine left-recursive.
///
/// Returns `(recursive, nullable)`: whether a left recursion was found, and
/// whether the node can succeed without consuming input.
fn check(
    nodes: &mut [ParserNode],
    nullables: &mut HashMap<NodeRef, bool>,
    node: NodeRef,
    spine: &mut Vec<NodeRef>,
) -> (bool, bool) {
    let node = resolve(nodes, node);

    match nodes[node as usize].lr {
        LrState::Recursive => return (true, nullables.get(&node).copied().unwrap_or(false)),
        LrState::NonRecursive => return (false, nullables.get(&node).copied().unwrap_or(false)),
        LrState::Unknown => {}
    }

    if spine.contains(&node) {
        nodes[node as usize].lr = LrState::Recursive;
        return (true, false);
    }

    spine.push(node);
    let (recursive, nullable) = visit(nodes, nullables, node, spine);
    spine.pop();

    nodes[node as usize].lr = if recursive {
        LrState::Recursive
    } else {
        LrState::NonRecursive
    };
    nullables.insert(node, nullable);

    (recursive, nullable)
}

fn visit(
    nodes: &mut [ParserNode],
    nullables: &mut HashMap<NodeRef, bool>,
    node: NodeRef,
    spine: &mut Vec<NodeRef>,
) -> (bool, bool) {
    match shape(&nodes[node as usize]) {
        Shape::Terminal { nullable } => (false, nullable),

        // Fields are on the left spine while everything before them is
        // nullable; the first non-nullable field ends the walk
        Shape::Sequence(fields) => {
            for (parser, flags) in fields {
                let (recursive, nullable) = check_field(nodes, nullables, parser, flags, spine);
                if recursive {
                    return (true, nullable);
                }
                if !nullable {
                    return (false, false);
                }
            }
            (false, true)
        }

        // Every branch is a left-spine entry
        Shape::FirstOf(fields) => {
            let mut any_nullable = false;
            for (parser, flags) in fields {
                let (recursive, nullable) = check_field(nodes, nullables, parser, flags, spine);
                if recursive {
                    return (true, nullable);
                }
                if nullable {
                    any_nullable = true;
                }
            }
            (false, any_nullable)
        }

        Shape::Repeat { item, min } => {
            let (recursive, nullable) = check(nodes, nullables, item, spine);
            (recursive, nullable || min == 0)
        }

        Shape::Pointer { target, optional } => {
            let (recursive, nullable) = check(nodes, nullables, target, spine);
            (recursive, nullable || optional)
        }
    }
}

/// A lookahead field sits off the consuming spine but never consumes input,
/// so it is nullable regardless of its child
fn check_field(
    nodes: &mut [ParserNode],
    nullables: &mut HashMap<NodeRef, bool>,
    parser: NodeRef,
    flags: u8,
    spine: &mut Vec<NodeRef>,
) -> (bool, bool) {
    let (recursive, mut nullable) = check(nodes, nullables, parser, spine);
    if flags & (FIELD_NOT_ANY | FIELD_FOLLOWED_BY) != 0 {
        nullable = true;
    }
    (recursive, nullable)
}

/// The slice of a node the analyzer cares about, copied out so the walk can
/// keep mutable access to the arena
enum Shape {
    Terminal { nullable: bool },
    Sequence(Vec<(NodeRef, u8)>),
    FirstOf(Vec<(NodeRef, u8)>),
    Repeat { item: NodeRef, min: usize },
    Pointer { target: NodeRef, optional: bool },
}

fn shape(node: &ParserNode) -> Shape {
    match &node.kind {
        NodeKind::Literal { bytes, .. } => Shape::Terminal {
            nullable: bytes.is_empty(),
        },
        NodeKind::Regex { regex, .. } => Shape::Terminal {
            nullable: regex.is_match(b""),
        },
        NodeKind::Int { .. }
        | NodeKind::Uint { .. }
        | NodeKind::Float { .. }
        | NodeKind::Bool
        | NodeKind::QuotedStr => Shape::Terminal { nullable: false },
        NodeKind::Position { .. } => Shape::Terminal { nullable: true },
        // No visibility into user parsers: assume the worst for nullability
        // but trust them not to recurse into the grammar
        NodeKind::Custom { .. } => Shape::Terminal { nullable: true },
        NodeKind::Sequence { fields } => Shape::Sequence(field_shapes(fields)),
        NodeKind::FirstOf { fields } => Shape::FirstOf(field_shapes(fields)),
        NodeKind::Repeat { item, min, .. } => Shape::Repeat {
            item: *item,
            min: *min,
        },
        NodeKind::Pointer { target, optional } => Shape::Pointer {
            target: *target,
            optional: *optional,
        },
        NodeKind::Proxy { .. } => unreachable!("proxies are resolved before shape extraction"),
    }
}

fn field_shapes(fields: &[CompiledField]) -> Vec<(NodeRef, u8)> {
    fields.iter().map(|f| (f.parser, f.flags)).collect()
}

fn resolve(nodes: &[ParserNode], mut node: NodeRef) -> NodeRef {
    loop {
        match &nodes[node as usize].kind {
            NodeKind::Proxy { target } => node = *target,
            _ => return node,
        }
    }
}
