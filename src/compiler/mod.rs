//! # Grammar compiler
//!
//! This module turns [descriptor trees](`Descriptor`) into compiled
//! [grammars](`Grammar`): graphs of parser nodes, cached by (descriptor,
//! options), with cycles broken through proxy indirections. After the graph
//! is built, the [left-recursion analyzer](`analysis`) classifies every node
//! so the [runtime](`crate::runtime`) knows which rules can safely bypass
//! the packrat table.

pub(crate) mod analysis;
mod data;
mod descriptor;
mod errors;
mod graph;

pub(crate) use data::{
    CompiledField, LrState, NodeKind, NodeRef, ParserNode, FIELD_FOLLOWED_BY, FIELD_NOT_ANY,
};
pub use data::Grammar;
pub use descriptor::*;
pub use errors::*;
