//! # Pegma
//!
//! Pegma is a PEG engine whose grammars are declared as trees of *type
//! descriptors* instead of a separate grammar file. A descriptor tree is
//! [compiled](`compiler::Grammar::compile`) once into a graph of parser
//! nodes; the compiled grammar then [parses](`compiler::Grammar::parse`)
//! byte slices into dynamic [values](`runtime::Value`) and can also
//! [emit](`compiler::Grammar::emit`) those values back to text.
//!
//! Left-recursive grammars are supported out of the box: the runtime keeps a
//! packrat table keyed by (rule, offset) and grows left-recursive results
//! iteratively until they stop advancing.
//!
//! ## Usage
//!
//! ```rust
//! use pegma::compiler::{Descriptor, Field, Grammar};
//! use pegma::runtime::Options;
//!
//! // 1. Declare the grammar as a descriptor tree
//! let greeting = Descriptor::record(
//!     "greeting",
//!     vec![
//!         Field::regexp("head", "[hH]ello"),
//!         Field::literal(","),
//!         Field::new("target", Descriptor::ptr(Descriptor::string()))
//!             .optional()
//!             .with_regexp("[wW]orld"),
//!     ],
//! );
//!
//! // 2. Compile it
//! let grammar = Grammar::compile_descriptor(&greeting).unwrap();
//!
//! // 3. Parse a subject
//! let (offset, value) = grammar.parse(b"Hello, world", &Options::default()).unwrap();
//!
//! assert_eq!(offset, 12);
//! assert_eq!(value.slot(0).and_then(|v| v.as_str()), Some("Hello"));
//! ```

#![forbid(unsafe_code)]
#![forbid(unused_must_use)]

pub mod compiler;
pub mod runtime;
