//! Whitespace and comment skipping.
//!
//! The engine never hardcodes a comment style: a skip policy is a
//! first-class [`Skipper`] value, and policies compose with [`all`], which
//! iterates its parts to a fixpoint. The engine calls the configured
//! skipper at sequence-field boundaries and around repetition delimiters;
//! terminals never skip internally.

use std::sync::Arc;

/// A skip function: given the input and an offset, return the offset of the
/// first byte that should be parsed (never less than the given offset)
pub type Skipper = Arc<dyn Fn(&[u8], usize) -> usize + Send + Sync>;

/// Skip spaces, tabs, carriage returns and newlines
pub fn whitespace() -> Skipper {
    Arc::new(|input, mut loc| {
        while loc < input.len() && matches!(input[loc], b' ' | b'\t' | b'\n' | b'\r') {
            loc += 1;
        }
        loc
    })
}

/// Skip a comment running from `opener` to the end of the line
pub fn line_comment(opener: &str) -> Skipper {
    let opener = opener.as_bytes().to_vec();
    Arc::new(move |input, loc| {
        if !starts_with(input, loc, &opener) {
            return loc;
        }

        match input[loc..].iter().position(|&b| b == b'\n') {
            Some(newline) => loc + newline + 1,
            None => input.len(),
        }
    })
}

/// Skip a comment running from `opener` to `closer`, optionally allowing
/// nested comments. An unterminated comment is not skipped at all.
pub fn block_comment(opener: &str, closer: &str, nested: bool) -> Skipper {
    let opener = opener.as_bytes().to_vec();
    let closer = closer.as_bytes().to_vec();
    Arc::new(move |input, loc| {
        if !starts_with(input, loc, &opener) {
            return loc;
        }

        let mut depth = 1usize;
        let mut at = loc + opener.len();

        while at < input.len() {
            if starts_with(input, at, &closer) {
                depth -= 1;
                at += closer.len();
                if depth == 0 {
                    return at;
                }
            } else if nested && starts_with(input, at, &opener) {
                depth += 1;
                at += opener.len();
            } else {
                at += 1;
            }
        }

        loc
    })
}

/// Compose skippers by applying each in turn until none advances
pub fn all(skippers: Vec<Skipper>) -> Skipper {
    Arc::new(move |input, mut loc| loop {
        let mut advanced = false;

        for skipper in &skippers {
            let next = skipper(input, loc);
            if next > loc {
                loc = next;
                advanced = true;
            }
        }

        if !advanced {
            return loc;
        }
    })
}

/// Whitespace and `#` line comments
pub fn shell() -> Skipper {
    all(vec![whitespace(), line_comment("#")])
}

/// Whitespace, `//` line comments and `/* */` block comments
pub fn cpp() -> Skipper {
    all(vec![
        whitespace(),
        line_comment("//"),
        block_comment("/*", "*/", false),
    ])
}

/// Whitespace and `/* */` block comments
pub fn c() -> Skipper {
    all(vec![whitespace(), block_comment("/*", "*/", false)])
}

/// Whitespace and nestable `(* *)` block comments
pub fn pascal() -> Skipper {
    all(vec![whitespace(), block_comment("(*", "*)", true)])
}

/// Whitespace and `<!-- -->` block comments
pub fn html() -> Skipper {
    all(vec![whitespace(), block_comment("<!--", "-->", false)])
}

/// Whitespace and `--` line comments
pub fn ada() -> Skipper {
    all(vec![whitespace(), line_comment("--")])
}

/// Whitespace and `;` line comments
pub fn lisp() -> Skipper {
    all(vec![whitespace(), line_comment(";")])
}

/// Whitespace and `%` line comments
pub fn tex() -> Skipper {
    all(vec![whitespace(), line_comment("%")])
}

fn starts_with(input: &[u8], loc: usize, needle: &[u8]) -> bool {
    loc.checked_add(needle.len())
        .map_or(false, |end| end <= input.len() && &input[loc..end] == needle)
}
