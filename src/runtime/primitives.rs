//! Terminal recognizers.
//!
//! Each primitive is a pure function of `(input, offset)` producing the new
//! offset and a value, or a [`Failure`] carrying the offending offset and a
//! message. None of them skip whitespace; that is the engine's job.

use super::errors::Failure;
use bstr::decode_utf8;
use lazy_static::lazy_static;
use regex::bytes::Regex;

lazy_static! {
    static ref FLOAT: Regex =
        Regex::new(r"^[-+]?([0-9]+(\.[0-9]+)?|\.[0-9]+)([eE][-+]?[0-9]+)?").unwrap();
}

/// Overflow sentinel for hexadecimal accumulation (top 4 bits)
const HEX_OVERFLOW: u64 = 0xf000_0000_0000_0000;

/// Overflow sentinel for decimal and octal accumulation (top 3 bits)
const DEC_OVERFLOW: u64 = 0xe000_0000_0000_0000;

const OVERFLOW: &str = "Integer overflow";

/// Check whether `needle` sits at `offset`
pub(crate) fn str_at(input: &[u8], offset: usize, needle: &[u8]) -> bool {
    offset
        .checked_add(needle.len())
        .map_or(false, |end| end <= input.len() && &input[offset..end] == needle)
}

/// Parse `true` or `false`, provided the next byte does not continue an
/// identifier. At end of input the token is accepted as-is.
pub(crate) fn parse_bool(input: &[u8], offset: usize) -> Result<(bool, usize), Failure> {
    const MESSAGE: &str = "Waiting for boolean value";

    let (value, end) = if str_at(input, offset, b"true") {
        (true, offset + 4)
    } else if str_at(input, offset, b"false") {
        (false, offset + 5)
    } else {
        return Err(Failure::new(offset, MESSAGE));
    };

    if let Some(&next) = input.get(end) {
        if next == b'_' || next.is_ascii_alphanumeric() {
            return Err(Failure::new(end, MESSAGE));
        }
    }

    Ok((value, end))
}

/// Parse an unsigned integer literal: decimal (`[1-9][0-9]*`), hexadecimal
/// (`0x…`) or octal (leading `0`). `bits` is the destination width; the
/// sentinel masks catch accumulator overflow before the final width check.
pub(crate) fn parse_uint(input: &[u8], offset: usize, bits: u32) -> Result<(u64, usize), Failure> {
    let mut loc = offset;

    if loc >= input.len() {
        return Err(Failure::new(
            loc,
            "Unexpected end of file. Waiting for integer literal.",
        ));
    }

    let mut res: u64 = 0;

    if input[loc] == b'0' {
        if loc + 1 < input.len() && (input[loc + 1] == b'x' || input[loc + 1] == b'X') {
            // Hexadecimal
            loc += 2;

            if loc >= input.len() {
                return Err(Failure::new(
                    loc,
                    "Unexpected end of file in hexadecimal literal.",
                ));
            }

            let digits = loc;
            while loc < input.len() {
                if res & HEX_OVERFLOW != 0 {
                    return Err(Failure::new(loc, OVERFLOW));
                }

                match input[loc] {
                    b @ b'0'..=b'9' => res = (res << 4) + u64::from(b - b'0'),
                    b @ b'a'..=b'f' => res = (res << 4) + u64::from(b - b'a') + 10,
                    b @ b'A'..=b'F' => res = (res << 4) + u64::from(b - b'A') + 10,
                    _ => break,
                }
                loc += 1;
            }

            if loc == digits {
                return Err(Failure::new(loc, "Waiting for integer literal"));
            }

            return check_uint_width(res, loc, bits);
        }

        // Octal (a lone `0` parses here)
        while loc < input.len() {
            if res & DEC_OVERFLOW != 0 {
                return Err(Failure::new(loc, OVERFLOW));
            }

            match input[loc] {
                b @ b'0'..=b'7' => res = (res << 3) + u64::from(b - b'0'),
                _ => break,
            }
            loc += 1;
        }

        return check_uint_width(res, loc, bits);
    }

    if (b'1'..=b'9').contains(&input[loc]) {
        // Decimal
        while loc < input.len() {
            if res & DEC_OVERFLOW != 0 {
                return Err(Failure::new(loc, OVERFLOW));
            }

            match input[loc] {
                b @ b'0'..=b'9' => {
                    // res * 10 = res * 8 + res * 2; the sentinel check above
                    // keeps the shifts exact, the comparison catches the sum
                    let r8 = res << 3;
                    res = r8.wrapping_add(res << 1);
                    if res < r8 {
                        return Err(Failure::new(loc, OVERFLOW));
                    }

                    res = match res.checked_add(u64::from(b - b'0')) {
                        Some(next) => next,
                        None => return Err(Failure::new(loc, OVERFLOW)),
                    };
                }
                _ => break,
            }
            loc += 1;
        }

        return check_uint_width(res, loc, bits);
    }

    Err(Failure::new(loc, "Waiting for integer literal"))
}

fn check_uint_width(value: u64, loc: usize, bits: u32) -> Result<(u64, usize), Failure> {
    if bits < 64 && (value >> bits) != 0 {
        return Err(Failure::new(loc, OVERFLOW));
    }
    Ok((value, loc))
}

/// Parse a signed integer literal: an optional `-` followed by an unsigned
/// literal, checked against the signed range of the destination width
pub(crate) fn parse_int(input: &[u8], offset: usize, bits: u32) -> Result<(i64, usize), Failure> {
    let mut loc = offset;

    if loc >= input.len() {
        return Err(Failure::new(loc, "Unexpected end of file. Waiting for integer."));
    }

    let neg = input[loc] == b'-';
    if neg {
        loc += 1;
    }

    let (value, end) = parse_uint(input, loc, bits)?;

    let limit = 1u64 << (bits - 1);
    if (neg && value > limit) || (!neg && value >= limit) {
        return Err(Failure::new(loc, OVERFLOW));
    }

    let res = if neg {
        (value as i64).wrapping_neg()
    } else {
        value as i64
    };

    Ok((res, end))
}

/// Parse a floating point literal at the destination width
pub(crate) fn parse_float(input: &[u8], offset: usize, bits: u32) -> Result<(f64, usize), Failure> {
    let m = FLOAT
        .find(&input[offset..])
        .ok_or_else(|| Failure::new(offset, "Waiting for floating point number"))?;

    let text = std::str::from_utf8(m.as_bytes())
        .map_err(|_| Failure::new(offset, "Invalid floating point number"))?;
    let value: f64 = text
        .parse()
        .map_err(|_| Failure::new(offset, "Invalid floating point number"))?;

    let value = if bits == 32 { value as f32 as f64 } else { value };

    Ok((value, offset + m.end()))
}

/// Parse one unicode value: a UTF-8 character or a backslash escape.
///
/// Returns the code point and the offset after it. `\NNN` is exactly three
/// octal digits with the first in `0..=2`; `\xHH`, `\uHHHH` and `\UHHHHHHHH`
/// take the stated number of hex digits, with `\u`/`\U` validated to be
/// Unicode scalar values.
pub(crate) fn parse_unicode_value(input: &[u8], offset: usize) -> Result<(u32, usize), Failure> {
    if offset >= input.len() {
        return Err(Failure::new(
            offset,
            "Unexpected end of file: waiting for Unicode character",
        ));
    }

    if input[offset] != b'\\' {
        let (ch, size) = decode_utf8(&input[offset..]);
        return match ch {
            Some(c) => Ok((c as u32, offset + size)),
            None => Err(Failure::new(offset, "Invalid Unicode character")),
        };
    }

    let loc = offset + 1;
    if loc >= input.len() {
        return Err(Failure::new(loc, "Unexpected end of file in escape sequence"));
    }

    match input[loc] {
        b'\\' => Ok((u32::from('\\'), loc + 1)),
        b'a' => Ok((0x07, loc + 1)),
        b'b' => Ok((0x08, loc + 1)),
        b'f' => Ok((0x0c, loc + 1)),
        b'n' => Ok((u32::from('\n'), loc + 1)),
        b'r' => Ok((u32::from('\r'), loc + 1)),
        b't' => Ok((u32::from('\t'), loc + 1)),
        b'v' => Ok((0x0b, loc + 1)),
        b'`' => Ok((u32::from('`'), loc + 1)),
        b'\'' => Ok((u32::from('\''), loc + 1)),
        b'"' => Ok((u32::from('"'), loc + 1)),

        b'0'..=b'2' => {
            if loc + 2 >= input.len() {
                return Err(Failure::new(loc, "Unexpected end of file in escape sequence"));
            }

            let mut value = 0u32;
            for i in 0..3 {
                match input[loc + i] {
                    b @ b'0'..=b'7' => value = value * 8 + u32::from(b - b'0'),
                    _ => return Err(Failure::new(loc, "Invalid character in octal escape")),
                }
            }

            Ok((value, loc + 3))
        }

        kind @ (b'x' | b'u' | b'U') => {
            let len = match kind {
                b'x' => 2,
                b'u' => 4,
                _ => 8,
            };

            if loc + len >= input.len() {
                return Err(Failure::new(loc, "Unexpected end of file in escape sequence"));
            }

            let digits = loc + 1;
            let mut value = 0u32;
            for i in 0..len {
                match input[digits + i] {
                    b @ b'0'..=b'9' => value = value * 16 + u32::from(b - b'0'),
                    b @ b'a'..=b'f' => value = value * 16 + u32::from(b - b'a') + 10,
                    b @ b'A'..=b'F' => value = value * 16 + u32::from(b - b'A') + 10,
                    _ => return Err(Failure::new(digits, "Illegal character in hex code")),
                }
            }

            // Excludes surrogate halves and out-of-range code points
            if char::from_u32(value).is_none() {
                return Err(Failure::new(digits, "Invalid rune"));
            }

            Ok((value, digits + len))
        }

        _ => Err(Failure::new(loc, "Invalid escaped char")),
    }
}

/// Parse a string literal.
///
/// Raw form: backtick-delimited, no escapes, `\r` silently dropped.
/// Interpreted form: double-quoted, full escape processing. A `\xHH` escape
/// in `0x80..=0xff` appends the raw byte instead of a UTF-8 encoding, which
/// is what makes arbitrary byte strings expressible.
pub(crate) fn parse_quoted(input: &[u8], offset: usize) -> Result<(Vec<u8>, usize), Failure> {
    const MESSAGE: &str = "Waiting for string literal";

    if offset >= input.len() {
        return Err(Failure::new(offset, MESSAGE));
    }

    let mut buf = Vec::new();

    match input[offset] {
        b'`' => {
            let mut loc = offset + 1;
            while loc < input.len() {
                match input[loc] {
                    b'`' => return Ok((buf, loc + 1)),
                    b'\r' => {}
                    b => buf.push(b),
                }
                loc += 1;
            }
            Err(Failure::new(input.len(), MESSAGE))
        }

        b'"' => {
            let mut loc = offset + 1;
            while loc < input.len() {
                if input[loc] == b'"' {
                    return Ok((buf, loc + 1));
                }

                let (value, end) = parse_unicode_value(input, loc)?;

                if (0x80..=0xff).contains(&value) && end - loc == 4 {
                    // \xHH or \NNN above 0x7f: keep the single byte
                    buf.push(value as u8);
                } else {
                    match char::from_u32(value) {
                        Some(c) => {
                            let mut utf8 = [0u8; 4];
                            buf.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
                        }
                        None => return Err(Failure::new(loc, "Invalid rune")),
                    }
                }

                loc = end;
            }
            Err(Failure::new(input.len(), MESSAGE))
        }

        _ => Err(Failure::new(offset, MESSAGE)),
    }
}

/// Parse a single-quoted character literal, producing its code point
pub(crate) fn parse_char_literal(input: &[u8], offset: usize) -> Result<(u32, usize), Failure> {
    let (value, end) = parse_unicode_value(input, offset + 1)?;

    if end >= input.len() || input[end] != b'\'' {
        return Err(Failure::new(
            end,
            "Waiting for closing quote in unicode character",
        ));
    }

    Ok((value, end + 1))
}
