/// Value produced by a parse, shaped by the grammar's descriptors.
///
/// Record slots are indexed in declaration order, counting only fields that
/// carry storage (anonymous fields occupy no slot). String payloads are byte
/// strings: quoted strings may contain arbitrary bytes through `\xHH`
/// escapes, so they are not forced into UTF-8.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean token (`true` / `false`)
    Bool(bool),

    /// Signed integer (also carries captured byte positions)
    Int(i64),

    /// Unsigned integer
    Uint(u64),

    /// Floating point number, stored at full width
    Float(f64),

    /// Byte string: quoted string content, regex match or literal
    Str(Vec<u8>),

    /// One slot per storing field of a record descriptor
    Record(Vec<Value>),

    /// Result of an ordered choice: branch index plus the branch's value.
    /// `None` until a branch has matched.
    Choice(Option<(u32, Box<Value>)>),

    /// Elements collected by a repetition
    List(Vec<Value>),

    /// Owned indirection; `None` when an optional pointer did not match
    Ptr(Option<Box<Value>>),
}

impl Value {
    /// Get the boolean payload
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the signed integer payload
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the unsigned integer payload
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Self::Uint(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the float payload
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the raw bytes of a string payload
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Get a string payload as `&str`, when it happens to be valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Get the value stored in a record's `index`-th slot
    pub fn slot(&self, index: usize) -> Option<&Value> {
        match self {
            Self::Record(slots) => slots.get(index),
            _ => None,
        }
    }

    /// Get the index of the branch an ordered choice matched
    pub fn branch(&self) -> Option<u32> {
        match self {
            Self::Choice(Some((branch, _))) => Some(*branch),
            _ => None,
        }
    }

    /// Get the value captured by the matched branch of an ordered choice
    pub fn branch_value(&self) -> Option<&Value> {
        match self {
            Self::Choice(Some((_, value))) => Some(value),
            _ => None,
        }
    }

    /// Get the elements collected by a repetition
    pub fn items(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get the value behind a pointer, when one was parsed
    pub fn pointee(&self) -> Option<&Value> {
        match self {
            Self::Ptr(Some(value)) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_reject_foreign_variants() {
        let v = Value::Int(3);
        assert_eq!(v.as_int(), Some(3));
        assert_eq!(v.as_uint(), None);
        assert_eq!(v.as_str(), None);
        assert_eq!(v.slot(0), None);
    }

    #[test]
    fn string_accessor_requires_utf8() {
        let v = Value::Str(vec![0xff, b'a']);
        assert_eq!(v.as_str(), None);
        assert_eq!(v.as_bytes(), Some(&[0xff, b'a'][..]));
    }

    #[test]
    fn choice_navigation() {
        let v = Value::Choice(Some((1, Box::new(Value::Bool(true)))));
        assert_eq!(v.branch(), Some(1));
        assert_eq!(v.branch_value().and_then(Value::as_bool), Some(true));
        assert_eq!(Value::Choice(None).branch(), None);
    }
}
