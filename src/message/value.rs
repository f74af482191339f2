use std::os::unix::io::RawFd;

/// A single typed value carried in a [`super::Message`]. No implicit
/// coercion between variants: a caller reading a `Str` key with
/// `get_bool` gets "absent", not a parse attempt.
#[derive(Debug, Clone)]
pub enum Value {
    Str(String),
    Bool(bool),
    Int64(i64),
    UInt64(u64),
    Data(Vec<u8>),
    /// An owned, already-`dup`'d file descriptor. Transferred into the
    /// message on `set_fd`; the caller's original fd is closed by the
    /// setter. See `message::mod` for the full ownership rule.
    Fd(RawFd),
    FdArray(Vec<RawFd>),
    /// A handle to a named IPC endpoint, forwarded opaquely (e.g. when one
    /// service routes a capability to another process).
    Endpoint(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            Value::Data(d) => Some(d),
            _ => None,
        }
    }
}
