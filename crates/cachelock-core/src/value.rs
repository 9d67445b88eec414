//! Wire-neutral values and commands.

use std::borrow::Cow;
use std::fmt;

/// A single reply (or argument) exchanged with the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreValue {
    Nil,
    Int(i64),
    Double(f64),
    /// Bulk or status string.
    Text(String),
    Bytes(Vec<u8>),
    Array(Vec<StoreValue>),
}

impl StoreValue {
    pub fn is_nil(&self) -> bool {
        matches!(self, StoreValue::Nil)
    }

    /// Name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreValue::Nil => "nil",
            StoreValue::Int(_) => "integer",
            StoreValue::Double(_) => "double",
            StoreValue::Text(_) => "string",
            StoreValue::Bytes(_) => "bytes",
            StoreValue::Array(_) => "array",
        }
    }

    /// Borrowed text view of string-like values.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            StoreValue::Text(s) => Some(Cow::Borrowed(s)),
            StoreValue::Bytes(b) => Some(String::from_utf8_lossy(b)),
            _ => None,
        }
    }
}

impl fmt::Display for StoreValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreValue::Nil => Ok(()),
            StoreValue::Int(i) => write!(f, "{i}"),
            StoreValue::Double(d) => write!(f, "{d}"),
            StoreValue::Text(s) => f.write_str(s),
            StoreValue::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            StoreValue::Array(items) => {
                f.write_str("[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for StoreValue {
    fn from(s: &str) -> Self {
        StoreValue::Text(s.to_string())
    }
}

impl From<String> for StoreValue {
    fn from(s: String) -> Self {
        StoreValue::Text(s)
    }
}

impl From<&String> for StoreValue {
    fn from(s: &String) -> Self {
        StoreValue::Text(s.clone())
    }
}

impl From<Vec<u8>> for StoreValue {
    fn from(b: Vec<u8>) -> Self {
        StoreValue::Bytes(b)
    }
}

impl From<f64> for StoreValue {
    fn from(d: f64) -> Self {
        StoreValue::Double(d)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for StoreValue {
                fn from(i: $t) -> Self {
                    StoreValue::Int(i64::from(i))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

// Values beyond `i64::MAX` travel as decimal text, which the store parses the same way.
macro_rules! impl_from_wide_uint {
    ($($t:ty),*) => {
        $(
            impl From<$t> for StoreValue {
                fn from(i: $t) -> Self {
                    match i64::try_from(i) {
                        Ok(i) => StoreValue::Int(i),
                        Err(_) => StoreValue::Text(i.to_string()),
                    }
                }
            }
        )*
    };
}

impl_from_wide_uint!(u64, usize);

/// A store command: name plus positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: Cow<'static, str>,
    args: Vec<StoreValue>,
}

impl Command {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<StoreValue>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends every argument in `args`.
    pub fn args<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<StoreValue>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[StoreValue] {
        &self.args
    }

}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for arg in &self.args {
            match arg {
                StoreValue::Nil => f.write_str(" nil")?,
                other => write!(f, " {other}")?,
            }
        }
        Ok(())
    }
}
