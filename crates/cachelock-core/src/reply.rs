//! Decoded command replies.
//!
//! A [`Reply`] wraps the raw [`StoreValue`] returned by a command and offers
//! best-effort views over it. Numeric views never fail: integers decode
//! directly, strings are parsed, and anything else yields `0`.

use crate::value::StoreValue;

/// Reply of a single store command.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    key: Option<String>,
    value: StoreValue,
}

impl Reply {
    pub fn new(value: StoreValue) -> Self {
        Self { key: None, value }
    }

    /// Attaches the key the command was issued for.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Key the command was issued for, or `""` for keyless commands.
    pub fn key(&self) -> &str {
        self.key.as_deref().unwrap_or_default()
    }

    /// True when the store returned a value at all.
    pub fn exists(&self) -> bool {
        !self.is_nil()
    }

    pub fn is_nil(&self) -> bool {
        self.value.is_nil()
    }

    /// True for the `OK` status reply.
    pub fn is_ok(&self) -> bool {
        self.eq_str("OK")
    }

    pub fn eq_int(&self, expected: i64) -> bool {
        match &self.value {
            StoreValue::Int(i) => *i == expected,
            StoreValue::Text(_) | StoreValue::Bytes(_) => self
                .value
                .as_text()
                .and_then(|s| parse_int(&s))
                .is_some_and(|i| i == expected),
            _ => false,
        }
    }

    pub fn eq_str(&self, expected: &str) -> bool {
        !self.is_nil() && self.as_string() == expected
    }

    pub fn as_i64(&self) -> i64 {
        match &self.value {
            StoreValue::Int(i) => *i,
            StoreValue::Text(_) | StoreValue::Bytes(_) => self
                .value
                .as_text()
                .and_then(|s| parse_int(&s))
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// 32-bit view; values that do not fit decode to `0`.
    pub fn as_int(&self) -> i32 {
        i32::try_from(self.as_i64()).unwrap_or(0)
    }

    /// Text rendering; `nil` renders as the empty string.
    pub fn as_string(&self) -> String {
        self.value.to_string()
    }

    /// Type of the raw value, for diagnostics.
    pub fn kind(&self) -> &'static str {
        self.value.kind()
    }

    pub fn value(&self) -> &StoreValue {
        &self.value
    }

    pub fn into_value(self) -> StoreValue {
        self.value
    }
}

impl From<StoreValue> for Reply {
    fn from(value: StoreValue) -> Self {
        Reply::new(value)
    }
}

/// Parses a signed integer, accepting `0x`, `0o` and `0b` radix prefixes.
fn parse_int(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (negative, digits) = match raw.as_bytes().first()? {
        b'-' => (true, &raw[1..]),
        b'+' => (false, &raw[1..]),
        _ => (false, raw),
    };

    let (radix, digits) = match digits.get(..2) {
        Some("0x") | Some("0X") => (16, &digits[2..]),
        Some("0o") | Some("0O") => (8, &digits[2..]),
        Some("0b") | Some("0B") => (2, &digits[2..]),
        _ => (10, digits),
    };
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }

    let magnitude = i128::from_str_radix(digits, radix).ok()?;
    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_status() {
        let reply = Reply::new(StoreValue::Text("OK".to_string()));
        assert!(reply.is_ok());
        assert!(reply.exists());
        assert!(!Reply::new(StoreValue::Nil).is_ok());
    }

    #[test]
    fn test_nil_reply_views() {
        let reply = Reply::new(StoreValue::Nil).with_key("missing");
        assert!(reply.is_nil());
        assert!(!reply.exists());
        assert_eq!(reply.as_string(), "");
        assert_eq!(reply.as_i64(), 0);
        assert!(!reply.eq_str(""));
        assert_eq!(reply.key(), "missing");
    }

    #[test]
    fn test_integer_reply_views() {
        let reply = Reply::new(StoreValue::Int(42));
        assert!(reply.eq_int(42));
        assert_eq!(reply.as_int(), 42);
        assert_eq!(reply.as_string(), "42");
        assert!(reply.eq_str("42"));
    }

    #[test]
    fn test_string_reply_is_parsed_for_numeric_views() {
        let reply = Reply::new(StoreValue::Text("  -17 ".to_string()));
        assert_eq!(reply.as_i64(), -17);
        assert!(reply.eq_int(-17));

        let bytes = Reply::new(StoreValue::Bytes(b"0x1f".to_vec()));
        assert_eq!(bytes.as_i64(), 31);
    }

    #[test]
    fn test_unparsable_values_decode_to_zero() {
        assert_eq!(Reply::new(StoreValue::Text("abc".into())).as_i64(), 0);
        assert!(!Reply::new(StoreValue::Text("abc".into())).eq_int(0));
        assert_eq!(Reply::new(StoreValue::Double(1.5)).as_i64(), 0);
        assert_eq!(Reply::new(StoreValue::Int(i64::MAX)).as_int(), 0);
    }

    #[test]
    fn test_parse_int_prefixes() {
        assert_eq!(parse_int("0b101"), Some(5));
        assert_eq!(parse_int("0o17"), Some(15));
        assert_eq!(parse_int("+9"), Some(9));
        assert_eq!(parse_int("--9"), None);
        assert_eq!(parse_int("0x"), None);
        assert_eq!(parse_int(""), None);
    }
}
