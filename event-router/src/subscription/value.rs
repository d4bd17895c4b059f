//! Attribute values carried by notifications.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// A notification: attribute name to typed value.
pub type Attributes = HashMap<String, Value>;

/// One typed attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    Real64(f64),
    String(String),
    Opaque(Vec<u8>),
}

/// The type tag of a [`Value`], as tested by `int32()`, `string()` etc.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int32,
    Int64,
    Real64,
    String,
    Opaque,
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int32(_) => ValueType::Int32,
            Value::Int64(_) => ValueType::Int64,
            Value::Real64(_) => ValueType::Real64,
            Value::String(_) => ValueType::String,
            Value::Opaque(_) => ValueType::Opaque,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }
}

impl ValueType {
    /// The function name used in subscription expressions.
    pub fn function_name(&self) -> &'static str {
        match self {
            ValueType::Int32 => "int32",
            ValueType::Int64 => "int64",
            ValueType::Real64 => "real64",
            ValueType::String => "string",
            ValueType::Opaque => "opaque",
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real64(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Opaque(value)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int32(value) => write!(f, "{value}"),
            Value::Int64(value) => write!(f, "{value}L"),
            Value::Real64(value) => write!(f, "{value:?}"),
            Value::String(value) => write!(f, "'{value}'"),
            Value::Opaque(bytes) => write_opaque(f, bytes),
        }
    }
}

pub(crate) fn write_opaque(f: &mut Formatter<'_>, bytes: &[u8]) -> std::fmt::Result {
    write!(f, "[")?;
    for (index, byte) in bytes.iter().enumerate() {
        if index > 0 {
            write!(f, " ")?;
        }
        write!(f, "{byte:02x}")?;
    }
    write!(f, "]")
}

/// Builds an attribute map from name/value pairs.
pub fn attributes<K, V, I>(pairs: I) -> Attributes
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(name, value)| (name.into(), value.into()))
        .collect()
}

/// Returns `base` with every entry of `extra` added, `extra` winning on clashes.
pub fn union(base: &Attributes, extra: &Attributes) -> Attributes {
    if extra.is_empty() {
        return base.clone();
    }

    let mut merged = base.clone();
    merged.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Failure to read a value expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidValueExpr {
    pub expr: String,
    pub reason: String,
}

impl Display for InvalidValueExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid value \"{}\": {}", self.expr, self.reason)
    }
}

impl std::error::Error for InvalidValueExpr {}

/// Parses a literal value expression as used in configuration files:
/// `'text'` or `"text"`, `42`, `42L`, `0x2a`, `1.5`, `[00 0f ff]`.
pub fn parse_value_expr(expr: &str) -> Result<Value, InvalidValueExpr> {
    let invalid = |reason: &str| InvalidValueExpr {
        expr: expr.to_string(),
        reason: reason.to_string(),
    };
    let text = expr.trim();

    let Some(first) = text.chars().next() else {
        return Err(invalid("empty value"));
    };

    match first {
        '\'' | '"' => {
            if text.len() < 2 || !text.ends_with(first) {
                return Err(invalid("missing closing quote"));
            }
            strip_backslashes(&text[1..text.len() - 1])
                .map(Value::String)
                .ok_or_else(|| invalid("trailing backslash"))
        }
        '[' => {
            let inner = text
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
                .ok_or_else(|| invalid("missing closing \"]\""))?;
            hex_to_bytes(inner)
                .map(Value::Opaque)
                .ok_or_else(|| invalid("bad hex digits"))
        }
        _ => parse_number(text).ok_or_else(|| invalid("not a number")),
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if let Some(digits) = text.strip_suffix(['L', 'l']) {
        return parse_integer(digits).map(Value::Int64);
    }

    if text.contains(['.', 'e', 'E']) && !text.starts_with("0x") && !text.starts_with("0X") {
        return text.parse::<f64>().ok().map(Value::Real64);
    }

    let value = parse_integer(text)?;
    i32::try_from(value).ok().map(Value::Int32)
}

fn parse_integer(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok()? as i64,
        None => digits.parse::<i64>().ok()?,
    };

    Some(if negative {
        magnitude.wrapping_neg()
    } else {
        magnitude
    })
}

fn hex_to_bytes(text: &str) -> Option<Vec<u8>> {
    let digits: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();

    if digits.len() % 2 != 0 {
        return None;
    }

    digits
        .chunks(2)
        .map(|pair| {
            let high = pair[0].to_digit(16)?;
            let low = pair[1].to_digit(16)?;
            Some((high * 16 + low) as u8)
        })
        .collect()
}

/// Removes backslash escapes. Returns `None` on a dangling backslash.
pub(crate) fn strip_backslashes(text: &str) -> Option<String> {
    let mut stripped = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            stripped.push(chars.next()?);
        } else {
            stripped.push(c);
        }
    }

    Some(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_exprs_cover_every_type() {
        assert_eq!(parse_value_expr("'hello'"), Ok(Value::from("hello")));
        assert_eq!(parse_value_expr("\"it\\'s\""), Ok(Value::from("it's")));
        assert_eq!(parse_value_expr("42"), Ok(Value::Int32(42)));
        assert_eq!(parse_value_expr("-7"), Ok(Value::Int32(-7)));
        assert_eq!(parse_value_expr("42L"), Ok(Value::Int64(42)));
        assert_eq!(parse_value_expr("0x10"), Ok(Value::Int32(16)));
        assert_eq!(parse_value_expr("1.5"), Ok(Value::Real64(1.5)));
        assert_eq!(
            parse_value_expr("[00 0f FF]"),
            Ok(Value::Opaque(vec![0x00, 0x0f, 0xff]))
        );
    }

    #[test]
    fn bad_value_exprs_are_rejected() {
        assert!(parse_value_expr("").is_err());
        assert!(parse_value_expr("'open").is_err());
        assert!(parse_value_expr("[0f").is_err());
        assert!(parse_value_expr("[0]").is_err());
        assert!(parse_value_expr("forty-two").is_err());
        assert!(parse_value_expr("99999999999").is_err());
    }

    #[test]
    fn union_prefers_extra_values() {
        let base = attributes([("a", 1), ("b", 2)]);
        let extra = attributes([("b", 3)]);

        let merged = union(&base, &extra);

        assert_eq!(merged.get("a"), Some(&Value::Int32(1)));
        assert_eq!(merged.get("b"), Some(&Value::Int32(3)));
    }

    #[test]
    fn display_uses_expression_syntax() {
        assert_eq!(Value::Int64(5).to_string(), "5L");
        assert_eq!(Value::Real64(2.0).to_string(), "2.0");
        assert_eq!(Value::Opaque(vec![1, 0xab]).to_string(), "[01 ab]");
    }
}
