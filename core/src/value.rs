//! Dynamic value model.
//!
//! Schemas validate [`Value`]s rather than concrete Rust types. The model
//! mirrors what a loosely-typed input can carry, plus a native byte sequence
//! ([`Value::Bytes`]) and an explicit [`Value::Undefined`] for "no value was
//! supplied", which is distinct from `null`.
//!
//! Values convert to and from [`serde_json::Value`]. Byte sequences travel
//! through JSON as `{"type": "Buffer", "data": [..]}` objects.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Key/value payload attached to errors, rule options and render contexts.
pub type Context = BTreeMap<String, Value>;

/// Representation names reported by [`Value::representation`].
pub const REPRESENTATIONS: &[&str] = &[
    "undefined",
    "null",
    "boolean",
    "number",
    "string",
    "binary",
    "array",
    "object",
];

/// A dynamically-typed value under validation.
///
/// # Examples
///
/// ```
/// use typeshape_core::Value;
///
/// let value = Value::from("5");
/// assert_eq!(value.representation(), "string");
/// assert_eq!(Value::from(vec![0x35u8]).representation(), "binary");
/// assert!(Value::Undefined.is_undefined());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value supplied.
    #[default]
    Undefined,
    /// Explicit null.
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Native byte sequence.
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the name of this value's runtime representation.
    ///
    /// Coercions are keyed by these names (see [`REPRESENTATIONS`]).
    pub fn representation(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bytes(_) => "binary",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_bytes(&self) -> bool {
        matches!(self, Value::Bytes(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the length of strings (in characters), byte sequences, arrays
    /// and objects.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.chars().count()),
            Value::Bytes(b) => Some(b.len()),
            Value::Array(items) => Some(items.len()),
            Value::Object(map) => Some(map.len()),
            _ => None,
        }
    }

    /// Truthiness used by conditional templates and reference-only branches.
    ///
    /// `undefined`, `null`, `false`, `0`, `NaN` and `""` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Bytes(_) | Value::Array(_) | Value::Object(_) => true,
        }
    }

    /// Looks up a single child by key.
    ///
    /// Objects are indexed by key, arrays and byte sequences by position, and
    /// the pseudo-key `length` yields [`Value::len`] for any sized value.
    pub fn child(&self, key: &str) -> Value {
        match self {
            Value::Object(map) => {
                if let Some(found) = map.get(key) {
                    return found.clone();
                }
            }
            Value::Array(items) => {
                if let Some(found) = key.parse::<usize>().ok().and_then(|i| items.get(i)) {
                    return found.clone();
                }
            }
            Value::Bytes(bytes) => {
                if let Some(byte) = key.parse::<usize>().ok().and_then(|i| bytes.get(i)) {
                    return Value::Number(f64::from(*byte));
                }
            }
            _ => {}
        }

        if key == "length" {
            if let Some(len) = self.len() {
                return Value::from(len);
            }
        }

        Value::Undefined
    }

    /// Follows a path of keys, yielding [`Value::Undefined`] when any segment
    /// is missing.
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Value {
        let mut current = self.clone();
        for segment in path {
            current = current.child(segment.as_ref());
            if current.is_undefined() {
                break;
            }
        }
        current
    }

    /// Converts a JSON value, recognizing `{"type": "Buffer", "data": [..]}`
    /// as a byte sequence.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                if let Some(bytes) = buffer_bytes(&map) {
                    return Value::Bytes(bytes);
                }
                Value::Object(
                    map.into_iter()
                        .map(|(k, v)| (k, Value::from_json(v)))
                        .collect(),
                )
            }
        }
    }

    /// Converts to JSON. `undefined` becomes `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(bytes) => serde_json::json!({
                "type": "Buffer",
                "data": bytes,
            }),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

fn buffer_bytes(map: &serde_json::Map<String, serde_json::Value>) -> Option<Vec<u8>> {
    if map.len() != 2 || map.get("type")?.as_str()? != "Buffer" {
        return None;
    }
    map.get("data")?
        .as_array()?
        .iter()
        .map(|item| item.as_u64().and_then(|n| u8::try_from(n).ok()))
        .collect()
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

/// Message rendering form: strings are rendered bare, arrays as `[a, b]`,
/// objects as JSON, `undefined` as the empty string.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => Ok(()),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Bytes(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
            Value::Array(items) => {
                f.write_str("[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Object(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from_json)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

macro_rules! value_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

value_from_int!(i32, i64, u32, u64, usize);

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value::Bytes(bytes.to_vec())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Context> for Value {
    fn from(map: Context) -> Self {
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_representation_names() {
        assert_eq!(Value::Undefined.representation(), "undefined");
        assert_eq!(Value::from("x").representation(), "string");
        assert_eq!(Value::from(vec![1u8]).representation(), "binary");
        assert_eq!(Value::from(3).representation(), "number");
        for value in [Value::Null, Value::Bool(true), Value::Array(vec![])] {
            assert!(REPRESENTATIONS.contains(&value.representation()));
        }
    }

    #[test]
    fn test_lookup_follows_paths_and_length() {
        let value = Value::from(json!({"error": {"message": "boom"}, "valids": [1, 2]}));
        assert_eq!(value.lookup(&["error", "message"]), Value::from("boom"));
        assert_eq!(value.lookup(&["valids", "length"]), Value::from(2));
        assert_eq!(value.lookup(&["missing", "deeper"]), Value::Undefined);
    }

    #[test]
    fn test_json_buffer_objects_become_bytes() {
        let value = Value::from(json!({"type": "Buffer", "data": [1, 2, 255]}));
        assert_eq!(value, Value::Bytes(vec![1, 2, 255]));
        assert_eq!(value.to_json(), json!({"type": "Buffer", "data": [1, 2, 255]}));
    }

    #[test]
    fn test_display_for_messages() {
        assert_eq!(Value::from(3).to_string(), "3");
        assert_eq!(Value::Undefined.to_string(), "");
        assert_eq!(
            Value::Array(vec![Value::from("a"), Value::from(1)]).to_string(),
            "[a, 1]"
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::from("").is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(Value::Bytes(vec![]).is_truthy());
    }
}
