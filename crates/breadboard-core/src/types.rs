/*!
 * Core data types for Breadboard.
 *
 * [`Value`] is the dynamic value carried by action parameters, action
 * results and device states. Values coming from a query string are always
 * strings, so the `coerce_*` helpers accept textual forms as well.
 */
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A dynamically typed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Null value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Integer(i64),
    /// Floating-point value
    Float(f64),
    /// String value
    String(String),
    /// Array of values
    Array(Vec<Value>),
    /// Map of string keys to values
    Object(HashMap<String, Value>),
}

/// Named arguments of one action invocation
pub type Parameters = HashMap<String, Value>;

impl Value {
    /// Build an object value from key/value pairs
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// An empty object, the result of actions with nothing to report
    pub fn empty() -> Self {
        Value::Object(HashMap::new())
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if the value is numeric (integer or float)
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Check if the value is a string
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Try to get a boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get an integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if *f == (*f as i64) as f64 => Some(*f as i64),
            _ => None,
        }
    }

    /// Try to get a float value
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get an array value
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Try to get an object value
    pub fn as_object(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Integer view that also accepts numeric strings such as `"255"`
    pub fn coerce_integer(&self) -> Option<i64> {
        match self {
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.fract() == 0.0)
                        .map(|f| f as i64)
                })
            }
            other => other.as_integer(),
        }
    }

    /// Float view that also accepts numeric strings
    pub fn coerce_float(&self) -> Option<f64> {
        match self {
            Value::String(s) => s.trim().parse::<f64>().ok(),
            other => other.as_float(),
        }
    }

    /// Boolean view that also accepts `true`/`false`/`1`/`0` strings and 0/1 integers
    pub fn coerce_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Integer(0) => Some(false),
            Value::Integer(1) => Some(true),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// A short name for the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

/// Strings render bare; everything else renders as JSON.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", serde_json::Value::from(other.clone())),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<u8> for Value {
    fn from(i: u8) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
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

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(o: HashMap<String, Value>) -> Self {
        Value::Object(o)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Object(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Integer(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(a) => {
                serde_json::Value::Array(a.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Object(o) => serde_json::Value::Object(
                o.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_as_methods() {
        let v = Value::Integer(42);
        assert_eq!(v.as_integer(), Some(42));
        assert_eq!(v.as_float(), Some(42.0));

        let v = Value::Float(3.0);
        assert_eq!(v.as_integer(), Some(3));

        let v = Value::Float(3.14);
        assert_eq!(v.as_integer(), None); // Not an exact integer

        let v = Value::String("hello".to_string());
        assert_eq!(v.as_str(), Some("hello"));
        assert_eq!(v.as_bool(), None);
    }

    #[test]
    fn test_coercion_from_query_strings() {
        assert_eq!(Value::from("255").coerce_integer(), Some(255));
        assert_eq!(Value::from(" 10 ").coerce_integer(), Some(10));
        assert_eq!(Value::from("10.0").coerce_integer(), Some(10));
        assert_eq!(Value::from("10.5").coerce_integer(), None);
        assert_eq!(Value::from("ten").coerce_integer(), None);
        assert_eq!(Value::from("0.5").coerce_float(), Some(0.5));
        assert_eq!(Value::from("TRUE").coerce_bool(), Some(true));
        assert_eq!(Value::Integer(0).coerce_bool(), Some(false));
        assert_eq!(Value::from("maybe").coerce_bool(), None);
    }

    #[test]
    fn test_json_conversion() {
        let json = json!({"state": "on", "level": 3, "ratio": 0.5, "tags": [true, null]});
        let value = Value::from(json.clone());

        let object = value.as_object().unwrap();
        assert_eq!(object["state"], Value::from("on"));
        assert_eq!(object["level"], Value::Integer(3));
        assert_eq!(object["ratio"], Value::Float(0.5));
        assert_eq!(
            object["tags"],
            Value::Array(vec![Value::Bool(true), Value::Null])
        );

        assert_eq!(serde_json::Value::from(value), json);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from("on").to_string(), "on");
        assert_eq!(Value::Integer(7).to_string(), "7");
        assert_eq!(Value::Null.to_string(), "null");
    }

    #[test]
    fn test_object_builder() {
        let v = Value::object([("state", Value::from("off"))]);
        assert_eq!(v.as_object().unwrap().get("state"), Some(&Value::from("off")));
        assert_eq!(Value::empty(), Value::Object(HashMap::new()));
    }
}
