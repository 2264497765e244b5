/*!
 * Action parameter coercion.
 *
 * Parameters reach a device either from JSON (chains, events) or from a
 * query string, where every value is text. These helpers accept both.
 */
use std::ops::RangeInclusive;

use breadboard_core::types::{Parameters, Value};

use crate::device::{ActionError, Result};

/// An optional integer parameter
pub fn integer(params: &Parameters, name: &str) -> Result<Option<i64>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .coerce_integer()
            .map(Some)
            .ok_or_else(|| ActionError::invalid(name, format!("expected an integer, got `{}`", value))),
    }
}

/// A required integer parameter
pub fn required_integer(params: &Parameters, name: &str) -> Result<i64> {
    integer(params, name)?.ok_or_else(|| ActionError::invalid(name, "required parameter is missing"))
}

/// An optional integer parameter limited to `range`
pub fn integer_in(params: &Parameters, name: &str, range: RangeInclusive<i64>) -> Result<Option<i64>> {
    match integer(params, name)? {
        Some(v) if !range.contains(&v) => Err(ActionError::invalid(
            name,
            format!("{} is outside {}-{}", v, range.start(), range.end()),
        )),
        other => Ok(other),
    }
}

/// A required percentage (0-100)
pub fn required_percent(params: &Parameters, name: &str) -> Result<u8> {
    let value = integer_in(params, name, 0..=100)?
        .ok_or_else(|| ActionError::invalid(name, "required parameter is missing"))?;
    Ok(value as u8)
}

/// A boolean parameter, false when absent
pub fn flag(params: &Parameters, name: &str) -> Result<bool> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(false),
        Some(value) => value
            .coerce_bool()
            .ok_or_else(|| ActionError::invalid(name, format!("expected a boolean, got `{}`", value))),
    }
}

/// An optional text parameter; scalars are rendered as text
pub fn text(params: &Parameters, name: &str) -> Result<Option<String>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(v @ (Value::Integer(_) | Value::Float(_) | Value::Bool(_))) => Ok(Some(v.to_string())),
        Some(other) => Err(ActionError::invalid(
            name,
            format!("expected text, got {}", other.type_name()),
        )),
    }
}

/// A required text parameter
pub fn required_text(params: &Parameters, name: &str) -> Result<String> {
    text(params, name)?.ok_or_else(|| ActionError::invalid(name, "required parameter is missing"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(entries: &[(&str, Value)]) -> Parameters {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_integers_accept_query_text() {
        let p = params(&[("value", Value::from("40")), ("bad", Value::from("fast"))]);
        assert_eq!(required_integer(&p, "value"), Ok(40));
        assert_eq!(integer(&p, "missing"), Ok(None));
        assert!(matches!(
            integer(&p, "bad"),
            Err(ActionError::InvalidParameter { name, .. }) if name == "bad"
        ));
    }

    #[test]
    fn test_ranges_are_enforced() {
        let p = params(&[("value", Value::Integer(101))]);
        assert_eq!(
            required_percent(&p, "value"),
            Err(ActionError::invalid("value", "101 is outside 0-100"))
        );
        let p = params(&[("value", Value::Integer(100))]);
        assert_eq!(required_percent(&p, "value"), Ok(100));
    }

    #[test]
    fn test_flags_accept_query_text() {
        let p = params(&[("status", Value::from("true")), ("error", Value::Bool(false)), ("bad", Value::from("sure"))]);
        assert_eq!(flag(&p, "status"), Ok(true));
        assert_eq!(flag(&p, "error"), Ok(false));
        assert_eq!(flag(&p, "missing"), Ok(false));
        assert!(flag(&p, "bad").is_err());
    }

    #[test]
    fn test_text_renders_scalars() {
        let p = params(&[("message", Value::Integer(42)), ("list", Value::Array(vec![]))]);
        assert_eq!(required_text(&p, "message"), Ok("42".to_string()));
        assert!(text(&p, "list").is_err());
        assert_eq!(
            required_text(&p, "missing"),
            Err(ActionError::invalid("missing", "required parameter is missing"))
        );
    }
}
