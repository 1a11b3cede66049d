//! Coercion from raw JSON argument values to typed [`ParameterValue`]s.
//!
//! Every declared [`ParameterKind`] is handled by one arm of one match; there
//! is no reflection and no string-keyed type registry. A failed coercion is a
//! [`DataError::Coercion`] the caller logs and skips — it never aborts the
//! surrounding function call.

use serde_json::Value;

use super::{ParameterKind, ParameterValue};
use crate::errors::DataError;

/// Coerce one raw argument value to its declared kind.
pub fn coerce(kind: &ParameterKind, raw: &Value) -> Result<ParameterValue, DataError> {
    match kind {
        ParameterKind::String => Ok(ParameterValue::Str(as_text(raw))),
        ParameterKind::Float => parse_float(raw).map(ParameterValue::Float),
        ParameterKind::Int => parse_int(raw).map(ParameterValue::Int),
        ParameterKind::Bool => parse_bool(raw).map(ParameterValue::Bool),
        ParameterKind::Vector2 => parse_floats::<2>(raw).map(ParameterValue::Vector2),
        ParameterKind::Vector3 => parse_floats::<3>(raw).map(ParameterValue::Vector3),
        ParameterKind::Vector4 => parse_floats::<4>(raw).map(ParameterValue::Vector4),
        // Quaternions reuse the 4-float vector parse
        ParameterKind::Quaternion => parse_floats::<4>(raw).map(ParameterValue::Quaternion),
        ParameterKind::Color => parse_hex_color(raw, "color").map(ParameterValue::Color),
        ParameterKind::Color32 => parse_hex_color(raw, "color32").map(ParameterValue::Color32),
        ParameterKind::Enum { values } => parse_enum(raw, values),
    }
}

/// Text form of a JSON value: strings verbatim, everything else as JSON text.
fn as_text(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_float(raw: &Value) -> Result<f32, DataError> {
    match raw {
        Value::Number(n) => n
            .as_f64()
            .map(|f| f as f32)
            .ok_or_else(|| coercion_error("float", raw)),
        Value::String(s) => s
            .trim()
            .parse::<f32>()
            .map_err(|_| coercion_error("float", raw)),
        _ => Err(coercion_error("float", raw)),
    }
}

fn parse_int(raw: &Value) -> Result<i64, DataError> {
    match raw {
        Value::Number(n) => n.as_i64().ok_or_else(|| coercion_error("int", raw)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| coercion_error("int", raw)),
        _ => Err(coercion_error("int", raw)),
    }
}

fn parse_bool(raw: &Value) -> Result<bool, DataError> {
    match raw {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.trim() {
            t if t.eq_ignore_ascii_case("true") || t == "1" => Ok(true),
            t if t.eq_ignore_ascii_case("false") || t == "0" => Ok(false),
            _ => Err(coercion_error("bool", raw)),
        },
        Value::Number(n) => match n.as_i64() {
            Some(1) => Ok(true),
            Some(0) => Ok(false),
            _ => Err(coercion_error("bool", raw)),
        },
        _ => Err(coercion_error("bool", raw)),
    }
}

/// Parse exactly `N` comma-separated floats, parentheses optional, from a
/// string value or a JSON array of numbers.
fn parse_floats<const N: usize>(raw: &Value) -> Result<[f32; N], DataError> {
    let kind = match N {
        2 => "vector2",
        3 => "vector3",
        _ => "vector4",
    };

    let parts: Vec<f32> = match raw {
        Value::String(s) => {
            let trimmed = s.trim().trim_start_matches('(').trim_end_matches(')');
            let mut out = Vec::with_capacity(N);
            for piece in trimmed.split(',') {
                out.push(
                    piece
                        .trim()
                        .parse::<f32>()
                        .map_err(|_| coercion_error(kind, raw))?,
                );
            }
            out
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(N);
            for item in items {
                out.push(parse_float(item).map_err(|_| coercion_error(kind, raw))?);
            }
            out
        }
        _ => return Err(coercion_error(kind, raw)),
    };

    if parts.len() != N {
        return Err(coercion_error(kind, raw));
    }
    let mut result = [0.0f32; N];
    result.copy_from_slice(&parts);
    Ok(result)
}

/// Validate a hex color string and normalize it to a `#`-prefixed form.
fn parse_hex_color(raw: &Value, kind: &'static str) -> Result<String, DataError> {
    let Value::String(s) = raw else {
        return Err(coercion_error(kind, raw));
    };
    let trimmed = s.trim();
    let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
    let valid_len = matches!(digits.len(), 3 | 4 | 6 | 8);
    if !valid_len || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(coercion_error(kind, raw));
    }
    Ok(format!("#{digits}"))
}

/// Resolve an enum member: case-insensitive name match first, numeric index
/// into the declared value list second.
fn parse_enum(raw: &Value, values: &[String]) -> Result<ParameterValue, DataError> {
    if let Value::String(s) = raw {
        let trimmed = s.trim();
        if let Some(index) = values
            .iter()
            .position(|v| v.eq_ignore_ascii_case(trimmed))
        {
            return Ok(ParameterValue::Enum {
                index,
                name: values[index].clone(),
            });
        }
        // Fall through to index parsing for numeric strings
        if let Ok(index) = trimmed.parse::<usize>() {
            if let Some(name) = values.get(index) {
                return Ok(ParameterValue::Enum {
                    index,
                    name: name.clone(),
                });
            }
        }
        return Err(coercion_error("enum", raw));
    }

    if let Some(index) = raw.as_u64() {
        let index = index as usize;
        if let Some(name) = values.get(index) {
            return Ok(ParameterValue::Enum {
                index,
                name: name.clone(),
            });
        }
    }
    Err(coercion_error("enum", raw))
}

fn coercion_error(kind: &'static str, raw: &Value) -> DataError {
    DataError::Coercion {
        kind,
        value: raw.to_string(),
    }
}
