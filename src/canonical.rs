/// Deterministic JSON canonicalization.
///
/// Canonical bytes are the sole input to content hashing, so two
/// structurally equal values must serialize identically regardless of how
/// they were constructed:
/// - object keys sorted bytewise, compact separators, no whitespace
/// - strings escaped the same way serde_json escapes them
/// - integers in plain decimal, floats in shortest round-trip form
///
/// Non-finite numbers and nesting beyond `MAX_DEPTH` are rejected with
/// `UnsupportedType` rather than producing ambiguous output.
use serde_json::Value;

use crate::error::{AttestError, Result};

/// Recursion bound for nested values.
pub const MAX_DEPTH: usize = 128;

/// Serialize a JSON-compatible value to its canonical byte form.
pub fn to_canonical_bytes(value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_value(&mut out, value, 0)?;
    Ok(out)
}

fn write_value(out: &mut Vec<u8>, value: &Value, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(AttestError::UnsupportedType(format!(
            "nesting deeper than {MAX_DEPTH} levels"
        )));
    }

    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => {
            if n.as_i64().is_none() && n.as_u64().is_none() {
                match n.as_f64() {
                    Some(f) if f.is_finite() => {}
                    _ => {
                        return Err(AttestError::UnsupportedType(
                            "non-finite number cannot be canonicalized".into(),
                        ))
                    }
                }
            }
            out.extend_from_slice(n.to_string().as_bytes());
        }
        Value::String(s) => write_string(out, s)?,
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(out, item, depth + 1)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push(b'{');
            for (i, (key, item)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(out, key)?;
                out.push(b':');
                write_value(out, item, depth + 1)?;
            }
            out.push(b'}');
        }
    }

    Ok(())
}

fn write_string(out: &mut Vec<u8>, s: &str) -> Result<()> {
    let escaped =
        serde_json::to_string(s).map_err(|e| AttestError::Serialization(e.to_string()))?;
    out.extend_from_slice(escaped.as_bytes());
    Ok(())
}
