//! Canonical JSON helpers with deterministic key ordering.

use std::collections::BTreeMap;
use std::iter::FromIterator;

use ::serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{ErrorInfo, RelabError};

fn serde_error(code: &str, err: impl ToString) -> RelabError {
    RelabError::Serde(ErrorInfo::new(code, err.to_string()))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut ordered = BTreeMap::new();
            for (key, val) in map {
                ordered.insert(key, canonicalize(val));
            }
            Value::Object(Map::from_iter(ordered))
        }
        Value::Array(values) => {
            let canonical_values = values.into_iter().map(canonicalize).collect();
            Value::Array(canonical_values)
        }
        other => other,
    }
}

/// Serializes a value into canonical JSON bytes with deterministic ordering.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, RelabError> {
    let value = serde_json::to_value(value).map_err(|err| serde_error("json-encode", err))?;
    let canonical = canonicalize(value);
    let mut bytes = Vec::new();
    serde_json::to_writer(&mut bytes, &canonical).map_err(|err| serde_error("json-write", err))?;
    Ok(bytes)
}

/// Restores a value from canonical JSON bytes.
pub fn from_json_slice<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, RelabError> {
    serde_json::from_slice(data).map_err(|err| serde_error("json-read", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_bytes_are_key_sorted_at_every_depth() {
        let value = json!({"z": 1, "a": {"y": 2, "b": [ {"k": 0, "a": 1} ]}});
        let bytes = to_canonical_json_bytes(&value).expect("encode");
        assert_eq!(
            String::from_utf8(bytes).expect("utf8"),
            r#"{"a":{"b":[{"a":1,"k":0}],"y":2},"z":1}"#
        );
    }
}
