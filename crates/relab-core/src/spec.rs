//! The specification data model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal output of a unit of work: a JSON object map.
pub type ResultMap = serde_json::Map<String, Value>;

/// One parameter set describing a unit of work to run.
///
/// Specifications are order-irrelevant mappings from parameter names to
/// JSON-representable values with structural equality. The engine never
/// mutates a specification it was handed; augmentation (for example an
/// injected iteration index) goes through [`Specification::with`], which
/// returns a copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Specification(BTreeMap<String, Value>);

impl Specification {
    /// Creates an empty specification.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Returns the value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// True if the specification carries `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Inserts a parameter, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Returns a copy of this specification with one parameter added.
    pub fn with(&self, key: impl Into<String>, value: Value) -> Self {
        let mut copy = self.clone();
        copy.insert(key, value);
        copy
    }

    /// Iterates parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Iterates parameter names in key order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the specification carries no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, Value>> for Specification {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Specification {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Persisted completion record: the specification that produced a result
/// together with the result itself.
///
/// The result type defaults to [`Value`] but may be any serializable
/// type; results that JSON cannot represent (for example non-finite
/// floats) are persisted through the binary fallback instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord<R = Value> {
    /// The originating specification.
    pub specification: Specification,
    /// The terminal (or intermediate) output of the unit of work.
    pub result: R,
}

impl<R> ResultRecord<R> {
    /// Builds a record from a specification and its result.
    pub fn new(specification: Specification, result: R) -> Self {
        Self {
            specification,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structural_equality_ignores_insertion_order() {
        let mut a = Specification::new();
        a.insert("seed", json!(1));
        a.insert("num_calls", json!(1));
        let mut b = Specification::new();
        b.insert("num_calls", json!(1));
        b.insert("seed", json!(1));
        assert_eq!(a, b);
    }

    #[test]
    fn with_leaves_the_original_untouched() {
        let base: Specification = [("seed".to_string(), json!(7))].into_iter().collect();
        let extended = base.with("index", json!(3));
        assert!(!base.contains_key("index"));
        assert_eq!(extended.get("index"), Some(&json!(3)));
        assert_eq!(extended.get("seed"), Some(&json!(7)));
    }

    #[test]
    fn serializes_transparently_as_a_json_object() {
        let spec: Specification = [
            ("seed".to_string(), json!(1)),
            ("rate".to_string(), json!(0.5)),
        ]
        .into_iter()
        .collect();
        let text = serde_json::to_string(&spec).expect("serialize");
        assert_eq!(text, r#"{"rate":0.5,"seed":1}"#);
        let back: Specification = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(back, spec);
    }
}
