//! Human-readable names built from the keys that vary across a batch.

use std::collections::{BTreeMap, BTreeSet};

use relab_core::{to_canonical_json_bytes, RelabError, Specification};
use serde_json::Value;

use crate::hash::specification_hash;

/// Longest name usable as a single path component on common filesystems.
const MAX_NAME_LEN: usize = 250;

/// Derives per-specification names from the subset of keys whose values
/// are not constant across the batch.
///
/// Two structurally equal specifications always receive the same name.
/// Specifications differing only in a key that is constant across the
/// batch share a name; that collision is the point of the scheme, not a
/// defect. Names that would exceed the path-component limit fall back to
/// [`specification_hash`].
#[derive(Debug, Clone)]
pub struct DiffNamer {
    varying: BTreeSet<String>,
    extended: BTreeSet<String>,
}

impl DiffNamer {
    /// Observes the whole batch and records which keys vary.
    ///
    /// A key present in some specifications but not all counts its absence
    /// as a distinct value. If no key varies, every key is used.
    pub fn new(specifications: &[Specification]) -> Result<Self, RelabError> {
        let mut observed: BTreeMap<&String, BTreeSet<String>> = BTreeMap::new();
        for specification in specifications {
            for (key, value) in specification.iter() {
                observed
                    .entry(key)
                    .or_default()
                    .insert(render_for_equality(value)?);
            }
        }
        for specification in specifications {
            for (key, values) in observed.iter_mut() {
                if !specification.contains_key(key) {
                    values.insert(String::from("\u{0}absent"));
                }
            }
        }
        let mut varying: BTreeSet<String> = observed
            .iter()
            .filter(|(_, values)| values.len() >= 2)
            .map(|(key, _)| (*key).clone())
            .collect();
        if varying.is_empty() {
            varying = observed.keys().map(|key| (*key).clone()).collect();
        }
        Ok(Self {
            varying,
            extended: BTreeSet::new(),
        })
    }

    /// Name derived from the originally observed varying keys.
    pub fn name(&self, specification: &Specification) -> Result<String, RelabError> {
        self.name_from_keys(specification, &self.varying)
    }

    /// Records keys outside the originally observed variance set (for
    /// example an injected iteration index) so follow-up names can
    /// distinguish them. Names for unrelated specifications are unaffected.
    pub fn extend(&mut self, specification: &Specification) {
        for key in specification.keys() {
            if !self.varying.contains(key) {
                self.extended.insert(key.clone());
            }
        }
    }

    /// Name derived from the union of varying and extended keys.
    pub fn extended_name(&self, specification: &Specification) -> Result<String, RelabError> {
        let keys: BTreeSet<String> = self.varying.union(&self.extended).cloned().collect();
        self.name_from_keys(specification, &keys)
    }

    fn name_from_keys(
        &self,
        specification: &Specification,
        keys: &BTreeSet<String>,
    ) -> Result<String, RelabError> {
        let mut segments = Vec::new();
        for key in keys {
            if let Some(value) = specification.get(key) {
                segments.push(format!("{}:{}", sanitize(key), render_value(value)));
            }
        }
        let name = segments.join("_");
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return specification_hash(specification);
        }
        Ok(name)
    }
}

fn render_for_equality(value: &Value) -> Result<String, RelabError> {
    let bytes = to_canonical_json_bytes(value)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn render_value(value: &Value) -> String {
    let rendered = match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    sanitize(&rendered)
}

/// Keeps names legal as path components: anything outside a small safe
/// alphabet becomes a hyphen.
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(pairs: &[(&str, Value)]) -> Specification {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn only_varying_keys_appear() {
        let batch = vec![
            spec(&[("seed", json!(1)), ("model", json!("cnn"))]),
            spec(&[("seed", json!(2)), ("model", json!("cnn"))]),
        ];
        let namer = DiffNamer::new(&batch).expect("namer");
        assert_eq!(namer.name(&batch[0]).expect("name"), "seed:1");
        assert_eq!(namer.name(&batch[1]).expect("name"), "seed:2");
    }

    #[test]
    fn constant_key_differences_collide_by_design() {
        let batch = vec![
            spec(&[("seed", json!(1)), ("model", json!("cnn"))]),
            spec(&[("seed", json!(2)), ("model", json!("cnn"))]),
        ];
        let namer = DiffNamer::new(&batch).expect("namer");
        let off_batch = spec(&[("seed", json!(1)), ("model", json!("rnn"))]);
        assert_eq!(
            namer.name(&batch[0]).expect("name"),
            namer.name(&off_batch).expect("name")
        );
    }

    #[test]
    fn absent_key_counts_as_a_distinct_value() {
        let batch = vec![
            spec(&[("seed", json!(1))]),
            spec(&[("seed", json!(1)), ("extra", json!(true))]),
        ];
        let namer = DiffNamer::new(&batch).expect("namer");
        assert_eq!(namer.name(&batch[1]).expect("name"), "extra:true");
        // The spec lacking every varying key has no segments to show, so
        // it gets the hash form.
        assert_eq!(
            namer.name(&batch[0]).expect("name"),
            specification_hash(&batch[0]).expect("hash")
        );
    }

    #[test]
    fn all_keys_used_when_nothing_varies() {
        let batch = vec![spec(&[("seed", json!(1)), ("model", json!("cnn"))])];
        let namer = DiffNamer::new(&batch).expect("namer");
        assert_eq!(namer.name(&batch[0]).expect("name"), "model:cnn_seed:1");
    }

    #[test]
    fn overlong_names_fall_back_to_the_hash() {
        let long = "x".repeat(300);
        let batch = vec![
            spec(&[("text", json!(long.clone()))]),
            spec(&[("text", json!("short"))]),
        ];
        let namer = DiffNamer::new(&batch).expect("namer");
        let name = namer.name(&batch[0]).expect("name");
        assert_eq!(name, specification_hash(&batch[0]).expect("hash"));
        assert!(name.len() <= MAX_NAME_LEN);
    }

    #[test]
    fn extension_adds_injected_keys_without_touching_plain_names() {
        let batch = vec![spec(&[("seed", json!(1))]), spec(&[("seed", json!(2))])];
        let mut namer = DiffNamer::new(&batch).expect("namer");
        let follow_up = batch[0].with("num_calls", json!(10));
        namer.extend(&follow_up);
        assert_eq!(
            namer.extended_name(&follow_up).expect("name"),
            "num_calls:10_seed:1"
        );
        assert_eq!(namer.name(&batch[1]).expect("name"), "seed:2");
    }

    #[test]
    fn unsafe_characters_are_sanitized() {
        let batch = vec![
            spec(&[("path", json!("a/b,c"))]),
            spec(&[("path", json!("d"))]),
        ];
        let namer = DiffNamer::new(&batch).expect("namer");
        assert_eq!(namer.name(&batch[0]).expect("name"), "path:a-b-c");
    }
}
