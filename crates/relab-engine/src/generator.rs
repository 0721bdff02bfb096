//! Expansion of compact specification templates into concrete batches.

use std::fs;
use std::path::Path;

use relab_core::{ErrorInfo, RelabError, Specification};
use serde_json::Value;

/// Expands a template specification into the cross product of its
/// list-valued keys.
///
/// A key bound to an array is an axis: one output specification per
/// element. Any other value is held constant. To pass an array
/// *literal* through unexpanded, nest it: `"layers": [[64, 32]]` is an
/// axis with the single variant `[64, 32]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecificationGenerator;

impl SpecificationGenerator {
    /// Expands `template` into concrete specifications. Keys expand in
    /// sorted order with the last key varying fastest.
    pub fn generate(template: &Specification) -> Vec<Specification> {
        let axes: Vec<(&String, Vec<Value>)> = template
            .iter()
            .map(|(key, value)| {
                let variants = match value {
                    Value::Array(items) => items.clone(),
                    other => vec![other.clone()],
                };
                (key, variants)
            })
            .collect();
        let mut out = Vec::new();
        let mut current = Specification::new();
        expand(&axes, 0, &mut current, &mut out);
        out
    }

    /// Reads one template object, or a list of them, from the JSON file
    /// at `path` and expands each in order into one concatenated batch.
    pub fn from_json_file(path: &Path) -> Result<Vec<Specification>, RelabError> {
        let bytes = fs::read(path).map_err(|err| {
            RelabError::Spec(
                ErrorInfo::new("template-read", "failed to read specification template")
                    .with_context("path", path.display().to_string())
                    .with_hint(err.to_string()),
            )
        })?;
        let parsed: Value = relab_core::from_json_slice(&bytes).map_err(|err| {
            RelabError::Spec(
                ErrorInfo::new("template-parse", "specification template is not valid JSON")
                    .with_context("path", path.display().to_string())
                    .with_hint(err.to_string()),
            )
        })?;
        let raw_templates = match parsed {
            Value::Array(items) => items,
            object => vec![object],
        };
        let mut out = Vec::new();
        for raw in raw_templates {
            let template: Specification = serde_json::from_value(raw).map_err(|err| {
                RelabError::Spec(
                    ErrorInfo::new("template-parse", "specification template is not a JSON object")
                        .with_context("path", path.display().to_string())
                        .with_hint(err.to_string()),
                )
            })?;
            out.extend(Self::generate(&template));
        }
        Ok(out)
    }
}

fn expand(
    axes: &[(&String, Vec<Value>)],
    depth: usize,
    current: &mut Specification,
    out: &mut Vec<Specification>,
) {
    let Some((key, variants)) = axes.get(depth) else {
        out.push(current.clone());
        return;
    };
    for variant in variants {
        current.insert((*key).clone(), variant.clone());
        expand(axes, depth + 1, current, out);
    }
}

/// Deterministic sharding of one batch across several machines.
///
/// Every machine expands the same template, then keeps the
/// specifications whose position matches its shard: machine `index` of
/// `total` keeps positions `index`, `index + total`, and so on. The
/// shards are disjoint and together cover the batch.
#[derive(Debug, Clone, Copy)]
pub struct MultiComputerGenerator {
    index: usize,
    total: usize,
}

impl MultiComputerGenerator {
    /// Shard `index` of `total` machines. Fails when `index` is out of
    /// range or `total` is zero.
    pub fn new(index: usize, total: usize) -> Result<Self, RelabError> {
        if total == 0 || index >= total {
            return Err(RelabError::Spec(
                ErrorInfo::new("shard-range", "shard index out of range")
                    .with_context("index", index.to_string())
                    .with_context("total", total.to_string()),
            ));
        }
        Ok(MultiComputerGenerator { index, total })
    }

    /// Keeps this machine's share of `specifications`.
    pub fn partition(&self, specifications: &[Specification]) -> Vec<Specification> {
        specifications
            .iter()
            .skip(self.index)
            .step_by(self.total)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cross_product_over_list_valued_keys() {
        let template = Specification::new()
            .with("model", json!("mlp"))
            .with("seed", json!([1, 2, 3]))
            .with("lr", json!([0.1, 0.01]));
        let specs = SpecificationGenerator::generate(&template);
        assert_eq!(specs.len(), 6);
        for spec in &specs {
            assert_eq!(spec.get("model"), Some(&json!("mlp")));
        }
        // sorted keys, last axis fastest: seed cycles within each lr
        assert_eq!(specs[0].get("lr"), Some(&json!(0.1)));
        assert_eq!(specs[0].get("seed"), Some(&json!(1)));
        assert_eq!(specs[1].get("seed"), Some(&json!(2)));
        assert_eq!(specs[5].get("lr"), Some(&json!(0.01)));
    }

    #[test]
    fn double_brackets_pass_a_list_literal() {
        let template = Specification::new()
            .with("seed", json!([1]))
            .with("num_calls", json!([[10, 20, 30]]));
        let specs = SpecificationGenerator::generate(&template);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].get("num_calls"), Some(&json!([10, 20, 30])));
    }

    #[test]
    fn constant_only_template_yields_itself() {
        let template = Specification::new().with("seed", json!(7));
        let specs = SpecificationGenerator::generate(&template);
        assert_eq!(specs, vec![template]);
    }

    #[test]
    fn template_file_with_a_single_object_expands() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("template.json");
        std::fs::write(&path, r#"{"seed": [1, 2], "model": "mlp"}"#).expect("write");
        let specs = SpecificationGenerator::from_json_file(&path).expect("expand");
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].get("model"), Some(&json!("mlp")));
    }

    #[test]
    fn template_file_with_a_list_concatenates_each_expansion() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("templates.json");
        std::fs::write(&path, r#"[{"a": [1, 2]}, {"b": [3]}]"#).expect("write");
        let specs = SpecificationGenerator::from_json_file(&path).expect("expand");
        assert_eq!(specs.len(), 3);
        assert_eq!(specs[0].get("a"), Some(&json!(1)));
        assert_eq!(specs[1].get("a"), Some(&json!(2)));
        assert_eq!(specs[2].get("b"), Some(&json!(3)));
    }

    #[test]
    fn non_object_template_element_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"[{"a": [1]}, 42]"#).expect("write");
        let err = SpecificationGenerator::from_json_file(&path).expect_err("rejected");
        assert_eq!(err.info().code, "template-parse");
    }

    #[test]
    fn shards_are_disjoint_and_cover_the_batch() {
        let template = Specification::new().with("seed", json!([1, 2, 3, 4, 5, 6, 7]));
        let specs = SpecificationGenerator::generate(&template);
        let a = MultiComputerGenerator::new(0, 3).expect("shard").partition(&specs);
        let b = MultiComputerGenerator::new(1, 3).expect("shard").partition(&specs);
        let c = MultiComputerGenerator::new(2, 3).expect("shard").partition(&specs);
        assert_eq!(a.len() + b.len() + c.len(), specs.len());
        let mut merged: Vec<_> = a.into_iter().chain(b).chain(c).collect();
        merged.sort_by_key(|s| s.get("seed").and_then(Value::as_i64));
        assert_eq!(merged, specs);
    }

    #[test]
    fn out_of_range_shard_is_rejected() {
        assert!(MultiComputerGenerator::new(3, 3).is_err());
        assert!(MultiComputerGenerator::new(0, 0).is_err());
    }
}
