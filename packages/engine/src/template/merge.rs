// packages/engine/src/template/merge.rs
//! Fragment merge
//!
//! `merge` is a pure transform from an unordered set of fragments to one
//! template:
//!
//! 1. Fragments are ordered so that every fragment follows its `imports`;
//!    fragments with no ordering constraint between them are ordered by name.
//! 2. Rules are concatenated in that order.
//! 3. A rule id that appears twice is a `MergeConflict`.
//!
//! The same input always yields the same template, and therefore the same
//! artifact bytes.

use crate::rules::model::{Fragment, OperationTemplate};
use crate::utils::errors::{EngineError, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Merge `fragments` into the template `(sub_dir, name)`
pub fn merge(sub_dir: &str, name: &str, fragments: Vec<Fragment>) -> Result<OperationTemplate> {
    let ordered = order_fragments(fragments)?;

    let mut owners: HashMap<String, String> = HashMap::new();
    let mut fragment_names = Vec::with_capacity(ordered.len());
    let mut rules = Vec::new();

    for fragment in ordered {
        for rule in fragment.rules {
            if rule.id.trim().is_empty() {
                return Err(EngineError::ConfigError(format!(
                    "fragment '{}' contains a rule without an id",
                    fragment.name
                )));
            }
            if let Some(first) = owners.get(&rule.id) {
                return Err(EngineError::MergeConflict {
                    rule_id: rule.id,
                    first: first.clone(),
                    second: fragment.name,
                });
            }
            owners.insert(rule.id.clone(), fragment.name.clone());
            rules.push(rule);
        }
        fragment_names.push(fragment.name);
    }

    Ok(OperationTemplate {
        sub_dir: sub_dir.to_string(),
        name: name.to_string(),
        fragments: fragment_names,
        rules,
    })
}

/// Dependency order with lexicographic tie-break (Kahn's algorithm)
fn order_fragments(fragments: Vec<Fragment>) -> Result<Vec<Fragment>> {
    let mut by_name: BTreeMap<String, Fragment> = BTreeMap::new();
    for fragment in fragments {
        if fragment.name.trim().is_empty() {
            return Err(EngineError::ConfigError("fragment without a name".to_string()));
        }
        if by_name.contains_key(&fragment.name) {
            return Err(EngineError::ConfigError(format!(
                "fragment '{}' is defined twice",
                fragment.name
            )));
        }
        by_name.insert(fragment.name.clone(), fragment);
    }

    let mut pending: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for (name, fragment) in &by_name {
        let mut deps = BTreeSet::new();
        for import in &fragment.imports {
            if !by_name.contains_key(import) {
                return Err(EngineError::ConfigError(format!(
                    "fragment '{}' imports unknown fragment '{}'",
                    name, import
                )));
            }
            if import != name {
                deps.insert(import.as_str());
            }
        }
        pending.insert(name.as_str(), deps);
    }

    let mut order: Vec<String> = Vec::with_capacity(by_name.len());
    while !pending.is_empty() {
        // smallest name whose imports are all placed
        let next = pending
            .iter()
            .find(|(_, deps)| deps.is_empty())
            .map(|(name, _)| *name);

        let Some(next) = next else {
            let cycle: Vec<&str> = pending.keys().copied().collect();
            return Err(EngineError::ConfigError(format!(
                "import cycle between fragments: {}",
                cycle.join(", ")
            )));
        };

        pending.remove(next);
        for deps in pending.values_mut() {
            deps.remove(next);
        }
        order.push(next.to_string());
    }

    Ok(order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect())
}

/// Single-file serialized form of a merged template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedArtifact {
    bytes: Vec<u8>,
}

impl MergedArtifact {
    pub fn encode(template: &OperationTemplate) -> Result<Self> {
        let yaml = serde_yaml::to_string(template)?;
        Ok(Self {
            bytes: yaml.into_bytes(),
        })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Parse the artifact; `source_name` labels parse errors
    pub fn decode(&self, source_name: &str) -> Result<OperationTemplate> {
        serde_yaml::from_slice(&self.bytes).map_err(|e| EngineError::parse(source_name, e))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::condition::Condition;
    use crate::rules::model::{OperationDescriptor, RuleNode};
    use proptest::prelude::*;

    fn rule(id: &str) -> RuleNode {
        RuleNode::new(id, Condition::parse(&format!("{} == on", id.replace('-', "_"))).unwrap())
            .with_operation(OperationDescriptor::new("turn").with_param("distance", serde_json::json!(1)))
    }

    #[test]
    fn test_lexicographic_order_without_imports() {
        let template = merge(
            "combat",
            "boss",
            vec![
                Fragment::new("b").with_rule(rule("rb")),
                Fragment::new("a").with_rule(rule("ra")),
            ],
        )
        .unwrap();
        assert_eq!(template.fragments, vec!["a", "b"]);
        assert_eq!(template.rules[0].id, "ra");
        assert_eq!(template.rules[1].id, "rb");
    }

    #[test]
    fn test_imports_come_first() {
        let template = merge(
            "combat",
            "boss",
            vec![
                Fragment::new("a").with_import("z").with_rule(rule("ra")),
                Fragment::new("m").with_rule(rule("rm")),
                Fragment::new("z").with_rule(rule("rz")),
            ],
        )
        .unwrap();
        assert_eq!(template.fragments, vec!["m", "z", "a"]);
    }

    #[test]
    fn test_duplicate_rule_id_conflicts() {
        let result = merge(
            "combat",
            "boss",
            vec![
                Fragment::new("a").with_rule(rule("attack")),
                Fragment::new("b").with_rule(rule("attack")),
            ],
        );
        match result {
            Err(EngineError::MergeConflict { rule_id, first, second }) => {
                assert_eq!(rule_id, "attack");
                assert_eq!(first, "a");
                assert_eq!(second, "b");
            }
            other => panic!("expected merge conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_import_and_cycle() {
        let unknown = merge("s", "t", vec![Fragment::new("a").with_import("missing")]);
        assert!(matches!(unknown, Err(EngineError::ConfigError(_))));

        let cycle = merge(
            "s",
            "t",
            vec![Fragment::new("a").with_import("b"), Fragment::new("b").with_import("a")],
        );
        assert!(matches!(cycle, Err(EngineError::ConfigError(msg)) if msg.contains("cycle")));
    }

    #[test]
    fn test_artifact_round_trip() {
        let template = merge(
            "combat",
            "boss",
            vec![Fragment::new("a").with_rule(rule("ra").exclusive().with_priority(3))],
        )
        .unwrap();
        let artifact = MergedArtifact::encode(&template).unwrap();
        assert_eq!(artifact.decode("boss.yaml").unwrap(), template);
    }

    #[test]
    fn test_malformed_artifact_is_parse_error() {
        let artifact = MergedArtifact::from_bytes(b"rules: [".to_vec());
        assert!(matches!(artifact.decode("boss.yaml"), Err(EngineError::ParseError { .. })));
    }

    proptest! {
        #[test]
        fn prop_merge_is_idempotent_and_order_independent(
            names in prop::collection::btree_set("[a-e]{1,3}", 1..6),
            shuffle_seed in any::<u64>(),
        ) {
            let names: Vec<String> = names.into_iter().collect();
            let fragments: Vec<Fragment> = names
                .iter()
                .map(|n| Fragment::new(n.clone()).with_rule(rule(&format!("rule-{}", n))))
                .collect();

            let mut shuffled = fragments.clone();
            let len = shuffled.len();
            shuffled.rotate_left((shuffle_seed as usize) % len);

            let first = MergedArtifact::encode(&merge("s", "t", fragments.clone()).unwrap()).unwrap();
            let second = MergedArtifact::encode(&merge("s", "t", fragments).unwrap()).unwrap();
            let rotated = MergedArtifact::encode(&merge("s", "t", shuffled).unwrap()).unwrap();

            prop_assert_eq!(first.as_bytes(), second.as_bytes());
            prop_assert_eq!(first.as_bytes(), rotated.as_bytes());
        }
    }
}
