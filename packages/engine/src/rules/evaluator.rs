// packages/engine/src/rules/evaluator.rs
//! Condition evaluator
//!
//! Selects the rules that fire for a given fact snapshot. Evaluation is a
//! pure function of its inputs.
//!
//! Tie-break:
//! - matching non-exclusive rules all fire, in declared order
//! - among matching exclusive rules only the highest `priority` fires;
//!   equal priorities go to the earliest declared rule
//! - the exclusive winner keeps its declared position in the output

use crate::rules::condition::FactSource;
use crate::rules::model::RuleNode;

/// Ordered subset of `rules` whose condition holds for `facts`
pub fn evaluate<'r>(facts: &impl FactSource, rules: &'r [RuleNode]) -> Vec<&'r RuleNode> {
    let matched: Vec<(usize, &RuleNode)> = rules
        .iter()
        .enumerate()
        .filter(|(_, rule)| rule.when.eval(facts))
        .collect();

    let exclusive_winner = matched
        .iter()
        .filter(|(_, rule)| rule.exclusive)
        // max_by_key returns the last maximum, so compare on (priority, -index)
        .max_by_key(|(index, rule)| (rule.priority, std::cmp::Reverse(*index)))
        .map(|(index, _)| *index);

    matched
        .into_iter()
        .filter(|(index, rule)| !rule.exclusive || Some(*index) == exclusive_winner)
        .map(|(_, rule)| rule)
        .collect()
}

/// Rule ids that fire for `facts`
pub fn matching_ids<'r>(facts: &impl FactSource, rules: &'r [RuleNode]) -> Vec<&'r str> {
    evaluate(facts, rules)
        .into_iter()
        .map(|rule| rule.id.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::condition::Condition;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn rule(id: &str, when: &str) -> RuleNode {
        RuleNode::new(id, Condition::parse(when).unwrap())
    }

    fn facts(pairs: &[(&str, serde_json::Value)]) -> BTreeMap<String, serde_json::Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_only_matching_rules_fire() {
        let rules = vec![rule("turn-left", "facing == east"), rule("turn-right", "facing == west")];
        let f = facts(&[("facing", json!("east"))]);
        assert_eq!(matching_ids(&f, &rules), vec!["turn-left"]);
    }

    #[test]
    fn test_non_exclusive_fire_in_declared_order() {
        let rules = vec![
            rule("c", "hp < 50").with_priority(1),
            rule("a", "hp < 80").with_priority(9),
            rule("b", "true"),
        ];
        let f = facts(&[("hp", json!(10))]);
        assert_eq!(matching_ids(&f, &rules), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_highest_priority_exclusive_wins() {
        let rules = vec![
            rule("low", "true").exclusive().with_priority(1),
            rule("always", "true"),
            rule("high", "true").exclusive().with_priority(5),
            rule("unmatched", "false").exclusive().with_priority(100),
        ];
        let f = facts(&[]);
        assert_eq!(matching_ids(&f, &rules), vec!["always", "high"]);
    }

    #[test]
    fn test_equal_priority_exclusive_prefers_first_declared() {
        let rules = vec![
            rule("first", "true").exclusive().with_priority(3),
            rule("second", "true").exclusive().with_priority(3),
        ];
        assert_eq!(matching_ids(&facts(&[]), &rules), vec!["first"]);
    }

    #[test]
    fn test_no_matches() {
        let rules = vec![rule("a", "x == 1")];
        assert!(evaluate(&facts(&[]), &rules).is_empty());
    }

    proptest! {
        #[test]
        fn prop_evaluation_is_pure(
            hp in 0i64..200,
            facing in prop::sample::select(vec!["east", "west", "north"]),
            repeats in 1usize..5,
        ) {
            let rules = vec![
                rule("low-hp", "hp < 50").exclusive().with_priority(10),
                rule("east", "facing == east"),
                rule("west", "facing == west").exclusive().with_priority(1),
                rule("healthy", "hp >= 50 && !(facing == north)"),
            ];
            let f = facts(&[("hp", json!(hp)), ("facing", json!(facing))]);

            let first = matching_ids(&f, &rules);
            for _ in 0..repeats {
                prop_assert_eq!(&matching_ids(&f, &rules), &first);
            }
            // at most one exclusive rule fires
            let exclusive_fired = evaluate(&f, &rules).iter().filter(|r| r.exclusive).count();
            prop_assert!(exclusive_fired <= 1);
        }
    }
}
