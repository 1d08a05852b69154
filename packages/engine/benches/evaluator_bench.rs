// packages/engine/benches/evaluator_bench.rs
//! Rule evaluation throughput

use autopilot_engine::rules::{evaluate, Condition, RuleNode};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::collections::BTreeMap;

fn rules(count: usize) -> Vec<RuleNode> {
    (0..count)
        .map(|i| {
            let when = Condition::parse(&format!(
                "(hp < {} && facing == east) || exists(target_{})",
                i % 100,
                i
            ))
            .unwrap();
            let rule = RuleNode::new(format!("rule-{}", i), when).with_priority((i % 7) as i32);
            if i % 3 == 0 {
                rule.exclusive()
            } else {
                rule
            }
        })
        .collect()
}

fn facts() -> BTreeMap<String, serde_json::Value> {
    let mut facts = BTreeMap::new();
    facts.insert("hp".to_string(), json!(40));
    facts.insert("facing".to_string(), json!("east"));
    facts.insert("target_7".to_string(), json!({"x": 1}));
    facts
}

fn bench_evaluate(c: &mut Criterion) {
    let facts = facts();
    let mut group = c.benchmark_group("evaluate");
    for count in [10usize, 100, 1000] {
        let rules = rules(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &rules, |b, rules| {
            b.iter(|| evaluate(black_box(&facts), black_box(rules)).len())
        });
    }
    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    c.bench_function("condition_parse", |b| {
        b.iter(|| Condition::parse(black_box("!(hp >= 50) && (state == \"combat\" || exists(boss))")))
    });
}

criterion_group!(benches, bench_evaluate, bench_parse);
criterion_main!(benches);
