use criterion::{black_box, criterion_group, criterion_main, Criterion};

use acv_core::InMemorySource;
use acv_interchange::{CodecLimits, Format, Value};

const ORDERS_RULES: &str = r#"{
  "schemaVersion": "1.2", "inputFormat": "json", "outputFormat": "json",
  "root": { "kind": "sequence", "steps": [
    { "kind": "field", "source": "customer.id", "target": "customerId" },
    { "kind": "field", "source": "customer.name", "transforms": ["trim", "uppercase"], "target": "name" },
    { "kind": "split", "source": "orders", "target": "items", "item": { "kind": "sequence", "steps": [
      { "kind": "field", "source": "id", "target": "orderId" },
      { "kind": "field", "source": "total", "transforms": [{ "name": "round", "args": [2] }], "target": "amount" },
      { "kind": "condition",
        "when": { "op": "greaterThan", "source": "total", "value": 100 },
        "then": { "kind": "field", "value": true, "target": "large" } } ] } } ] }
}"#;

fn orders_input(count: usize) -> Value {
    let orders: Vec<serde_json::Value> = (0..count)
        .map(|i| serde_json::json!({ "id": format!("o-{}", i), "total": i as f64 * 3.337 }))
        .collect();
    Value::from_json(serde_json::json!({
        "customer": { "id": "c-1", "name": "  jane doe " },
        "orders": orders
    }))
}

fn bench_compile(c: &mut Criterion) {
    let source = InMemorySource::new();
    c.bench_function("compile_orders_rules", |b| {
        b.iter(|| acv_core::compile(black_box(ORDERS_RULES), &source))
    });
}

fn bench_execute(c: &mut Criterion) {
    let plan = acv_core::compile(ORDERS_RULES, &InMemorySource::new()).unwrap();
    let input = orders_input(100);
    c.bench_function("execute_split_100_items", |b| {
        b.iter(|| acv_eval::execute(black_box(&plan), black_box(&input)))
    });
}

fn bench_convert_text(c: &mut Criterion) {
    let plan = acv_core::compile(ORDERS_RULES, &InMemorySource::new()).unwrap();
    let text = serde_json::to_string(&orders_input(100).to_json()).unwrap();
    let limits = CodecLimits::default();
    c.bench_function("convert_json_100_items", |b| {
        b.iter(|| {
            acv_eval::convert(
                black_box(&plan),
                black_box(&text),
                Format::Json,
                Format::Json,
                false,
                &limits,
            )
        })
    });
}

criterion_group!(benches, bench_compile, bench_execute, bench_convert_text);
criterion_main!(benches);
