//! Benchmarks for record encoding and search-response decoding.
//!
//! Run with: cargo bench -p esdump

#![allow(clippy::pedantic)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Map, Value};

use esdump::cluster::SearchResponse;
use esdump::sink::encode_record;
use esdump::Record;

fn sample_content(i: usize) -> Map<String, Value> {
    let doc = json!({
        "@timestamp": format!("2024-01-01T00:{:02}:{:02}Z", (i / 60) % 60, i % 60),
        "message": "GET /api/v1/items?page=3 HTTP/1.1 200 1532",
        "host": {"name": format!("web-{}", i % 16), "ip": "10.0.0.12"},
        "tags": ["nginx", "access", "prod"],
        "bytes": 1532,
        "latency_ms": 12.5
    });
    match doc {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn sample_hits(n: usize) -> String {
    let hits: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "_index": "logs",
                "_id": format!("doc-{}", i),
                "_score": null,
                "_source": sample_content(i),
                "sort": [1_700_000_000_000u64 + i as u64, format!("doc-{}", i)]
            })
        })
        .collect();

    json!({
        "_scroll_id": "FGluY2x1ZGVfY29udGV4dF91dWlkDXF1ZXJ5QW5kRmV0Y2gBFkx",
        "took": 3,
        "hits": {"total": {"value": n, "relation": "eq"}, "hits": hits}
    })
    .to_string()
}

/// Benchmark dump-file line encoding
fn bench_encode_record(c: &mut Criterion) {
    let record = Record::new("doc-1", "logs", sample_content(1));

    c.bench_function("encode_record", |b| {
        b.iter(|| black_box(encode_record(black_box(&record))))
    });

    let mut group = c.benchmark_group("encode_page");
    for size in [100, 1000, 10_000] {
        let records: Vec<Record> = (0..size)
            .map(|i| Record::new(format!("doc-{}", i), "logs", sample_content(i)))
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("records", size), &records, |b, records| {
            b.iter(|| {
                let mut buf = Vec::with_capacity(records.len() * 256);
                for record in records {
                    if let Ok(line) = encode_record(record) {
                        buf.extend_from_slice(&line);
                    }
                }
                black_box(buf)
            })
        });
    }
    group.finish();
}

/// Benchmark search response parsing into records
fn bench_decode_search_response(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_search_response");
    for size in [100, 1000, 10_000] {
        let body = sample_hits(size);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("hits", size), &body, |b, body| {
            b.iter(|| black_box(serde_json::from_str::<SearchResponse>(body).ok()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode_record, bench_decode_search_response);
criterion_main!(benches);
