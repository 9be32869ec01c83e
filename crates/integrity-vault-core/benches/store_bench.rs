use criterion::{criterion_group, criterion_main, Criterion};
use integrity_vault_core::{IntegrityStore, Verification};

fn payload(index: usize) -> String {
    format!("record payload #{index}: {}", "x".repeat(480))
}

fn bench_write(c: &mut Criterion) {
    let store = IntegrityStore::new("bench seed");
    let payloads = (0..1_000).map(payload).collect::<Vec<_>>();

    c.bench_function("write_1000_records", |b| {
        b.iter(|| {
            for content in &payloads {
                if let Err(err) = store.write(content.as_str()) {
                    panic!("write benchmark failed: {err}");
                }
            }
        });
    });
}

fn bench_verify(c: &mut Criterion) {
    let store = IntegrityStore::new(payload(0));
    let stale = payload(1);

    c.bench_function("verify_matching_copy", |b| {
        b.iter(|| {
            if !store.verify(&payload(0)).is_match() {
                panic!("verify benchmark expected a match");
            }
        });
    });

    c.bench_function("verify_stale_copy", |b| {
        b.iter(|| {
            if let Verification::Match = store.verify(&stale) {
                panic!("verify benchmark expected a mismatch");
            }
        });
    });
}

criterion_group!(store_benches, bench_write, bench_verify);
criterion_main!(store_benches);
