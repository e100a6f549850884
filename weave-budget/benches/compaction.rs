use criterion::{black_box, criterion_group, criterion_main, Criterion};
use weave_budget::{compact, CompactOpts, CompactionStrategy};
use weave_types::{Message, TimelineEntry};

fn make_timeline(n: usize) -> Vec<TimelineEntry> {
    (0..n)
        .map(|i| {
            let mut e = TimelineEntry::new(Message::user(format!(
                "Message {i}: a moderately sized message body for compaction benchmarks."
            )));
            e.tokens = Some(20);
            e
        })
        .collect()
}

fn bench_truncate(c: &mut Criterion) {
    let mut group = c.benchmark_group("compact_truncate");
    for n in [100, 1000, 10000] {
        let entries = make_timeline(n);
        let opts = CompactOpts {
            max_tokens: (n as u32 * 20) / 4,
            strategy: CompactionStrategy::Truncate,
            ..Default::default()
        };
        group.bench_function(format!("{n}_entries"), |b| {
            b.iter(|| compact(black_box(entries.clone()), black_box(&opts)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_truncate);
criterion_main!(benches);
