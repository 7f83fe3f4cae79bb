use bridge::{FrameJob, JobQueue, MemoryJobQueue};
use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::time::Duration;

/// Benchmark an enqueue/dequeue cycle for typical encoded frame sizes
fn benchmark_enqueue_dequeue(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue_dequeue");

    let sizes = [
        (30 * 1024, "VGA jpeg"),
        (120 * 1024, "HD jpeg"),
        (400 * 1024, "Full HD jpeg"),
    ];

    let queue = MemoryJobQueue::new(1024);

    for (size, label) in sizes {
        let payload = Bytes::from(vec![128u8; size]);

        group.bench_with_input(BenchmarkId::new("cycle", label), &payload, |b, payload| {
            let mut sequence = 0u64;
            b.iter(|| {
                sequence += 1;
                queue
                    .enqueue(FrameJob::new("bench", sequence, payload.clone()))
                    .unwrap();
                black_box(queue.dequeue(Duration::ZERO));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_enqueue_dequeue);
criterion_main!(benches);
