use carport_core::codec::ProtocolCodec;
use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

// A second of push frames at 250 Hz with a reply every 50 frames.
fn synth_stream(frames: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(frames * 9 + frames / 50 * 7);
    for i in 0..frames {
        let dist = 800u16.saturating_sub((i % 600) as u16);
        let mut f = vec![0x59, 0x59];
        f.extend_from_slice(&dist.to_le_bytes());
        f.extend_from_slice(&1_200u16.to_le_bytes());
        f.extend_from_slice(&2_248u16.to_le_bytes());
        f.push(checksum(&f));
        out.extend(f);
        if i % 50 == 49 {
            let mut r = vec![0x5A, 0x07, 0x01, 3, 0, 4];
            r.push(checksum(&r));
            out.extend(r);
        }
    }
    out
}

pub fn bench_feed(c: &mut Criterion) {
    let mut g = c.benchmark_group("codec_feed");
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE")
        && let Ok(n) = ss.parse::<usize>()
    {
        g.sample_size(n.max(10));
    }
    let stream = synth_stream(250);
    g.throughput(Throughput::Bytes(stream.len() as u64));

    g.bench_function("single_feed", |b| {
        b.iter_batched(
            ProtocolCodec::new,
            |mut codec| black_box(codec.feed(black_box(&stream))),
            BatchSize::SmallInput,
        )
    });

    // Serial reads rarely align with frames; 7-byte chunks split most of them.
    g.bench_function("chunked_feed_7", |b| {
        b.iter_batched(
            ProtocolCodec::new,
            |mut codec| {
                let mut n = 0usize;
                for chunk in stream.chunks(7) {
                    n += codec.feed(black_box(chunk)).len();
                }
                black_box(n)
            },
            BatchSize::SmallInput,
        )
    });
    g.finish();
}

criterion_group!(benches, bench_feed);
criterion_main!(benches);
