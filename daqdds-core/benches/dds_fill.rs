use criterion::{black_box, criterion_group, criterion_main, Criterion};
use daqdds_core::block::SampleBlock;
use daqdds_core::dds::Dds;
use daqdds_core::wavetable::Wave;

fn bench_fill(c: &mut Criterion) {
    // Fractional skip factor (0.73) so the accumulator carries every sample.
    let mut dds = Dds::new(Wave::Sine.table(1000, 1.0), 73.0, 100_000).unwrap();
    let mut out = vec![0.0; 1024];

    c.bench_function("dds_fill_1024", |b| {
        b.iter(|| {
            dds.fill(black_box(&mut out));
            black_box(&out);
        })
    });
}

fn bench_block_fan_out(c: &mut Criterion) {
    // One loop iteration of the DDS output path: 10 samples fanned out to 8 channels.
    let mut dds = Dds::new(Wave::Tri.table(1000, 1.0), 100.0, 10_000).unwrap();

    c.bench_function("dds_block_10x8", |b| {
        b.iter(|| {
            let mono = dds.next(black_box(10));
            black_box(SampleBlock::fan_out(&mono, 8));
        })
    });
}

criterion_group!(benches, bench_fill, bench_block_fan_out);
criterion_main!(benches);
