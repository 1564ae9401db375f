use std::{hint::black_box, io::Cursor};

use criterion::{Criterion, criterion_group, criterion_main};
use mp4::test_support::AudioMovie;
use mp4_fix::{Mp4Rewriter, RewriteOptions, SbrSignallingTransform};

fn rewrite(source: &[u8]) -> Vec<u8> {
    let (_, writer) = Mp4Rewriter::new(
        Cursor::new(source),
        Cursor::new(Vec::with_capacity(source.len() + 16)),
        RewriteOptions::default(),
    )
    .unwrap()
    .with_transform(SbrSignallingTransform::new())
    .rewrite()
    .unwrap();
    writer.into_inner()
}

fn benchmark_rewrite(c: &mut Criterion) {
    let chunk_counts = [16usize, 1024];
    let mdat_sizes = [64 * 1024usize, 4 * 1024 * 1024];

    for chunk_count in chunk_counts {
        for mdat_size in mdat_sizes {
            let chunk_len = (mdat_size / chunk_count) as u64;
            let movie = AudioMovie {
                chunk_positions: (0..chunk_count as u64).map(|i| i * chunk_len).collect(),
                mdat_payload: vec![0xA5; mdat_size],
                ..Default::default()
            }
            .build();

            c.bench_function(
                &format!("rewrite/chunks_{chunk_count}/mdat_{mdat_size}"),
                |b| b.iter(|| rewrite(black_box(&movie.bytes))),
            );
        }
    }
}

criterion_group!(benches, benchmark_rewrite);
criterion_main!(benches);
