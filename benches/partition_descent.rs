//! Performance benchmarks for the partition descender and block parser.
//!
//! Run with:
//! ```bash
//! cargo bench
//! ```

use av1_core::block::BlockSize;
use av1_core::recon::NullReconOps;
use av1_core::symbol::{CdfContext, SymbolDecoder};
use av1_core::tile::{parse_partition_tree, FrameParseFlags, TileInfo, TileSlot, SuperblockSize};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn make_superblock_bytes(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i * 37 + 11) as u8).collect()
}

fn bench_partition_descent_64x64(c: &mut Criterion) {
    let data = make_superblock_bytes(4096);

    c.bench_function("parse_partition_tree_64x64", |b| {
        b.iter(|| {
            let mut decoder = SymbolDecoder::new(black_box(&data), CdfContext::new()).unwrap();
            let mut slot = TileSlot::new_for_test();
            let recon = NullReconOps;
            let node = parse_partition_tree(
                &mut decoder,
                &mut slot,
                &recon,
                0,
                0,
                BlockSize::B64x64,
                32,
                32,
                FrameParseFlags::default(),
            );
            black_box(node).ok();
        });
    });
}

fn bench_partition_descent_full_tile(c: &mut Criterion) {
    let data = make_superblock_bytes(65536);

    let mut group = c.benchmark_group("full_tile");

    group.bench_function("16x16_superblocks", |b| {
        b.iter(|| {
            let mut decoder = SymbolDecoder::new(black_box(&data), CdfContext::new()).unwrap();
            let info = TileInfo {
                tile_col: 0,
                tile_row: 0,
                mi_col_start: 0,
                mi_col_end: 256,
                mi_row_start: 0,
                mi_row_end: 256,
            };
            let mut slot = TileSlot::new(info, SuperblockSize::Sb64, 256, 256, 32);
            let recon = NullReconOps;
            let flags = FrameParseFlags::default();

            let mut sby = 0u32;
            while sby < 256 {
                let mut sbx = 0u32;
                while sbx < 256 {
                    let _ = parse_partition_tree(
                        &mut decoder,
                        &mut slot,
                        &recon,
                        sbx,
                        sby,
                        BlockSize::B64x64,
                        256,
                        256,
                        flags,
                    );
                    sbx += 16;
                }
                sby += 16;
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_partition_descent_64x64, bench_partition_descent_full_tile);
criterion_main!(benches);
