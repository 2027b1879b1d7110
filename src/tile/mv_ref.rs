//! Reference-MV Engine: builds a ranked candidate stack from spatial and
//! temporal neighbors plus global-motion fallback, and a composite context
//! used by the mode-decision CDFs (SPEC_FULL.md §4.4).
//!
//! Grounded on the teacher's `tile/mv_prediction.rs` (`MvPredictorContext`,
//! `parsed_cus` neighbor tracking), expanded from its single-neighbor
//! lookup into the full weighted multi-candidate stack the spec calls for.

use crate::block::{Av1Block, MotionVector, RefFrame};

/// One entry of the ranked candidate stack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MvCandidate {
    pub this_mv: MotionVector,
    pub comp_mv: MotionVector,
    pub weight: u32,
}

/// One projectable neighbor sample for the warp least-squares fit: a
/// same-single-ref neighbor's MV plus its offset from the target block's
/// top-left corner (SPEC_FULL.md §4.5 "Warp MV derivation").
#[derive(Debug, Clone, Copy)]
pub struct WarpCandidate {
    pub dx: i32,
    pub dy: i32,
    pub mv: MotionVector,
}

const MAX_CANDIDATES: usize = 8;
const MAX_WARP_SAMPLES: usize = 8;

/// Lightweight per-block record retained only for MV prediction, mirroring
/// the teacher's `MvCuEntry` (avoids cloning the full `Av1Block`).
#[derive(Debug, Clone)]
struct MvEntry {
    x4: u32,
    y4: u32,
    w4: u32,
    h4: u32,
    ref_frame: [RefFrame; 2],
    mv: [MotionVector; 2],
}

impl MvEntry {
    fn from_block(b: &Av1Block) -> Self {
        Self {
            x4: b.x4,
            y4: b.y4,
            w4: b.width4(),
            h4: b.height4(),
            ref_frame: b.ref_frame,
            mv: b.mv,
        }
    }

    fn overlaps_row(&self, y4: u32) -> bool {
        self.y4 <= y4 && y4 < self.y4 + self.h4
    }

    fn overlaps_col(&self, x4: u32) -> bool {
        self.x4 <= x4 && x4 < self.x4 + self.w4
    }

    fn overlap_len_above(&self, x4: u32, w4: u32) -> u32 {
        let lo = self.x4.max(x4);
        let hi = (self.x4 + self.w4).min(x4 + w4);
        hi.saturating_sub(lo)
    }

    fn overlap_len_left(&self, y4: u32, h4: u32) -> u32 {
        let lo = self.y4.max(y4);
        let hi = (self.y4 + self.h4).min(y4 + h4);
        hi.saturating_sub(lo)
    }
}

/// Per-frame dense MV grid, one cell per 4x4 unit (SPEC_FULL.md §3,
/// "Motion-vector grid").
#[derive(Debug, Clone)]
pub struct MvGrid {
    cols4: u32,
    rows4: u32,
    ref_frame: Vec<[RefFrame; 2]>,
    mv: Vec<[MotionVector; 2]>,
}

impl MvGrid {
    pub fn new(cols4: u32, rows4: u32) -> Self {
        let n = (cols4 * rows4) as usize;
        Self {
            cols4,
            rows4,
            ref_frame: vec![[RefFrame::None, RefFrame::None]; n],
            mv: vec![[MotionVector::ZERO; 2]; n],
        }
    }

    fn idx(&self, x4: u32, y4: u32) -> usize {
        (y4 * self.cols4 + x4) as usize
    }

    /// `splat_oneref_mv`/`splat_tworef_mv`: fills the block's footprint
    /// with its ref pair and MVs (SPEC_FULL.md §4.5 step 11).
    pub fn splat(&mut self, block: &Av1Block) {
        for y in block.y4..(block.y4 + block.height4()).min(self.rows4) {
            for x in block.x4..(block.x4 + block.width4()).min(self.cols4) {
                let i = self.idx(x, y);
                self.ref_frame[i] = block.ref_frame;
                self.mv[i] = block.mv;
            }
        }
    }

    pub fn at(&self, x4: u32, y4: u32) -> Option<([RefFrame; 2], [MotionVector; 2])> {
        if x4 >= self.cols4 || y4 >= self.rows4 {
            return None;
        }
        let i = self.idx(x4, y4);
        Some((self.ref_frame[i], self.mv[i]))
    }
}

/// Global-motion model for one reference frame; `Identity` projects to a
/// zero MV everywhere.
#[derive(Debug, Clone, Copy)]
pub enum GlobalMotion {
    Identity,
    Translation { row: i32, col: i32 },
}

impl GlobalMotion {
    fn project(&self) -> MotionVector {
        match *self {
            GlobalMotion::Identity => MotionVector::ZERO,
            GlobalMotion::Translation { row, col } => MotionVector::new(row, col),
        }
    }
}

/// Tracks every decoded block of the current frame for spatial refmv scans,
/// plus the temporal collocated grid (if any) and per-ref global motion.
pub struct MvPredictorContext {
    parsed: Vec<MvEntry>,
    global_motion: [GlobalMotion; 8],
    temporal_grid: Option<MvGrid>,
    allow_high_precision: bool,
}

impl MvPredictorContext {
    pub fn new(allow_high_precision: bool) -> Self {
        Self {
            parsed: Vec::new(),
            global_motion: [GlobalMotion::Identity; 8],
            temporal_grid: None,
            allow_high_precision,
        }
    }

    pub fn set_global_motion(&mut self, ref_frame: RefFrame, model: GlobalMotion) {
        let idx = ref_frame as i8;
        if (0..8).contains(&idx) {
            self.global_motion[idx as usize] = model;
        }
    }

    pub fn set_temporal_grid(&mut self, grid: MvGrid) {
        self.temporal_grid = Some(grid);
    }

    pub fn record(&mut self, block: &Av1Block) {
        self.parsed.push(MvEntry::from_block(block));
    }

    /// Builds the ranked candidate stack plus composite context for a
    /// target ref pair at `(x4, y4)` spanning `(w4, h4)` 4x4 units
    /// (SPEC_FULL.md §4.4).
    pub fn build_candidates(
        &self,
        x4: u32,
        y4: u32,
        w4: u32,
        h4: u32,
        ref_frame: [RefFrame; 2],
    ) -> (Vec<MvCandidate>, u16) {
        let mut stack: Vec<MvCandidate> = Vec::new();

        // (a) scan the row immediately above and column immediately left
        // for matching-ref blocks, weighting by overlap length.
        if y4 > 0 {
            for entry in self.parsed.iter().filter(|e| e.overlaps_row(y4 - 1)) {
                self.push_candidate(&mut stack, entry, ref_frame, entry.overlap_len_above(x4, w4));
            }
        }
        if x4 > 0 {
            for entry in self.parsed.iter().filter(|e| e.overlaps_col(x4 - 1)) {
                self.push_candidate(&mut stack, entry, ref_frame, entry.overlap_len_left(y4, h4));
            }
        }

        // (b) optionally probe the temporal collocated grid.
        if let Some(grid) = &self.temporal_grid {
            if let Some((g_ref, g_mv)) = grid.at(x4, y4) {
                if g_ref[0] == ref_frame[0] {
                    self.push_raw(&mut stack, g_mv[0], MotionVector::ZERO, 2);
                }
            }
        }

        // (c) global-motion projection as a low-weight fallback entry.
        let gm_mv = self.global_motion_for(ref_frame[0]);
        self.push_raw(&mut stack, gm_mv, MotionVector::ZERO, 1);

        // Ties break by scan order (stable sort), then by weight.
        stack.sort_by(|a, b| b.weight.cmp(&a.weight));
        stack.dedup_by(|a, b| a.this_mv == b.this_mv && a.comp_mv == b.comp_mv);
        stack.truncate(MAX_CANDIDATES);

        if !self.allow_high_precision {
            for c in &mut stack {
                c.this_mv = Self::strip_hp(c.this_mv);
                c.comp_mv = Self::strip_hp(c.comp_mv);
            }
        }

        let ctx = self.composite_context(&stack);
        (stack, ctx)
    }

    /// Scans the row above and column left of `(x4, y4)` for projectable
    /// warp samples: single-ref neighbors sharing `ref_frame`, converted to
    /// an `(offset, mv)` pair relative to the target block's top-left
    /// corner. Mirrors `build_candidates`' neighbor scan, capped at
    /// `MAX_WARP_SAMPLES` (SPEC_FULL.md §4.5 "Warp MV derivation").
    pub fn warp_candidates(&self, x4: u32, y4: u32, w4: u32, h4: u32, ref_frame: RefFrame) -> Vec<WarpCandidate> {
        let mut samples = Vec::new();

        if y4 > 0 {
            for entry in self.parsed.iter().filter(|e| e.overlaps_row(y4 - 1)) {
                if entry.overlap_len_above(x4, w4) == 0 {
                    continue;
                }
                if entry.ref_frame[1] == RefFrame::None && entry.ref_frame[0] == ref_frame {
                    samples.push(WarpCandidate {
                        dx: entry.x4 as i32 - x4 as i32,
                        dy: -4,
                        mv: entry.mv[0],
                    });
                }
            }
        }
        if x4 > 0 {
            for entry in self.parsed.iter().filter(|e| e.overlaps_col(x4 - 1)) {
                if entry.overlap_len_left(y4, h4) == 0 {
                    continue;
                }
                if entry.ref_frame[1] == RefFrame::None && entry.ref_frame[0] == ref_frame {
                    samples.push(WarpCandidate {
                        dx: -4,
                        dy: entry.y4 as i32 - y4 as i32,
                        mv: entry.mv[0],
                    });
                }
            }
        }

        samples.truncate(MAX_WARP_SAMPLES);
        samples
    }

    fn push_candidate(&self, stack: &mut Vec<MvCandidate>, entry: &MvEntry, ref_frame: [RefFrame; 2], overlap: u32) {
        if overlap == 0 {
            return;
        }
        if entry.ref_frame[0] == ref_frame[0] {
            self.push_raw(stack, entry.mv[0], MotionVector::ZERO, overlap.max(1) * 4);
        } else if ref_frame[1] != RefFrame::None && entry.ref_frame[0] == ref_frame[1] {
            self.push_raw(stack, MotionVector::ZERO, entry.mv[0], overlap.max(1) * 2);
        }
    }

    fn push_raw(&self, stack: &mut Vec<MvCandidate>, this_mv: MotionVector, comp_mv: MotionVector, weight: u32) {
        stack.push(MvCandidate { this_mv, comp_mv, weight });
    }

    fn global_motion_for(&self, ref_frame: RefFrame) -> MotionVector {
        let idx = ref_frame as i8;
        if (0..8).contains(&idx) {
            self.global_motion[idx as usize].project()
        } else {
            MotionVector::ZERO
        }
    }

    /// Strips the HP (half-pel) bit when the frame signals integer/quarter
    /// precision (SPEC_FULL.md §4.4).
    fn strip_hp(mv: MotionVector) -> MotionVector {
        MotionVector::new(mv.row & !1, mv.col & !1)
    }

    /// Low 3 bits drive newmv-mode CDF, next bit globalmv-mode, next 4
    /// bits refmv-mode (SPEC_FULL.md §4.4).
    fn composite_context(&self, stack: &[MvCandidate]) -> u16 {
        let newmv_bits = (stack.len().min(7)) as u16 & 0x7;
        let globalmv_bit = (stack.is_empty() as u16) << 3;
        let refmv_bits = (stack.iter().filter(|c| c.weight > 4).count().min(15) as u16) << 4;
        newmv_bits | globalmv_bit | refmv_bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockSize, PartitionKind};

    fn block_with_mv(x4: u32, y4: u32, row: i32, col: i32) -> Av1Block {
        let mut b = Av1Block::new(x4, y4, BlockSize::B16x16, PartitionKind::None);
        b.is_intra = false;
        b.ref_frame = [RefFrame::Last, RefFrame::None];
        b.mv[0] = MotionVector::new(row, col);
        b
    }

    #[test]
    fn test_no_neighbors_yields_global_motion_only() {
        let ctx = MvPredictorContext::new(true);
        let (stack, _) = ctx.build_candidates(8, 8, 4, 4, [RefFrame::Last, RefFrame::None]);
        assert_eq!(stack.len(), 1);
        assert_eq!(stack[0].this_mv, MotionVector::ZERO);
    }

    #[test]
    fn test_left_neighbor_contributes_candidate() {
        let mut ctx = MvPredictorContext::new(true);
        ctx.record(&block_with_mv(0, 4, 10, -6));
        let (stack, _) = ctx.build_candidates(4, 4, 4, 4, [RefFrame::Last, RefFrame::None]);
        assert!(stack.iter().any(|c| c.this_mv == MotionVector::new(10, -6)));
    }

    #[test]
    fn test_hp_bit_stripped_when_disallowed() {
        let mut ctx = MvPredictorContext::new(false);
        ctx.record(&block_with_mv(0, 4, 11, 7));
        let (stack, _) = ctx.build_candidates(4, 4, 4, 4, [RefFrame::Last, RefFrame::None]);
        assert!(stack.iter().all(|c| c.this_mv.row % 2 == 0 && c.this_mv.col % 2 == 0));
    }

    #[test]
    fn test_warp_candidates_finds_matching_single_ref_neighbor() {
        let mut ctx = MvPredictorContext::new(true);
        ctx.record(&block_with_mv(0, 4, 10, -6));
        let samples = ctx.warp_candidates(4, 4, 4, 4, RefFrame::Last);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].mv, MotionVector::new(10, -6));
    }

    #[test]
    fn test_warp_candidates_excludes_compound_neighbor() {
        let mut ctx = MvPredictorContext::new(true);
        let mut b = block_with_mv(0, 4, 10, -6);
        b.ref_frame[1] = RefFrame::BwdRef;
        ctx.record(&b);
        let samples = ctx.warp_candidates(4, 4, 4, 4, RefFrame::Last);
        assert!(samples.is_empty());
    }

    #[test]
    fn test_mv_grid_splat_covers_footprint() {
        let mut grid = MvGrid::new(32, 32);
        let block = block_with_mv(4, 4, 3, -2);
        grid.splat(&block);
        let (rf, mv) = grid.at(4, 4).unwrap();
        assert_eq!(rf[0], RefFrame::Last);
        assert_eq!(mv[0], MotionVector::new(3, -2));
        let (_, mv_edge) = grid.at(7, 7).unwrap();
        assert_eq!(mv_edge[0], MotionVector::new(3, -2));
    }
}
