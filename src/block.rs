//! Block-level types shared by the partition descender and block parser.

use serde::{Deserialize, Serialize};

/// Square or rectangular block size, AV1 spec Section 5.11.4's `BLOCK_*` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockSize {
    B4x4,
    B4x8,
    B8x4,
    B8x8,
    B8x16,
    B16x8,
    B16x16,
    B16x32,
    B32x16,
    B32x32,
    B32x64,
    B64x32,
    B64x64,
    B64x128,
    B128x64,
    B128x128,
    B4x16,
    B16x4,
    B8x32,
    B32x8,
    B16x64,
    B64x16,
}

impl BlockSize {
    pub fn width(&self) -> u32 {
        use BlockSize::*;
        match self {
            B4x4 | B4x8 | B4x16 => 4,
            B8x4 | B8x8 | B8x16 | B8x32 => 8,
            B16x8 | B16x16 | B16x32 | B16x4 | B16x64 => 16,
            B32x16 | B32x32 | B32x64 | B32x8 => 32,
            B64x32 | B64x64 | B64x128 | B64x16 => 64,
            B128x64 | B128x128 => 128,
        }
    }

    pub fn height(&self) -> u32 {
        use BlockSize::*;
        match self {
            B4x4 | B8x4 | B16x4 => 4,
            B4x8 | B8x8 | B16x8 | B32x8 => 8,
            B8x16 | B16x16 | B32x16 | B4x16 | B64x16 => 16,
            B16x32 | B32x32 | B64x32 | B8x32 => 32,
            B32x64 | B64x64 | B128x64 | B16x64 => 64,
            B64x128 | B128x128 => 128,
        }
    }

    /// `ilog2` of the larger dimension, clamped to the CDF bucket range
    /// `[3,7]` used by `partition[bl]` lookups (8x8 .. 128x128).
    pub fn log2_bucket(&self) -> u8 {
        let s = self.width().max(self.height());
        (s.ilog2() as u8).clamp(3, 7)
    }

    pub fn is_square(&self) -> bool {
        self.width() == self.height()
    }
}

/// 10-way partition kind decoded at each interior node of the quad tree
/// (AV1 spec Section 5.11.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PartitionKind {
    None = 0,
    Horz = 1,
    Vert = 2,
    Split = 3,
    HorzA = 4,
    HorzB = 5,
    VertA = 6,
    VertB = 7,
    Horz4 = 8,
    Vert4 = 9,
}

impl PartitionKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        use PartitionKind::*;
        Some(match v {
            0 => None,
            1 => Horz,
            2 => Vert,
            3 => Split,
            4 => HorzA,
            5 => HorzB,
            6 => VertA,
            7 => VertB,
            8 => Horz4,
            9 => Vert4,
            _ => return Option::None,
        })
    }

    /// True when this partition slices on the vertical axis (including the
    /// asymmetric `VertA`/`VertB` T-splits), which the 4:2:2 chroma layout
    /// forbids below 8x8 (SPEC_FULL.md §4.6 step 3).
    pub fn is_vertical_split(&self) -> bool {
        matches!(self, PartitionKind::Vert | PartitionKind::VertA | PartitionKind::VertB | PartitionKind::Vert4)
    }

    pub fn child_count(&self) -> usize {
        use PartitionKind::*;
        match self {
            None => 1,
            Horz | Vert => 2,
            Split => 4,
            HorzA | HorzB | VertA | VertB => 3,
            Horz4 | Vert4 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionVector {
    pub row: i32,
    pub col: i32,
}

impl MotionVector {
    pub const ZERO: MotionVector = MotionVector { row: 0, col: 0 };

    pub fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    pub fn add(self, other: MotionVector) -> Self {
        Self::new(self.row + other.row, self.col + other.col)
    }
}

/// Reference frame slot, `-1` (intra) through 6 (ALTREF), per AV1 spec
/// Section 6.10.24's `ref_frame` semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i8)]
pub enum RefFrame {
    None = -1,
    Intra = 0,
    Last = 1,
    Last2 = 2,
    Last3 = 3,
    Golden = 4,
    BwdRef = 5,
    AltRef2 = 6,
    AltRef = 7,
}

impl RefFrame {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => RefFrame::Intra,
            1 => RefFrame::Last,
            2 => RefFrame::Last2,
            3 => RefFrame::Last3,
            4 => RefFrame::Golden,
            5 => RefFrame::BwdRef,
            6 => RefFrame::AltRef2,
            7 => RefFrame::AltRef,
            _ => RefFrame::None,
        }
    }

    pub fn is_inter(&self) -> bool {
        !matches!(self, RefFrame::None | RefFrame::Intra)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxSize {
    Tx4x4,
    Tx8x8,
    Tx16x16,
    Tx32x32,
    Tx64x64,
    Tx4x8,
    Tx8x4,
    Tx8x16,
    Tx16x8,
    Tx16x32,
    Tx32x16,
    Tx32x64,
    Tx64x32,
    Tx4x16,
    Tx16x4,
    Tx8x32,
    Tx32x8,
    Tx16x64,
    Tx64x16,
}

impl TxSize {
    /// Largest transform size that fits a block's canonical size, before
    /// any variable-tx subdivision (SPEC_FULL.md §4.5 variable-tx tree).
    pub fn max_for_block(bs: BlockSize) -> Self {
        match (bs.width().min(64), bs.height().min(64)) {
            (4, 4) => TxSize::Tx4x4,
            (4, 8) => TxSize::Tx4x8,
            (8, 4) => TxSize::Tx8x4,
            (8, 8) => TxSize::Tx8x8,
            (8, 16) => TxSize::Tx8x16,
            (16, 8) => TxSize::Tx16x8,
            (16, 16) => TxSize::Tx16x16,
            (16, 32) => TxSize::Tx16x32,
            (32, 16) => TxSize::Tx32x16,
            (32, 32) => TxSize::Tx32x32,
            (32, 64) => TxSize::Tx32x64,
            (64, 32) => TxSize::Tx64x32,
            (64, 64) => TxSize::Tx64x64,
            (4, 16) => TxSize::Tx4x16,
            (16, 4) => TxSize::Tx16x4,
            (8, 32) => TxSize::Tx8x32,
            (32, 8) => TxSize::Tx32x8,
            (16, 64) => TxSize::Tx16x64,
            (64, 16) => TxSize::Tx64x16,
            _ => TxSize::Tx4x4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionMode {
    DcPred,
    VPred,
    HPred,
    D45Pred,
    D135Pred,
    D113Pred,
    D157Pred,
    D203Pred,
    D67Pred,
    SmoothPred,
    SmoothVPred,
    SmoothHPred,
    PaethPred,
    NearestMv,
    NearMv,
    GlobalMv,
    NewMv,
    NearestNearestMv,
    NearNearMv,
    NearestNewMv,
    NewNearestMv,
    NearNewMv,
    NewNearMv,
    GlobalGlobalMv,
    NewNewMv,
}

impl PredictionMode {
    pub fn is_intra(&self) -> bool {
        (*self as u8) <= (PredictionMode::PaethPred as u8)
    }

    pub fn is_inter(&self) -> bool {
        !self.is_intra()
    }

    pub fn is_compound(&self) -> bool {
        (*self as u8) >= (PredictionMode::NearestNearestMv as u8)
    }

    pub fn from_intra_symbol(sym: u8) -> Self {
        const TABLE: [PredictionMode; 13] = [
            PredictionMode::DcPred,
            PredictionMode::VPred,
            PredictionMode::HPred,
            PredictionMode::D45Pred,
            PredictionMode::D135Pred,
            PredictionMode::D113Pred,
            PredictionMode::D157Pred,
            PredictionMode::D203Pred,
            PredictionMode::D67Pred,
            PredictionMode::SmoothPred,
            PredictionMode::SmoothVPred,
            PredictionMode::SmoothHPred,
            PredictionMode::PaethPred,
        ];
        TABLE[(sym as usize).min(12)]
    }

    pub fn from_inter_symbol(sym: u8) -> Self {
        const TABLE: [PredictionMode; 4] = [
            PredictionMode::NearestMv,
            PredictionMode::NearMv,
            PredictionMode::GlobalMv,
            PredictionMode::NewMv,
        ];
        TABLE[(sym as usize).min(3)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompoundType {
    Average,
    Weighted,
    SegWedge,
    Wedge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionMode {
    Translation,
    Obmc,
    Warp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterIntraType {
    None,
    Dc,
    V,
    H,
    Smooth,
}

/// Per-4x4-aligned leaf block, the unit the block parser emits to
/// `ReconOps` and writes back into the neighbor strips and MV grid
/// (SPEC_FULL.md §3, "Block (`Av1Block`)").
#[derive(Debug, Clone)]
pub struct Av1Block {
    pub x4: u32,
    pub y4: u32,
    pub bsize: BlockSize,
    pub partition: PartitionKind,
    pub is_intra: bool,
    pub segment_id: u8,
    pub skip: bool,
    pub skip_mode: bool,
    pub y_mode: PredictionMode,
    pub y_angle: i8,
    pub uv_mode: PredictionMode,
    pub uv_angle: i8,
    pub cfl_alpha_u: i8,
    pub cfl_alpha_v: i8,
    pub palette_size: [u8; 2],
    pub palette_colors: [Vec<u16>; 2],
    pub tx_size_y: TxSize,
    pub tx_size_uv: TxSize,
    pub tx_split_mask: u32,
    pub ref_frame: [RefFrame; 2],
    pub drl_index: u8,
    pub mv: [MotionVector; 2],
    pub compound_type: Option<CompoundType>,
    pub interintra: InterIntraType,
    pub wedge_index: u8,
    pub wedge_sign: bool,
    pub motion_mode: MotionMode,
    pub interp_filter: [u8; 2],
}

impl Av1Block {
    /// A default leaf used before any symbols are read, then mutated field
    /// by field as the canonical order (SPEC_FULL.md §4.5) is parsed.
    pub fn new(x4: u32, y4: u32, bsize: BlockSize, partition: PartitionKind) -> Self {
        Self {
            x4,
            y4,
            bsize,
            partition,
            is_intra: true,
            segment_id: 0,
            skip: false,
            skip_mode: false,
            y_mode: PredictionMode::DcPred,
            y_angle: 0,
            uv_mode: PredictionMode::DcPred,
            uv_angle: 0,
            cfl_alpha_u: 0,
            cfl_alpha_v: 0,
            palette_size: [0, 0],
            palette_colors: [Vec::new(), Vec::new()],
            tx_size_y: TxSize::max_for_block(bsize),
            tx_size_uv: TxSize::max_for_block(bsize),
            tx_split_mask: 0,
            ref_frame: [RefFrame::Intra, RefFrame::None],
            drl_index: 0,
            mv: [MotionVector::ZERO; 2],
            compound_type: None,
            interintra: InterIntraType::None,
            wedge_index: 0,
            wedge_sign: false,
            motion_mode: MotionMode::Translation,
            interp_filter: [0, 0],
        }
    }

    pub fn width4(&self) -> u32 {
        self.bsize.width() / 4
    }

    pub fn height4(&self) -> u32 {
        self.bsize.height() / 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size_dims() {
        assert_eq!(BlockSize::B16x32.width(), 16);
        assert_eq!(BlockSize::B16x32.height(), 32);
        assert_eq!(BlockSize::B128x128.log2_bucket(), 7);
        assert_eq!(BlockSize::B8x8.log2_bucket(), 3);
    }

    #[test]
    fn test_partition_kind_vertical_rejection() {
        assert!(PartitionKind::Vert.is_vertical_split());
        assert!(PartitionKind::Vert4.is_vertical_split());
        assert!(!PartitionKind::Horz.is_vertical_split());
    }

    #[test]
    fn test_prediction_mode_classification() {
        assert!(PredictionMode::DcPred.is_intra());
        assert!(PredictionMode::NewMv.is_inter());
        assert!(!PredictionMode::NewMv.is_compound());
        assert!(PredictionMode::NewNewMv.is_compound());
    }

    #[test]
    fn test_av1_block_defaults() {
        let b = Av1Block::new(0, 0, BlockSize::B16x16, PartitionKind::None);
        assert_eq!(b.width4(), 4);
        assert_eq!(b.height4(), 4);
        assert!(b.is_intra);
    }
}
