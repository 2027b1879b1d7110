//! Tile-level state: MSAC seeding, per-tile CDF snapshot, neighbor strips,
//! and running quant/LF-delta state (SPEC_FULL.md §3 "Tile", §4.7 step 2).
//!
//! Grounded on the teacher's `tile/mod.rs` (`Tile`, `SuperblockSize`); the
//! teacher's `tile_group.rs` was referenced by its module re-exports but
//! absent from the retrieved pack, so `parse_tile_group` below is built
//! fresh from the re-export signature and SPEC_FULL.md §4.7 step 2.

pub mod block_parser;
pub mod mv_ref;
pub mod partition;

pub use block_parser::{parse_block, replay_block, DecodePass, FrameParseFlags};
pub use mv_ref::{MvGrid, MvPredictorContext, WarpCandidate};
pub use partition::parse_partition_tree;

use std::sync::Arc;

use crate::context::TileContext;
use crate::error::{Av1Error, Result};
use crate::leb128::decode_uleb128;
use crate::picture::Picture;
use crate::symbol::{CdfContext, SymbolDecoder};

/// Superblock size signalled by the sequence header (`use_128x128_superblock`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuperblockSize {
    Sb64,
    Sb128,
}

impl SuperblockSize {
    pub fn pixels(self) -> u32 {
        match self {
            SuperblockSize::Sb64 => 64,
            SuperblockSize::Sb128 => 128,
        }
    }
}

/// One tile's coded byte range plus its grid position, as produced by
/// slicing a tile-group OBU (SPEC_FULL.md §4.7 step 2).
#[derive(Debug, Clone, Copy)]
pub struct TileInfo {
    pub tile_col: u32,
    pub tile_row: u32,
    pub mi_col_start: u32,
    pub mi_col_end: u32,
    pub mi_row_start: u32,
    pub mi_row_end: u32,
}

/// Per-tile running state threaded through the partition descender and
/// block parser: neighbor strips, MV prediction context, and the
/// quant/loop-filter delta state SPEC_FULL.md §4.5 describes as
/// "tile-local running values".
pub struct TileSlot {
    pub info: TileInfo,
    pub sb_size: SuperblockSize,
    pub ctx: TileContext,
    pub mv_ctx: MvPredictorContext,
    pub mv_grid: MvGrid,
    pub last_qidx: i16,
    pub last_delta_lf: [i8; 4],
    pub cdef_idx: Vec<i8>,
    pub sticky_error: bool,
    /// Output picture this tile writes reconstructed samples into, handed
    /// to `ReconOps` implementations through the tile slot rather than the
    /// trait signature (SPEC_FULL.md §4.7 step 4 "recon writes into the
    /// frame's allocated picture").
    pub picture: Option<Arc<Picture>>,
}

impl TileSlot {
    pub fn new(info: TileInfo, sb_size: SuperblockSize, frame_cols4: u32, frame_rows4: u32, base_qidx: i16) -> Self {
        let tile_cols4 = info.mi_col_end - info.mi_col_start;
        let tile_rows4 = info.mi_row_end - info.mi_row_start;
        let cdef_units = ((tile_cols4 / 16).max(1) * (tile_rows4 / 16).max(1)) as usize;
        Self {
            info,
            sb_size,
            ctx: TileContext::new(tile_cols4 as usize, tile_rows4 as usize),
            mv_ctx: MvPredictorContext::new(true),
            mv_grid: MvGrid::new(frame_cols4, frame_rows4),
            last_qidx: base_qidx,
            last_delta_lf: [0; 4],
            cdef_idx: vec![-1; cdef_units],
            sticky_error: false,
            picture: None,
        }
    }

    #[cfg(test)]
    pub fn new_for_test() -> Self {
        let info = TileInfo {
            tile_col: 0,
            tile_row: 0,
            mi_col_start: 0,
            mi_col_end: 32,
            mi_row_start: 0,
            mi_row_end: 32,
        };
        Self::new(info, SuperblockSize::Sb64, 32, 32, 32)
    }

    /// Checked once per superblock row / tile boundary per SPEC_FULL.md §7:
    /// MSAC's sticky-error flag rather than an eagerly-propagated `Result`.
    pub fn check_sticky_error(&self) -> Result<()> {
        if self.sticky_error {
            Err(Av1Error::invalid_bitstream(0, "MSAC sticky error raised during tile decode"))
        } else {
            Ok(())
        }
    }
}

/// Seeds MSAC for one tile slice, copying the frame's input CDF
/// (SPEC_FULL.md §4.7 step 2, "setup_tile").
pub fn setup_tile<'a>(tile_data: &'a [u8], input_cdf: CdfContext) -> Result<SymbolDecoder<'a>> {
    SymbolDecoder::new(tile_data, input_cdf)
}

/// Slices a tile-group OBU payload into per-tile coded byte ranges. Every
/// tile except the last is prefixed by its length; the last tile's length
/// is implicit (remainder of the payload), matching AV1 spec Section
/// 5.11.1's `tile_size_bytes`-prefixed form.
pub fn slice_tile_group<'a>(payload: &'a [u8], tile_count: usize) -> Result<Vec<&'a [u8]>> {
    let mut slices = Vec::with_capacity(tile_count);
    let mut offset = 0usize;

    for i in 0..tile_count {
        if i + 1 == tile_count {
            slices.push(&payload[offset..]);
            break;
        }
        let (size_minus_1, consumed) = decode_uleb128(&payload[offset..])?;
        offset += consumed;
        let size = size_minus_1 as usize + 1;
        if offset + size > payload.len() {
            return Err(Av1Error::invalid_bitstream(
                offset as u64,
                format!("tile {i} declares {size} bytes, only {} remain", payload.len() - offset),
            ));
        }
        slices.push(&payload[offset..offset + size]);
        offset += size;
    }

    Ok(slices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_tile_group_single_tile() {
        let payload = [0x11, 0x22, 0x33, 0x44];
        let slices = slice_tile_group(&payload, 1).unwrap();
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0], &payload[..]);
    }

    #[test]
    fn test_slice_tile_group_two_tiles() {
        // tile 0: size-1 = 2 (leb128 0x02), 3 bytes payload; tile 1: remainder.
        let payload = [0x02, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE];
        let slices = slice_tile_group(&payload, 2).unwrap();
        assert_eq!(slices[0], &[0xAA, 0xBB, 0xCC]);
        assert_eq!(slices[1], &[0xDD, 0xEE]);
    }

    #[test]
    fn test_slice_tile_group_truncated_errors() {
        let payload = [0x7F, 0x00];
        assert!(slice_tile_group(&payload, 2).is_err());
    }

    #[test]
    fn test_tile_slot_sticky_error() {
        let mut slot = TileSlot::new_for_test();
        assert!(slot.check_sticky_error().is_ok());
        slot.sticky_error = true;
        assert!(slot.check_sticky_error().is_err());
    }
}
