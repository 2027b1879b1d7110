//! Partition Descender: recursive quad-tree traversal over `bl ∈
//! {128,64,32,16,8}`, dispatching to the block parser at leaves
//! (SPEC_FULL.md §4.6).
//!
//! Grounded on the teacher's `tile/partition.rs` (`PartitionNode`,
//! `parse_partition_recursive`, `child_position`) and `tile/superblock.rs`
//! (which duplicated the same recursion locally); the two are unified
//! here into one descender that covers all 10 partition kinds instead of
//! falling through to `vec![*self]` placeholders for HorzA/HorzB/VertA/
//! VertB/Horz4/Vert4.

use crate::block::{Av1Block, BlockSize, PartitionKind};
use crate::error::{Av1Error, Result};
use crate::recon::ReconOps;
use crate::symbol::SymbolDecoder;
use crate::tile::block_parser::{parse_block_with_flags, FrameParseFlags};
use crate::tile::TileSlot;

/// One node of the decoded partition tree, retained for the pass-1
/// recorded array and for test inspection.
#[derive(Debug, Clone)]
pub struct PartitionNode {
    pub x4: u32,
    pub y4: u32,
    pub bsize: BlockSize,
    pub partition: PartitionKind,
    pub children: Vec<PartitionNode>,
}

impl PartitionNode {
    pub fn leaf(x4: u32, y4: u32, bsize: BlockSize) -> Self {
        Self { x4, y4, bsize, partition: PartitionKind::None, children: Vec::new() }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

fn split_size(bsize: BlockSize, partition: PartitionKind) -> Vec<BlockSize> {
    use BlockSize::*;
    use PartitionKind::*;
    match (partition, bsize) {
        (None, _) => vec![bsize],
        (Horz, B8x8) => vec![B8x4, B8x4],
        (Horz, B16x16) => vec![B16x8, B16x8],
        (Horz, B32x32) => vec![B32x16, B32x16],
        (Horz, B64x64) => vec![B64x32, B64x32],
        (Horz, B128x128) => vec![B128x64, B128x64],
        (Vert, B8x8) => vec![B4x8, B4x8],
        (Vert, B16x16) => vec![B8x16, B8x16],
        (Vert, B32x32) => vec![B16x32, B16x32],
        (Vert, B64x64) => vec![B32x64, B32x64],
        (Vert, B128x128) => vec![B64x128, B64x128],
        (Split, B8x8) => vec![B4x4; 4],
        (Split, B16x16) => vec![B8x8; 4],
        (Split, B32x32) => vec![B16x16; 4],
        (Split, B64x64) => vec![B32x32; 4],
        (Split, B128x128) => vec![B64x64; 4],
        (HorzA, B16x16) => vec![B8x8, B8x8, B16x8],
        (HorzA, B32x32) => vec![B16x16, B16x16, B32x16],
        (HorzA, B64x64) => vec![B32x32, B32x32, B64x32],
        (HorzA, B128x128) => vec![B64x64, B64x64, B128x64],
        (HorzB, B16x16) => vec![B16x8, B8x8, B8x8],
        (HorzB, B32x32) => vec![B32x16, B16x16, B16x16],
        (HorzB, B64x64) => vec![B64x32, B32x32, B32x32],
        (HorzB, B128x128) => vec![B128x64, B64x64, B64x64],
        (VertA, B16x16) => vec![B8x8, B8x8, B8x16],
        (VertA, B32x32) => vec![B16x16, B16x16, B16x32],
        (VertA, B64x64) => vec![B32x32, B32x32, B32x64],
        (VertA, B128x128) => vec![B64x64, B64x64, B64x128],
        (VertB, B16x16) => vec![B8x16, B8x8, B8x8],
        (VertB, B32x32) => vec![B16x32, B16x16, B16x16],
        (VertB, B64x64) => vec![B32x64, B32x32, B32x32],
        (VertB, B128x128) => vec![B64x128, B64x64, B64x64],
        (Horz4, B16x16) => vec![B16x4; 4],
        (Horz4, B32x32) => vec![B32x8; 4],
        (Horz4, B64x64) => vec![B64x16; 4],
        (Vert4, B16x16) => vec![B4x16; 4],
        (Vert4, B32x32) => vec![B8x32; 4],
        (Vert4, B64x64) => vec![B16x64; 4],
        _ => vec![bsize],
    }
}

fn child_position4(parent_x4: u32, parent_y4: u32, idx: usize, partition: PartitionKind, parent: BlockSize, children: &[BlockSize]) -> (u32, u32) {
    let pw4 = parent.width() / 4;
    let ph4 = parent.height() / 4;
    use PartitionKind::*;
    match partition {
        None => (parent_x4, parent_y4),
        Horz => if idx == 0 { (parent_x4, parent_y4) } else { (parent_x4, parent_y4 + ph4 / 2) },
        Vert => if idx == 0 { (parent_x4, parent_y4) } else { (parent_x4 + pw4 / 2, parent_y4) },
        Split => match idx {
            0 => (parent_x4, parent_y4),
            1 => (parent_x4 + pw4 / 2, parent_y4),
            2 => (parent_x4, parent_y4 + ph4 / 2),
            _ => (parent_x4 + pw4 / 2, parent_y4 + ph4 / 2),
        },
        HorzA => match idx {
            0 => (parent_x4, parent_y4),
            1 => (parent_x4 + pw4 / 2, parent_y4),
            _ => (parent_x4, parent_y4 + children[0].height() / 4),
        },
        HorzB => match idx {
            0 => (parent_x4, parent_y4),
            1 => (parent_x4, parent_y4 + children[0].height() / 4),
            _ => (parent_x4 + pw4 / 2, parent_y4 + children[0].height() / 4),
        },
        VertA => match idx {
            0 => (parent_x4, parent_y4),
            1 => (parent_x4, parent_y4 + parent.height() / 4 / 2),
            _ => (parent_x4 + children[0].width() / 4, parent_y4),
        },
        VertB => match idx {
            0 => (parent_x4, parent_y4),
            1 => (parent_x4 + children[0].width() / 4, parent_y4),
            _ => (parent_x4 + children[0].width() / 4, parent_y4 + parent.height() / 4 / 2),
        },
        Horz4 => (parent_x4, parent_y4 + (idx as u32) * (children[0].height() / 4)),
        Vert4 => (parent_x4 + (idx as u32) * (children[0].width() / 4), parent_y4),
    }
}

/// Gathers the marginalized split-vs-not probability when only one half of
/// the node fits in the frame (SPEC_FULL.md §4.6 step 2): collapses the
/// `partition[bl][ctx]` CDF to a binary not-none/none split.
fn marginalized_split_bit(decoder: &mut SymbolDecoder, bsize_log2: u8, ctx: usize) -> Result<bool> {
    // Reuse the full partition CDF but fold every non-NONE outcome to
    // "split". This preserves adaptation against the same table the full
    // node-type draw would have used.
    let sym = decoder.read_partition(bsize_log2, ctx)?;
    Ok(sym != 0)
}

/// Only true 4:2:2 (subsampling_x set, subsampling_y clear) forbids a
/// vertical-axis split below 8x8; 4:2:0, 4:4:4, and monochrome all allow it
/// (SPEC_FULL.md §4.6 step 3).
fn vertical_split_illegal_under_422(flags: FrameParseFlags, partition: PartitionKind, bsize: BlockSize) -> bool {
    let is_422 = flags.subsampling_x && !flags.subsampling_y;
    is_422 && partition.is_vertical_split() && bsize.width() <= 8 && bsize.height() <= 8
}

#[allow(clippy::too_many_arguments)]
pub fn parse_partition_recursive(
    decoder: &mut SymbolDecoder,
    slot: &mut TileSlot,
    recon: &dyn ReconOps,
    x4: u32,
    y4: u32,
    bsize: BlockSize,
    has_rows: bool,
    has_cols: bool,
    frame_cols4: u32,
    frame_rows4: u32,
    flags: FrameParseFlags,
) -> Result<PartitionNode> {
    let bsize_log2 = bsize.log2_bucket();
    let ctx = slot.ctx.partition_ctx(x4 as usize, y4 as usize, bsize_log2);

    let partition = if has_rows && has_cols {
        let sym = decoder.read_partition(bsize_log2, ctx)?;
        PartitionKind::from_u8(sym)
            .ok_or_else(|| Av1Error::invalid_bitstream(decoder.byte_offset() as u64, format!("invalid partition symbol {sym}")))?
    } else if has_cols {
        // Only the row half fits: one binary draw decides split vs. none,
        // splitting only along the horizontal axis.
        if marginalized_split_bit(decoder, bsize_log2, ctx)? { PartitionKind::Horz } else { PartitionKind::None }
    } else if has_rows {
        if marginalized_split_bit(decoder, bsize_log2, ctx)? { PartitionKind::Vert } else { PartitionKind::None }
    } else {
        PartitionKind::Split
    };

    // 4:2:2 layout constraint (SPEC_FULL.md §4.6 step 3).
    if vertical_split_illegal_under_422(flags, partition, bsize) {
        return Err(Av1Error::invalid_bitstream(
            decoder.byte_offset() as u64,
            "vertical partition illegal under 4:2:2 below 8x8",
        ));
    }

    let mut node = PartitionNode { x4, y4, bsize, partition, children: Vec::new() };

    if partition == PartitionKind::None {
        let block = parse_block_with_flags(decoder, slot, recon, x4, y4, bsize, flags)?;
        slot.mv_ctx.record(&block);
        slot.mv_grid.splat(&block);
        slot.ctx.writeback(&block, x4 as usize, y4 as usize);
        return Ok(node);
    }

    // SPLIT at 8x8 decodes its four 4x4 children directly, without further
    // recursive partition-symbol draws (SPEC_FULL.md §4.6 step 4).
    if partition == PartitionKind::Split && bsize == BlockSize::B8x8 {
        let children = split_size(bsize, partition);
        for (i, child_bsize) in children.iter().enumerate() {
            let (cx4, cy4) = child_position4(x4, y4, i, partition, bsize, &children);
            let block = parse_block_with_flags(decoder, slot, recon, cx4, cy4, *child_bsize, flags)?;
            slot.mv_ctx.record(&block);
            slot.mv_grid.splat(&block);
            slot.ctx.writeback(&block, cx4 as usize, cy4 as usize);
            node.children.push(PartitionNode::leaf(cx4, cy4, *child_bsize));
        }
        return Ok(node);
    }

    let children = split_size(bsize, partition);
    for (i, child_bsize) in children.iter().enumerate() {
        let (cx4, cy4) = child_position4(x4, y4, i, partition, bsize, &children);
        let child_has_cols = cx4 + child_bsize.width() / 4 <= frame_cols4;
        let child_has_rows = cy4 + child_bsize.height() / 4 <= frame_rows4;
        if !child_has_cols && !child_has_rows {
            continue;
        }
        let child = parse_partition_recursive(
            decoder, slot, recon, cx4, cy4, *child_bsize, child_has_rows, child_has_cols, frame_cols4, frame_rows4, flags,
        )?;
        node.children.push(child);
    }

    Ok(node)
}

/// Entry point for one superblock: descends the partition tree starting at
/// `sb_size` (SPEC_FULL.md §4.6).
#[allow(clippy::too_many_arguments)]
pub fn parse_partition_tree(
    decoder: &mut SymbolDecoder,
    slot: &mut TileSlot,
    recon: &dyn ReconOps,
    sb_x4: u32,
    sb_y4: u32,
    sb_bsize: BlockSize,
    frame_cols4: u32,
    frame_rows4: u32,
    flags: FrameParseFlags,
) -> Result<PartitionNode> {
    let has_cols = sb_x4 < frame_cols4;
    let has_rows = sb_y4 < frame_rows4;
    parse_partition_recursive(decoder, slot, recon, sb_x4, sb_y4, sb_bsize, has_rows, has_cols, frame_cols4, frame_rows4, flags)
}

pub fn flatten_leaves(node: &PartitionNode, out: &mut Vec<(u32, u32, BlockSize)>) {
    if node.is_leaf() {
        out.push((node.x4, node.y4, node.bsize));
    } else {
        for child in &node.children {
            flatten_leaves(child, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recon::NullReconOps;
    use crate::symbol::CdfContext;

    fn make_decoder(data: &'static [u8]) -> SymbolDecoder<'static> {
        SymbolDecoder::new(data, CdfContext::new()).unwrap()
    }

    #[test]
    fn test_split_size_split_64() {
        let sizes = split_size(BlockSize::B64x64, PartitionKind::Split);
        assert_eq!(sizes, vec![BlockSize::B32x32; 4]);
    }

    #[test]
    fn test_parse_partition_tree_terminates() {
        let data: &'static [u8] = &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA];
        let mut decoder = make_decoder(data);
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
        )
        .unwrap();
        let mut leaves = Vec::new();
        flatten_leaves(&node, &mut leaves);
        assert!(!leaves.is_empty());
    }

    #[test]
    fn test_vertical_split_rejected_under_true_422() {
        let mut flags = FrameParseFlags::default();
        flags.subsampling_x = true;
        flags.subsampling_y = false;
        assert!(vertical_split_illegal_under_422(flags, PartitionKind::Vert, BlockSize::B8x8));
        assert!(vertical_split_illegal_under_422(flags, PartitionKind::Vert4, BlockSize::B8x8));
        assert!(vertical_split_illegal_under_422(flags, PartitionKind::VertA, BlockSize::B8x8));
        assert!(vertical_split_illegal_under_422(flags, PartitionKind::VertB, BlockSize::B8x8));
    }

    #[test]
    fn test_vertical_split_allowed_under_420() {
        let mut flags = FrameParseFlags::default();
        flags.subsampling_x = true;
        flags.subsampling_y = true;
        assert!(!vertical_split_illegal_under_422(flags, PartitionKind::Vert, BlockSize::B8x8));
    }

    #[test]
    fn test_vertical_split_allowed_under_444() {
        let mut flags = FrameParseFlags::default();
        flags.subsampling_x = false;
        flags.subsampling_y = false;
        assert!(!vertical_split_illegal_under_422(flags, PartitionKind::Vert, BlockSize::B8x8));
    }

    #[test]
    fn test_vertical_split_allowed_under_monochrome() {
        // Monochrome conventionally reports subsampling_x/y both true, same
        // as 4:2:0, so it rides the same non-rejection path.
        let mut flags = FrameParseFlags::default();
        flags.subsampling_x = true;
        flags.subsampling_y = true;
        assert!(!vertical_split_illegal_under_422(flags, PartitionKind::VertA, BlockSize::B8x8));
    }

    #[test]
    fn test_horizontal_split_never_rejected_under_422() {
        let mut flags = FrameParseFlags::default();
        flags.subsampling_x = true;
        flags.subsampling_y = false;
        assert!(!vertical_split_illegal_under_422(flags, PartitionKind::Horz, BlockSize::B8x8));
    }
}
